use crate::error::RoomError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 房间所处的牌局阶段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GameState {
    WaitingForPlayers,
    Dealing,
    Bidding,
    Betting,
    Showdown,
    Settlement,
}

impl GameState {
    /// 每个状态只有唯一的合法后继，一局走完回到 WaitingForPlayers
    pub fn next(self) -> GameState {
        match self {
            GameState::WaitingForPlayers => GameState::Dealing,
            GameState::Dealing => GameState::Bidding,
            GameState::Bidding => GameState::Betting,
            GameState::Betting => GameState::Showdown,
            GameState::Showdown => GameState::Settlement,
            GameState::Settlement => GameState::WaitingForPlayers,
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            GameState::WaitingForPlayers => "WAITING_FOR_PLAYERS",
            GameState::Dealing => "DEALING",
            GameState::Bidding => "BIDDING",
            GameState::Betting => "BETTING",
            GameState::Showdown => "SHOWDOWN",
            GameState::Settlement => "SETTLEMENT",
        })
    }
}

/// 房间状态机
///
/// 只负责状态和转换规则。需要玩家数据的守卫条件和副作用由 `Room`
/// 在持有状态机锁的情况下完成，见 `room.rs`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomFsm {
    state: GameState,
}

impl Default for RoomFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomFsm {
    pub fn new() -> Self {
        RoomFsm { state: GameState::WaitingForPlayers }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn can_transition(&self, to: GameState) -> bool {
        self.state.next() == to
    }

    /// 转换到新状态，非法转换不改变当前状态
    pub fn transition_to(&mut self, to: GameState) -> Result<(), RoomError> {
        if !self.can_transition(to) {
            return Err(RoomError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// 放弃当前牌局，直接回到等待阶段。不经过转换表，只用于没人能继续的牌局
    pub fn abandon_round(&mut self) {
        self.state = GameState::WaitingForPlayers;
    }

    /// 要求当前处于 `expected` 状态，否则报告是哪个操作被拒绝
    pub fn require(&self, expected: GameState, operation: &'static str) -> Result<(), RoomError> {
        if self.state != expected {
            return Err(RoomError::InvalidState { operation, state: self.state });
        }
        Ok(())
    }

    /// 能否开局：等待阶段且至少 2 人
    pub fn can_start_game(&self, player_count: usize) -> bool {
        self.state == GameState::WaitingForPlayers && player_count >= 2
    }
}
