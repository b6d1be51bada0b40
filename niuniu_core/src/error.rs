use crate::fsm::GameState;
use crate::state::{PlayerId, RoomId};
use thiserror::Error;

/// 牌堆相关错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeckError {
    #[error("deck is empty")]
    Empty,
    #[error("not enough cards in deck: requested {requested}, remaining {remaining}")]
    InsufficientCards { requested: usize, remaining: usize },
}

/// 房间操作错误，覆盖容量、成员、状态机和资源四类
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room is full")]
    RoomFull,
    #[error("player {0} already in room")]
    AlreadyInRoom(PlayerId),
    #[error("player {0} not in room")]
    NotInRoom(PlayerId),
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: GameState, to: GameState },
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: GameState,
    },
    #[error("at least 2 players are required, got {0}")]
    NotEnoughPlayers(usize),
    #[error("player {0} is not playing this round")]
    NotPlaying(PlayerId),
    #[error("banker has already been chosen")]
    BankerAlreadyChosen,
    #[error("player {0} has already placed a bet")]
    AlreadyBet(PlayerId),
    #[error("invalid bet amount: {0}")]
    InvalidBet(u32),
    #[error(transparent)]
    Deck(#[from] DeckError),
}

/// 房间注册表错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("room {0} already exists")]
    RoomExists(RoomId),
    #[error("room {0} not found")]
    RoomNotFound(RoomId),
    #[error("player {0} is not in any room")]
    PlayerNotRegistered(PlayerId),
    /// 索引指向一个已不存在的房间，属于逻辑缺陷
    #[error("player {player} is indexed to missing room {room}")]
    Inconsistent { player: PlayerId, room: RoomId },
}
