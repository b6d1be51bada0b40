use crate::bull::HandValue;
use crate::card::Card;
use crate::fsm::GameState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub type RoomId = u32;
pub type PlayerId = Uuid;
/// 断线重连时用来证明身份的凭证
pub type PlayerSecret = Uuid;
/// 传输层连接的句柄，核心逻辑不关心它具体是什么
pub type ConnId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    /// 在房间里，还没准备
    Waiting,
    /// 已准备
    Ready,
    /// 本局已发牌
    Playing,
    /// 掉线
    Offline,
}

/// 房间相关的可调参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    pub max_players: usize,
    pub initial_score: i64,
    /// 清理掉线玩家的周期
    pub sweep_interval: Duration,
    /// 掉线超过这个时长的玩家会被移出房间
    pub offline_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 5,
            initial_score: 1000,
            sweep_interval: Duration::from_secs(60),
            offline_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// 其他玩家可见的信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub nickname: String,
    pub score: i64,
    pub status: PlayerStatus,
    pub is_banker: bool,
    pub is_online: bool,
}

/// 发给某个玩家的房间快照，只包含他自己的手牌
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub players: Vec<PlayerInfo>,
    pub your_hand: Vec<Card>,
    pub state: GameState,
    pub banker_id: Option<PlayerId>,
}

/// 摊牌时单个玩家的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowdownResult {
    pub player_id: PlayerId,
    pub hand: Vec<Card>,
    pub hand_value: HandValue,
    pub bet: u32,
    pub is_winner: bool,
}

/// 一局的摊牌记录，结算时据此加减分
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Showdown {
    pub results: Vec<ShowdownResult>,
}

impl Showdown {
    pub fn winners(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.results.iter().filter(|r| r.is_winner).map(|r| r.player_id)
    }
}

/// 结算后单个玩家的分数变化
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreDelta {
    pub player_id: PlayerId,
    pub delta: i64,
    pub new_score: i64,
}
