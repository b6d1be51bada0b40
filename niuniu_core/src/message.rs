use crate::state::{PlayerId, PlayerSecret, RoomId, RoomSnapshot, ScoreDelta, ShowdownResult};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    // --- 房间管理消息 ---
    /// 加入房间，房间不存在时自动创建
    JoinRoom { room_id: RoomId, nickname: String },
    /// 断线重连，凭加入时拿到的 secret 证明身份
    Reconnect { player_id: PlayerId, secret: PlayerSecret },
    /// 离开房间，只能在等待阶段
    LeaveRoom,

    // --- 游戏内消息 ---
    /// 准备 / 取消准备
    Ready { ready: bool },
    /// 抢庄
    BidBanker,
    /// 闲家下注
    PlaceBet { amount: u32 },
    /// 请求摊牌
    Showdown,
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// 加入或重连成功后私密地发给该玩家
    RoomJoined {
        your_id: PlayerId,
        your_secret: PlayerSecret,
        snapshot: RoomSnapshot,
    },

    /// 房间状态快照，每个玩家只看得到自己的手牌
    RoomState(RoomSnapshot),

    /// 一个玩家离开了房间
    PlayerLeft { player_id: PlayerId },

    /// 本局摊牌和结算结果
    ShowdownResults {
        results: Vec<ShowdownResult>,
        deltas: Vec<ScoreDelta>,
    },

    Info { message: String },
    Error { message: String },
}
