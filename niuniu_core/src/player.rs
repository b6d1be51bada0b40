use crate::card::Card;
use crate::state::{ConnId, PlayerId, PlayerInfo, PlayerSecret, PlayerStatus, RoomId};
use parking_lot::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// 玩家会变化的那部分状态，统一由一把读写锁保护
#[derive(Debug, Clone)]
struct PlayerData {
    score: i64,
    room_id: Option<RoomId>,
    hand: Vec<Card>,
    bet_amount: u32,
    status: PlayerStatus,
    is_banker: bool,
    is_online: bool,
    disconnect_time: Option<Instant>,
    conn: Option<ConnId>,
}

/// 一个玩家。身份字段不可变，其余字段都在 `data` 锁里。
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub secret: PlayerSecret,
    data: RwLock<PlayerData>,
}

impl Player {
    pub fn new(id: PlayerId, nickname: impl Into<String>, score: i64, conn: Option<ConnId>) -> Player {
        Player {
            id,
            nickname: nickname.into(),
            secret: Uuid::new_v4(),
            data: RwLock::new(PlayerData {
                score,
                room_id: None,
                hand: Vec::new(),
                bet_amount: 0,
                status: PlayerStatus::Waiting,
                is_banker: false,
                is_online: true,
                disconnect_time: None,
                conn,
            }),
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.data.read().status
    }

    pub fn set_status(&self, status: PlayerStatus) {
        self.data.write().status = status;
    }

    pub fn is_online(&self) -> bool {
        self.data.read().is_online
    }

    pub fn score(&self) -> i64 {
        self.data.read().score
    }

    /// 加减分，返回新的分数
    pub fn add_score(&self, delta: i64) -> i64 {
        let mut data = self.data.write();
        data.score += delta;
        data.score
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.data.read().room_id
    }

    pub fn set_room_id(&self, room_id: Option<RoomId>) {
        self.data.write().room_id = room_id;
    }

    pub fn hand(&self) -> Vec<Card> {
        self.data.read().hand.clone()
    }

    pub fn set_hand(&self, cards: Vec<Card>) {
        self.data.write().hand = cards;
    }

    pub fn clear_hand(&self) {
        self.data.write().hand.clear();
    }

    pub fn is_banker(&self) -> bool {
        self.data.read().is_banker
    }

    pub fn set_banker(&self, is_banker: bool) {
        self.data.write().is_banker = is_banker;
    }

    pub fn bet_amount(&self) -> u32 {
        self.data.read().bet_amount
    }

    pub fn has_bet(&self) -> bool {
        self.data.read().bet_amount > 0
    }

    pub fn place_bet(&self, amount: u32) {
        self.data.write().bet_amount = amount;
    }

    pub fn reset_bet(&self) {
        self.data.write().bet_amount = 0;
    }

    pub fn conn(&self) -> Option<ConnId> {
        self.data.read().conn
    }

    pub fn disconnect_time(&self) -> Option<Instant> {
        self.data.read().disconnect_time
    }

    /// 标记掉线：记录掉线时间并解绑连接
    pub fn go_offline(&self, at: Instant) {
        let mut data = self.data.write();
        data.is_online = false;
        data.status = PlayerStatus::Offline;
        data.disconnect_time = Some(at);
        data.conn = None;
    }

    /// 重新上线并绑定新连接。`status` 由房间根据牌局阶段决定
    pub fn go_online(&self, conn: ConnId, status: PlayerStatus) {
        let mut data = self.data.write();
        data.is_online = true;
        data.status = status;
        data.disconnect_time = None;
        data.conn = Some(conn);
    }

    /// 掉线时长是否超过 `timeout`，在线玩家永远返回 false
    pub fn offline_longer_than(&self, now: Instant, timeout: std::time::Duration) -> bool {
        let data = self.data.read();
        match data.disconnect_time {
            Some(at) if !data.is_online => now.saturating_duration_since(at) > timeout,
            _ => false,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        let data = self.data.read();
        PlayerInfo {
            id: self.id,
            nickname: self.nickname.clone(),
            score: data.score,
            status: data.status,
            is_banker: data.is_banker,
            is_online: data.is_online,
        }
    }
}
