use niuniu_core::{ConnId, PlayerId, RoomId};
use uuid::Uuid;

/// 单个 WebSocket 连接的上下文，加入或重连成功后才有玩家信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub conn_id: ConnId,
    pub player: Option<(RoomId, PlayerId)>,
}

impl Session {
    pub fn new() -> Session {
        Session { conn_id: Uuid::new_v4(), player: None }
    }

    pub fn is_logged_in(&self) -> bool {
        self.player.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
