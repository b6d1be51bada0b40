use std::sync::Arc;

use dashmap::DashMap;
use niuniu_core::{
    ClientMessage, ConnId, Player, PlayerId, PlayerSecret, Registry, RegistryError, Room,
    RoomError, RoomId, ServerMessage,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::Session;

// 服务器全局状态
// 注册表里的锁和房间里的锁都不会跨 .await 持有
pub struct AppState {
    pub registry: Arc<Registry>,
    // 用于向每个连接的 WebSocket 写任务发送消息的通道
    pub connections: DashMap<ConnId, mpsc::Sender<ServerMessage>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(registry: Arc<Registry>) -> SharedState {
        Arc::new(AppState { registry, connections: DashMap::new() })
    }

    fn sender(&self, conn: ConnId) -> Option<mpsc::Sender<ServerMessage>> {
        // 克隆出来，不让分片锁活过 send().await
        self.connections.get(&conn).map(|s| s.clone())
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("请先加入房间")]
    NotLoggedIn,
    #[error("你已经在一个房间里了")]
    AlreadyJoined,
    #[error("重连凭证无效")]
    BadSecret,
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// 核心消息处理逻辑：处理失败时只把错误发回给请求者
pub async fn handle_client_message(msg: ClientMessage, state: &SharedState, session: &mut Session) {
    let result = match msg {
        ClientMessage::JoinRoom { room_id, nickname } => join_room(state, session, room_id, nickname).await,
        ClientMessage::Reconnect { player_id, secret } => reconnect(state, session, player_id, secret).await,
        ClientMessage::Ready { ready } => set_ready(state, session, ready).await,
        ClientMessage::BidBanker => bid_banker(state, session).await,
        ClientMessage::PlaceBet { amount } => place_bet(state, session, amount).await,
        ClientMessage::Showdown => showdown(state, session).await,
        ClientMessage::LeaveRoom => leave_room(state, session).await,
    };

    if let Err(e) = result {
        warn!("连接 {} 的请求处理失败: {}", session.conn_id, e);
        send_to(state, session.conn_id, ServerMessage::Error { message: e.to_string() }).await;
    }
}

/// 取出当前连接所在的房间和玩家 ID
fn current(state: &SharedState, session: &Session) -> Result<(Arc<Room>, PlayerId), HandlerError> {
    let (room_id, player_id) = session.player.ok_or(HandlerError::NotLoggedIn)?;
    let room = state.registry.get_room(room_id)?;
    Ok((room, player_id))
}

async fn join_room(
    state: &SharedState,
    session: &mut Session,
    room_id: RoomId,
    nickname: String,
) -> Result<(), HandlerError> {
    if session.is_logged_in() {
        return Err(HandlerError::AlreadyJoined);
    }

    let initial_score = state.registry.config().initial_score;
    let player = Arc::new(Player::new(Uuid::new_v4(), nickname, initial_score, Some(session.conn_id)));
    let room = state.registry.admit(room_id, player.clone())?;
    session.player = Some((room_id, player.id));

    info!("玩家 {} ({}) 加入了房间 {}", player.id, player.nickname, room_id);
    send_to(state, session.conn_id, ServerMessage::RoomJoined {
        your_id: player.id,
        your_secret: player.secret,
        snapshot: room.snapshot_for(player.id),
    })
    .await;
    broadcast_room_state(state, &room).await;
    Ok(())
}

async fn reconnect(
    state: &SharedState,
    session: &mut Session,
    player_id: PlayerId,
    secret: PlayerSecret,
) -> Result<(), HandlerError> {
    if session.is_logged_in() {
        return Err(HandlerError::AlreadyJoined);
    }

    let room = state.registry.room_by_player(player_id)?;
    if room.get_player(player_id)?.secret != secret {
        return Err(HandlerError::BadSecret);
    }
    let player = room.reconnect_player(player_id, session.conn_id)?;
    session.player = Some((room.id, player_id));

    send_to(state, session.conn_id, ServerMessage::RoomJoined {
        your_id: player.id,
        your_secret: player.secret,
        snapshot: room.snapshot_for(player.id),
    })
    .await;
    broadcast_room_state(state, &room).await;
    Ok(())
}

/// 所有人都准备好后自动开局并发牌
async fn set_ready(state: &SharedState, session: &mut Session, ready: bool) -> Result<(), HandlerError> {
    let (room, player_id) = current(state, session)?;
    let all_ready = room.set_ready(player_id, ready)?;
    if all_ready && room.start_game().is_ok() {
        room.deal_cards()?;
    }
    broadcast_room_state(state, &room).await;
    Ok(())
}

async fn bid_banker(state: &SharedState, session: &mut Session) -> Result<(), HandlerError> {
    let (room, player_id) = current(state, session)?;
    room.bid_banker(player_id)?;
    broadcast_room_state(state, &room).await;
    Ok(())
}

/// 最后一个在玩的玩家下注后进入摊牌阶段
async fn place_bet(state: &SharedState, session: &mut Session, amount: u32) -> Result<(), HandlerError> {
    let (room, player_id) = current(state, session)?;
    if room.place_bet(player_id, amount)? {
        if let Err(e) = room.finish_betting() {
            // 另一个连接已经结束了下注
            debug!("房间 {} 结束下注失败: {}", room.id, e);
        }
    }
    broadcast_room_state(state, &room).await;
    Ok(())
}

/// 摊牌后立即结算，结果广播给房间里所有人
async fn showdown(state: &SharedState, session: &mut Session) -> Result<(), HandlerError> {
    let (room, _) = current(state, session)?;
    let showdown = room.showdown()?;
    let deltas = room.settlement()?;

    let msg = ServerMessage::ShowdownResults { results: showdown.results, deltas };
    broadcast(state, &room, &msg, None).await;
    broadcast_room_state(state, &room).await;
    Ok(())
}

async fn leave_room(state: &SharedState, session: &mut Session) -> Result<(), HandlerError> {
    let (room, player_id) = current(state, session)?;
    room.leave(player_id)?;
    state.registry.unregister_player(player_id);
    session.player = None;

    send_to(state, session.conn_id, ServerMessage::Info { message: format!("已离开房间 {}", room.id) }).await;

    // 判断是否清空房间
    if state.registry.delete_room_if_empty(room.id) {
        return Ok(());
    }
    broadcast(state, &room, &ServerMessage::PlayerLeft { player_id }, None).await;
    broadcast_room_state(state, &room).await;
    Ok(())
}

/// 连接断开后的处理：玩家留在房间里等待重连，超时后由注册表清理
pub async fn handle_disconnect(state: &SharedState, session: &Session) {
    state.connections.remove(&session.conn_id);

    let Some((room_id, player_id)) = session.player else {
        return;
    };
    let Ok(room) = state.registry.get_room(room_id) else {
        return;
    };
    // 已经从别的连接重连上来的玩家不受旧连接关闭影响
    match room.get_player(player_id) {
        Ok(player) if player.conn() == Some(session.conn_id) => {}
        _ => return,
    }

    info!("玩家 {} 从房间 {} 断开连接", player_id, room_id);
    room.set_player_offline(player_id);
    // 掉线的玩家可能正卡着下注或抢庄
    if let Err(e) = room.resume_after_departure() {
        warn!("房间 {} 掉线后推进牌局失败: {}", room_id, e);
    }
    broadcast_room_state(state, &room).await;
}

async fn send_to(state: &SharedState, conn: ConnId, message: ServerMessage) {
    let Some(sender) = state.sender(conn) else {
        return;
    };
    if sender.send(message).await.is_err() {
        // 发送失败，说明连接已断开，后续由其自己的 handle_socket 任务处理
        warn!("向连接 {} 发送消息失败（可能已断开）", conn);
    }
}

/// 向房间内所有在线玩家广播消息
async fn broadcast(state: &SharedState, room: &Room, message: &ServerMessage, exclude: Option<PlayerId>) {
    let targets: Vec<ConnId> = room
        .players()
        .iter()
        .filter(|p| Some(p.id) != exclude)
        .filter_map(|p| p.conn())
        .collect();
    for conn in targets {
        send_to(state, conn, message.clone()).await;
    }
}

/// 快照需要为每个玩家单独生成，只带他自己的手牌
async fn broadcast_room_state(state: &SharedState, room: &Room) {
    let snapshots: Vec<(ConnId, ServerMessage)> = room
        .players()
        .iter()
        .filter_map(|p| p.conn().map(|conn| (conn, ServerMessage::RoomState(room.snapshot_for(p.id)))))
        .collect();
    for (conn, msg) in snapshots {
        send_to(state, conn, msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use niuniu_core::{GameState, PlayerStatus, RoomConfig, RoomSnapshot};

    struct Client {
        session: Session,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl Client {
        fn connect(state: &SharedState) -> Client {
            let session = Session::new();
            let (tx, rx) = mpsc::channel(64);
            state.connections.insert(session.conn_id, tx);
            Client { session, rx }
        }

        async fn send(&mut self, state: &SharedState, msg: ClientMessage) {
            handle_client_message(msg, state, &mut self.session).await;
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn last_state(&mut self) -> RoomSnapshot {
            self.drain()
                .into_iter()
                .filter_map(|m| match m {
                    ServerMessage::RoomState(s) => Some(s),
                    _ => None,
                })
                .last()
                .expect("没有收到房间快照")
        }

        fn player_id(&self) -> PlayerId {
            self.session.player.expect("未加入房间").1
        }
    }

    fn new_state() -> SharedState {
        AppState::new(Registry::new(RoomConfig::default()))
    }

    fn last_error(msgs: &[ServerMessage]) -> Option<String> {
        msgs.iter().rev().find_map(|m| match m {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
    }

    async fn join(state: &SharedState, room_id: RoomId, name: &str) -> Client {
        let mut client = Client::connect(state);
        client
            .send(state, ClientMessage::JoinRoom { room_id, nickname: name.to_string() })
            .await;
        client
    }

    #[tokio::test]
    async fn test_join_creates_room_and_broadcasts() {
        let state = new_state();
        let mut a = join(&state, 7, "alice").await;
        let msgs = a.drain();
        assert!(matches!(&msgs[0], ServerMessage::RoomJoined { snapshot, .. } if snapshot.room_id == 7));
        assert_eq!(state.registry.room_count(), 1);

        let mut b = join(&state, 7, "bob").await;
        let snapshot = a.last_state();
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(b.last_state().state, GameState::WaitingForPlayers);
    }

    #[tokio::test]
    async fn test_requests_before_join_are_rejected() {
        let state = new_state();
        let mut c = Client::connect(&state);
        c.send(&state, ClientMessage::Ready { ready: true }).await;
        assert_eq!(last_error(&c.drain()).as_deref(), Some("请先加入房间"));

        c.send(&state, ClientMessage::JoinRoom { room_id: 1, nickname: "c".into() }).await;
        c.send(&state, ClientMessage::JoinRoom { room_id: 2, nickname: "c".into() }).await;
        assert_eq!(last_error(&c.drain()).as_deref(), Some("你已经在一个房间里了"));
        assert_eq!(state.registry.room_count(), 1);
    }

    #[tokio::test]
    async fn test_full_round() {
        let state = new_state();
        let mut a = join(&state, 1, "alice").await;
        let mut b = join(&state, 1, "bob").await;

        a.send(&state, ClientMessage::Ready { ready: true }).await;
        assert_eq!(a.last_state().state, GameState::WaitingForPlayers);
        b.send(&state, ClientMessage::Ready { ready: true }).await;

        // 全员准备后直接发牌，进入抢庄
        let snapshot = a.last_state();
        assert_eq!(snapshot.state, GameState::Bidding);
        assert_eq!(snapshot.your_hand.len(), 5);
        b.drain();

        a.send(&state, ClientMessage::BidBanker).await;
        b.send(&state, ClientMessage::BidBanker).await;
        assert!(last_error(&b.drain()).is_some());
        assert_eq!(a.last_state().banker_id, Some(a.player_id()));

        a.send(&state, ClientMessage::PlaceBet { amount: 10 }).await;
        assert_eq!(a.last_state().state, GameState::Betting);
        b.send(&state, ClientMessage::PlaceBet { amount: 20 }).await;
        assert_eq!(a.last_state().state, GameState::Showdown);
        b.drain();

        b.send(&state, ClientMessage::Showdown).await;
        for client in [&mut a, &mut b] {
            let msgs = client.drain();
            let Some(ServerMessage::ShowdownResults { results, deltas }) =
                msgs.iter().find(|m| matches!(m, ServerMessage::ShowdownResults { .. })).cloned()
            else {
                panic!("没有收到摊牌结果");
            };
            assert_eq!(results.len(), 2);
            assert_eq!(deltas.len(), 2);
            assert!(results.iter().any(|r| r.is_winner));
            let last = msgs.iter().rev().find_map(|m| match m {
                ServerMessage::RoomState(s) => Some(s.clone()),
                _ => None,
            });
            assert_eq!(last.map(|s| s.state), Some(GameState::WaitingForPlayers));
        }

        let room = state.registry.get_room(1).unwrap();
        let total: i64 = room.players().iter().map(|p| p.score()).sum();
        assert_ne!(total, 2000, "有输有赢时分数一定会变化");
    }

    #[tokio::test]
    async fn test_reconnect_with_secret() {
        let state = new_state();
        let mut a = join(&state, 3, "alice").await;
        let _b = join(&state, 3, "bob").await;
        let (your_id, your_secret) = match a.drain().remove(0) {
            ServerMessage::RoomJoined { your_id, your_secret, .. } => (your_id, your_secret),
            other => panic!("unexpected {:?}", other),
        };

        handle_disconnect(&state, &a.session).await;
        let room = state.registry.get_room(3).unwrap();
        assert_eq!(room.get_player(your_id).unwrap().status(), PlayerStatus::Offline);

        let mut bad = Client::connect(&state);
        bad.send(&state, ClientMessage::Reconnect { player_id: your_id, secret: Uuid::new_v4() }).await;
        assert_eq!(last_error(&bad.drain()).as_deref(), Some("重连凭证无效"));

        let mut again = Client::connect(&state);
        again.send(&state, ClientMessage::Reconnect { player_id: your_id, secret: your_secret }).await;
        assert!(matches!(again.drain().first(), Some(ServerMessage::RoomJoined { your_id: id, .. }) if *id == your_id));

        let player = room.get_player(your_id).unwrap();
        assert!(player.is_online());
        assert_eq!(player.conn(), Some(again.session.conn_id));

        // 旧连接再次关闭不影响已重连的玩家
        handle_disconnect(&state, &a.session).await;
        assert!(player.is_online());
    }

    async fn ready_and_bid(state: &SharedState, a: &mut Client, b: &mut Client) {
        a.send(state, ClientMessage::Ready { ready: true }).await;
        b.send(state, ClientMessage::Ready { ready: true }).await;
        a.send(state, ClientMessage::BidBanker).await;
        a.drain();
        b.drain();
    }

    #[tokio::test]
    async fn test_disconnect_during_betting_unblocks_round() {
        let state = new_state();
        let mut a = join(&state, 8, "alice").await;
        let mut b = join(&state, 8, "bob").await;
        ready_and_bid(&state, &mut a, &mut b).await;

        a.send(&state, ClientMessage::PlaceBet { amount: 10 }).await;
        assert_eq!(a.last_state().state, GameState::Betting);

        handle_disconnect(&state, &b.session).await;
        assert_eq!(a.last_state().state, GameState::Showdown);

        // 被清理之后剩下的玩家可以摊牌并离开
        let room = state.registry.get_room(8).unwrap();
        room.sweep_offline(
            tokio::time::Instant::now() + std::time::Duration::from_secs(301),
            std::time::Duration::from_secs(300),
        );
        a.send(&state, ClientMessage::Showdown).await;
        assert_eq!(a.last_state().state, GameState::WaitingForPlayers);
        assert_eq!(room.get_player(a.player_id()).unwrap().score(), 1010);

        a.send(&state, ClientMessage::LeaveRoom).await;
        assert!(a.session.player.is_none());
        assert_eq!(state.registry.room_count(), 0);
    }

    #[tokio::test]
    async fn test_everyone_disconnects_during_bidding() {
        let state = new_state();
        let mut a = join(&state, 9, "alice").await;
        let mut b = join(&state, 9, "bob").await;
        a.send(&state, ClientMessage::Ready { ready: true }).await;
        b.send(&state, ClientMessage::Ready { ready: true }).await;
        let room = state.registry.get_room(9).unwrap();
        assert_eq!(room.state(), GameState::Bidding);

        handle_disconnect(&state, &a.session).await;
        assert_eq!(room.state(), GameState::Bidding);
        handle_disconnect(&state, &b.session).await;
        assert_eq!(room.state(), GameState::WaitingForPlayers);

        // 回来的玩家可以重新开局
        let a_id = a.player_id();
        let a_secret = room.get_player(a_id).unwrap().secret;
        let mut back = Client::connect(&state);
        back.send(&state, ClientMessage::Reconnect { player_id: a_id, secret: a_secret }).await;
        back.send(&state, ClientMessage::LeaveRoom).await;
        assert!(last_error(&back.drain()).is_none());
    }

    #[tokio::test]
    async fn test_join_after_room_emptied_gets_fresh_room() {
        let state = new_state();
        let mut a = join(&state, 2, "alice").await;
        let stale = state.registry.get_room(2).unwrap();
        a.send(&state, ClientMessage::LeaveRoom).await;
        assert_eq!(state.registry.room_count(), 0);

        let mut b = join(&state, 2, "bob").await;
        let b_id = b.player_id();
        let room = state.registry.room_by_player(b_id).unwrap();
        assert!(!Arc::ptr_eq(&room, &stale));
        b.send(&state, ClientMessage::Ready { ready: true }).await;
        assert!(last_error(&b.drain()).is_none());
    }

    #[tokio::test]
    async fn test_leave_room() {
        let state = new_state();
        let mut a = join(&state, 5, "alice").await;
        let mut b = join(&state, 5, "bob").await;
        let b_id = b.player_id();

        b.send(&state, ClientMessage::LeaveRoom).await;
        assert!(b.session.player.is_none());
        assert!(state.registry.room_by_player(b_id).is_err());
        assert!(a.drain().contains(&ServerMessage::PlayerLeft { player_id: b_id }));

        a.send(&state, ClientMessage::LeaveRoom).await;
        assert_eq!(state.registry.room_count(), 0);
    }

    #[tokio::test]
    async fn test_cannot_leave_mid_round() {
        let state = new_state();
        let mut a = join(&state, 6, "alice").await;
        let mut b = join(&state, 6, "bob").await;
        a.send(&state, ClientMessage::Ready { ready: true }).await;
        b.send(&state, ClientMessage::Ready { ready: true }).await;
        a.drain();

        a.send(&state, ClientMessage::LeaveRoom).await;
        assert!(last_error(&a.drain()).is_some());
        assert!(a.session.player.is_some());
        assert_eq!(state.registry.get_room(6).unwrap().player_count(), 2);
    }
}
