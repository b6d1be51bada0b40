use crate::bull::{calculate_bull, compare_hands};
use crate::card::{Card, Deck};
use crate::error::RoomError;
use crate::fsm::{GameState, RoomFsm};
use crate::player::Player;
use crate::state::{
    ConnId, PlayerId, PlayerStatus, RoomConfig, RoomId, RoomSnapshot, ScoreDelta, Showdown,
    ShowdownResult,
};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 每位玩家发 5 张
pub const HAND_SIZE: usize = 5;

// 单个房间
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// fsm -> players -> deck -> showdown -> 单个 Player 的锁
// 可以跳过其中某些锁，但不能逆序获取；房间内部从不访问注册表。
pub struct Room {
    pub id: RoomId,
    max_players: usize,
    fsm: Mutex<RoomFsm>,
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
    deck: Mutex<Deck>,
    // 摊牌时写入，结算时取走
    showdown: Mutex<Option<Showdown>>,
}

impl Room {
    pub fn new(id: RoomId, config: &RoomConfig) -> Room {
        Room {
            id,
            max_players: config.max_players,
            fsm: Mutex::new(RoomFsm::new()),
            players: RwLock::new(HashMap::new()),
            deck: Mutex::new(Deck::new()),
            showdown: Mutex::new(None),
        }
    }

    pub fn state(&self) -> GameState {
        self.fsm.lock().state()
    }

    // --- 成员管理 ---

    pub fn add_player(&self, player: Arc<Player>) -> Result<(), RoomError> {
        let mut players = self.players.write();
        if players.len() >= self.max_players {
            return Err(RoomError::RoomFull);
        }
        if players.contains_key(&player.id) {
            return Err(RoomError::AlreadyInRoom(player.id));
        }
        player.set_room_id(Some(self.id));
        players.insert(player.id, player);
        Ok(())
    }

    pub fn remove_player(&self, player_id: PlayerId) -> Result<Arc<Player>, RoomError> {
        let player = self
            .players
            .write()
            .remove(&player_id)
            .ok_or(RoomError::NotInRoom(player_id))?;
        player.set_room_id(None);
        Ok(player)
    }

    /// 玩家主动离开，只能在等待阶段
    pub fn leave(&self, player_id: PlayerId) -> Result<Arc<Player>, RoomError> {
        let fsm = self.fsm.lock();
        fsm.require(GameState::WaitingForPlayers, "leave room")?;
        let player = self.remove_player(player_id)?;
        info!("玩家 {} 离开房间 {}", player_id, self.id);
        Ok(player)
    }

    pub fn get_player(&self, player_id: PlayerId) -> Result<Arc<Player>, RoomError> {
        self.players
            .read()
            .get(&player_id)
            .cloned()
            .ok_or(RoomError::NotInRoom(player_id))
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.players.read().values().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_full(&self) -> bool {
        self.player_count() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    // --- 掉线与重连 ---

    /// 将玩家标记为离线；玩家不在房间里时什么也不做
    pub fn set_player_offline(&self, player_id: PlayerId) {
        let players = self.players.read();
        if let Some(player) = players.get(&player_id) {
            player.go_offline(Instant::now());
            info!("房间 {} 的玩家 {} 掉线", self.id, player_id);
        }
    }

    /// 玩家重连：恢复在线并绑定新连接
    ///
    /// 牌局进行中且手上有牌的玩家回到 `Playing`，其余回到 `Waiting`。
    pub fn reconnect_player(&self, player_id: PlayerId, conn: ConnId) -> Result<Arc<Player>, RoomError> {
        let fsm = self.fsm.lock();
        let players = self.players.read();
        let player = players.get(&player_id).ok_or(RoomError::NotInRoom(player_id))?;

        let in_round = fsm.state() != GameState::WaitingForPlayers;
        let status = if in_round && player.hand().len() == HAND_SIZE {
            PlayerStatus::Playing
        } else {
            PlayerStatus::Waiting
        };
        player.go_online(conn, status);
        info!("房间 {} 的玩家 {} 重连成功，状态 {:?}", self.id, player_id, status);
        Ok(player.clone())
    }

    /// 移除掉线超过 `timeout` 的玩家，返回被移除的玩家 ID
    pub fn sweep_offline(&self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        let mut players = self.players.write();
        let expired: Vec<PlayerId> = players
            .values()
            .filter(|p| p.offline_longer_than(now, timeout))
            .map(|p| p.id)
            .collect();

        for player_id in &expired {
            if let Some(player) = players.remove(player_id) {
                player.set_room_id(None);
                info!("房间 {} 的玩家 {} 掉线超时，已被移出", self.id, player_id);
            }
        }
        expired
    }

    // --- 准备 ---

    /// 设置准备状态，只能在等待阶段进行。返回是否所有人都已准备
    pub fn set_ready(&self, player_id: PlayerId, ready: bool) -> Result<bool, RoomError> {
        let fsm = self.fsm.lock();
        fsm.require(GameState::WaitingForPlayers, "change ready state")?;

        let players = self.players.read();
        let player = players.get(&player_id).ok_or(RoomError::NotInRoom(player_id))?;
        player.set_status(if ready { PlayerStatus::Ready } else { PlayerStatus::Waiting });

        Ok(players.values().all(|p| p.status() == PlayerStatus::Ready))
    }

    pub fn all_ready(&self) -> bool {
        self.players.read().values().all(|p| p.status() == PlayerStatus::Ready)
    }

    // --- 状态机驱动的牌局流程 ---

    pub fn can_start_game(&self) -> bool {
        let fsm = self.fsm.lock();
        fsm.can_start_game(self.player_count())
    }

    /// 开始游戏，转换到发牌阶段
    pub fn start_game(&self) -> Result<(), RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::WaitingForPlayers, "start game")?;
        let count = self.player_count();
        if !fsm.can_start_game(count) {
            return Err(RoomError::NotEnoughPlayers(count));
        }
        fsm.transition_to(GameState::Dealing)?;
        info!("房间 {} 开始新的一局，{} 名玩家", self.id, count);
        Ok(())
    }

    /// 重置并洗牌，给每位玩家发 5 张，然后进入抢庄阶段
    ///
    /// 某个玩家发牌失败只记录日志，不影响其他玩家。
    pub fn deal_cards(&self) -> Result<(), RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::Dealing, "deal cards")?;

        let players = self.players.read();
        {
            let mut deck = self.deck.lock();
            deck.reset();
            deck.shuffle();

            for player in players.values() {
                // 上一局的庄家和下注都清掉
                player.set_banker(false);
                player.reset_bet();
                match deck.deal_cards(HAND_SIZE) {
                    Ok(cards) => {
                        player.set_hand(cards);
                        // 掉线的玩家也发牌，但保持离线状态，重连后才算在玩
                        if player.is_online() {
                            player.set_status(PlayerStatus::Playing);
                        }
                    }
                    Err(e) => {
                        player.clear_hand();
                        warn!("房间 {} 给玩家 {} 发牌失败: {}", self.id, player.id, e);
                    }
                }
            }
        }
        *self.showdown.lock() = None;

        fsm.transition_to(GameState::Bidding)?;
        info!("房间 {} 发牌完成", self.id);
        Ok(())
    }

    /// 抢庄：第一个抢的玩家成为庄家，然后进入下注阶段
    pub fn bid_banker(&self, player_id: PlayerId) -> Result<(), RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::Bidding, "bid banker")?;

        let players = self.players.read();
        let player = players.get(&player_id).ok_or(RoomError::NotInRoom(player_id))?;
        if player.status() != PlayerStatus::Playing {
            return Err(RoomError::NotPlaying(player_id));
        }
        if players.values().any(|p| p.is_banker()) {
            return Err(RoomError::BankerAlreadyChosen);
        }
        // TODO: 比较抢庄倍数，目前是先到先得
        player.set_banker(true);

        fsm.transition_to(GameState::Betting)?;
        info!("玩家 {} 成为房间 {} 的庄家", player_id, self.id);
        Ok(())
    }

    /// 设置庄家标记，不会清除其他玩家的标记
    pub fn set_banker(&self, player_id: PlayerId) -> Result<(), RoomError> {
        self.get_player(player_id)?.set_banker(true);
        Ok(())
    }

    pub fn has_banker(&self) -> bool {
        self.players.read().values().any(|p| p.is_banker())
    }

    pub fn banker_id(&self) -> Option<PlayerId> {
        self.players.read().values().find(|p| p.is_banker()).map(|p| p.id)
    }

    /// 记录一位玩家的下注，返回是否所有在玩的玩家都已下注
    pub fn place_bet(&self, player_id: PlayerId, amount: u32) -> Result<bool, RoomError> {
        let fsm = self.fsm.lock();
        fsm.require(GameState::Betting, "place bet")?;
        if amount == 0 {
            return Err(RoomError::InvalidBet(amount));
        }

        let players = self.players.read();
        let player = players.get(&player_id).ok_or(RoomError::NotInRoom(player_id))?;
        if player.status() != PlayerStatus::Playing {
            return Err(RoomError::NotPlaying(player_id));
        }
        if player.has_bet() {
            return Err(RoomError::AlreadyBet(player_id));
        }
        player.place_bet(amount);
        info!("房间 {} 的玩家 {} 下注 {}", self.id, player_id, amount);

        Ok(Self::bets_complete(&players))
    }

    pub fn all_bets_placed(&self) -> bool {
        Self::bets_complete(&self.players.read())
    }

    fn bets_complete(players: &HashMap<PlayerId, Arc<Player>>) -> bool {
        players
            .values()
            .filter(|p| p.status() == PlayerStatus::Playing)
            .all(|p| p.has_bet())
    }

    /// 下注结束，进入摊牌阶段。调用方负责先确认所有人都已下注
    pub fn finish_betting(&self) -> Result<(), RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::Betting, "finish betting")?;
        fsm.transition_to(GameState::Showdown)?;
        info!("房间 {} 下注结束", self.id);
        Ok(())
    }

    /// 摊牌：评估所有在玩玩家的手牌，找出赢家，进入结算阶段
    ///
    /// 与最大手牌比较结果相等的玩家都算赢家。
    pub fn showdown(&self) -> Result<Showdown, RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::Showdown, "showdown")?;

        let players = self.players.read();
        let mut hands: Vec<(&Arc<Player>, Vec<Card>)> = players
            .values()
            .filter(|p| p.status() == PlayerStatus::Playing)
            .map(|p| (p, p.hand()))
            .collect();
        hands.sort_by_key(|(p, _)| p.id);

        let best = hands
            .iter()
            .map(|(_, hand)| hand)
            .max_by(|a, b| compare_hands(a, b))
            .cloned();

        let results: Vec<ShowdownResult> = hands
            .into_iter()
            .map(|(player, hand)| {
                let is_winner = best
                    .as_ref()
                    .is_some_and(|best| compare_hands(&hand, best) == Ordering::Equal);
                ShowdownResult {
                    player_id: player.id,
                    hand_value: calculate_bull(&hand),
                    hand,
                    bet: player.bet_amount(),
                    is_winner,
                }
            })
            .collect();

        let showdown = Showdown { results };
        *self.showdown.lock() = Some(showdown.clone());

        fsm.transition_to(GameState::Settlement)?;
        info!(
            "房间 {} 摊牌完成，赢家: {:?}",
            self.id,
            showdown.winners().collect::<Vec<_>>()
        );
        Ok(showdown)
    }

    /// 结算：赢家加上自己的下注额，其余参与摊牌的玩家减去自己的下注额
    ///
    /// 所有人的下注清零，参与本局的玩家回到等待状态，房间回到 WaitingForPlayers。
    pub fn settlement(&self) -> Result<Vec<ScoreDelta>, RoomError> {
        let mut fsm = self.fsm.lock();
        fsm.require(GameState::Settlement, "settle")?;

        let players = self.players.read();
        let showdown = self.showdown.lock().take();
        let mut deltas = Vec::new();

        for result in showdown.iter().flat_map(|s| s.results.iter()) {
            // 摊牌后被移出房间的玩家不再结算
            let Some(player) = players.get(&result.player_id) else {
                continue;
            };
            let bet = i64::from(result.bet);
            let delta = if result.is_winner { bet } else { -bet };
            let new_score = player.add_score(delta);
            deltas.push(ScoreDelta { player_id: player.id, delta, new_score });
        }

        for player in players.values() {
            player.reset_bet();
            if player.status() == PlayerStatus::Playing {
                player.set_status(PlayerStatus::Waiting);
            }
        }

        fsm.transition_to(GameState::WaitingForPlayers)?;
        info!("房间 {} 结算完成", self.id);
        Ok(deltas)
    }

    /// 有玩家掉线或被移出后检查牌局能否继续
    ///
    /// 抢庄、下注、摊牌阶段已经没有在玩的玩家时放弃本局，清掉手牌、庄家和下注，
    /// 回到 WaitingForPlayers；下注阶段剩下的在玩玩家都已下注时结束下注。
    /// 返回处理后的状态。
    pub fn resume_after_departure(&self) -> Result<GameState, RoomError> {
        let mut fsm = self.fsm.lock();
        let state = fsm.state();
        if !matches!(state, GameState::Bidding | GameState::Betting | GameState::Showdown) {
            return Ok(state);
        }

        let players = self.players.read();
        if !players.values().any(|p| p.status() == PlayerStatus::Playing) {
            for player in players.values() {
                player.clear_hand();
                player.set_banker(false);
                player.reset_bet();
            }
            *self.showdown.lock() = None;
            fsm.abandon_round();
            info!("房间 {} 在 {} 阶段已无在玩玩家，本局作废", self.id, state);
        } else if state == GameState::Betting && Self::bets_complete(&players) {
            fsm.transition_to(GameState::Showdown)?;
            info!("房间 {} 剩余玩家均已下注，下注结束", self.id);
        }
        Ok(fsm.state())
    }

    // --- 对外展示 ---

    /// 为某个玩家生成房间快照，只包含他自己的手牌
    pub fn snapshot_for(&self, player_id: PlayerId) -> RoomSnapshot {
        let state = self.fsm.lock().state();
        let players = self.players.read();

        let mut infos: Vec<_> = players.values().map(|p| p.info()).collect();
        infos.sort_by(|a, b| a.nickname.cmp(&b.nickname).then(a.id.cmp(&b.id)));

        RoomSnapshot {
            room_id: self.id,
            banker_id: infos.iter().find(|p| p.is_banker).map(|p| p.id),
            players: infos,
            your_hand: players.get(&player_id).map(|p| p.hand()).unwrap_or_default(),
            state,
        }
    }
}

// --- 单元测试 ---
