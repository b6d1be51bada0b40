//! 进程内的房间目录
//!
//! 维护 `RoomId → Room` 和 `PlayerId → RoomId` 两张表。
//! 两张表彼此独立，由调用方保证同步；注册表由使用者显式创建并传入，不是全局单例。
//!
//! 锁顺序：房间表的分片锁 -> 房间内部的锁。只有 `delete_room_if_empty` 会同时持有两者，
//! 房间内部从不回头访问注册表。

use crate::error::{RegistryError, RoomError};
use crate::player::Player;
use crate::room::Room;
use crate::state::{PlayerId, RoomConfig, RoomId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Registry {
    config: RoomConfig,
    rooms: DashMap<RoomId, Arc<Room>>,
    player_room: DashMap<PlayerId, RoomId>,
    // 每个房间一个后台清理任务，删除房间时取消
    sweepers: DashMap<RoomId, JoinHandle<()>>,
}

impl Registry {
    pub fn new(config: RoomConfig) -> Arc<Registry> {
        Arc::new(Registry {
            config,
            rooms: DashMap::new(),
            player_room: DashMap::new(),
            sweepers: DashMap::new(),
        })
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// 创建房间；在 tokio 运行时内会同时启动该房间的掉线清理任务
    pub fn create_room(self: &Arc<Self>, room_id: RoomId) -> Result<Arc<Room>, RegistryError> {
        let room = match self.rooms.entry(room_id) {
            Entry::Occupied(_) => return Err(RegistryError::RoomExists(room_id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Room::new(room_id, &self.config))).clone()
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(sweep_loop(Arc::downgrade(self), room_id));
                self.sweepers.insert(room_id, task);
            }
            Err(_) => warn!("房间 {} 创建于 tokio 运行时之外，不会自动清理掉线玩家", room_id),
        }

        info!("创建房间 {}", room_id);
        Ok(room)
    }

    pub fn get_room(&self, room_id: RoomId) -> Result<Arc<Room>, RegistryError> {
        self.rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or(RegistryError::RoomNotFound(room_id))
    }

    /// 房间存在就返回它，否则新建
    pub fn get_or_create_room(self: &Arc<Self>, room_id: RoomId) -> Arc<Room> {
        loop {
            if let Ok(room) = self.get_room(room_id) {
                return room;
            }
            // 并发创建时另一方可能抢先，重试一次 get 即可
            if let Ok(room) = self.create_room(room_id) {
                return room;
            }
        }
    }

    /// 把玩家放进 `room_id` 对应的房间（不存在时创建），并登记索引
    ///
    /// 房间可能在加入的过程中因为变空而被删除，这时把玩家从旧房间撤出，换到新房间重试。
    pub fn admit(self: &Arc<Self>, room_id: RoomId, player: Arc<Player>) -> Result<Arc<Room>, RoomError> {
        loop {
            let room = self.get_or_create_room(room_id);
            if self.seat(&room, player.clone())? {
                return Ok(room);
            }
        }
    }

    /// 把玩家加进 `room`，并复核它仍是注册表里的那个房间。返回 false 表示房间已被删除
    fn seat(&self, room: &Arc<Room>, player: Arc<Player>) -> Result<bool, RoomError> {
        let player_id = player.id;
        room.add_player(player)?;
        let current = self.rooms.get(&room.id).is_some_and(|r| Arc::ptr_eq(r.value(), room));
        if !current {
            let _ = room.remove_player(player_id);
            debug!("房间 {} 在玩家 {} 加入时已被删除，重试", room.id, player_id);
            return Ok(false);
        }
        self.register_player(player_id, room.id);
        Ok(true)
    }

    /// 房间为空时删除它并取消清理任务，返回是否删除
    ///
    /// 判空在房间表的分片锁内完成，和 `seat` 的复核配合，不会把玩家留在已删除的房间里。
    pub fn delete_room_if_empty(&self, room_id: RoomId) -> bool {
        if self.rooms.remove_if(&room_id, |_, room| room.is_empty()).is_none() {
            return false;
        }
        if let Some((_, task)) = self.sweepers.remove(&room_id) {
            task.abort();
        }
        info!("房间 {} 已空，已被移除", room_id);
        true
    }

    /// 删除房间并取消它的清理任务
    pub fn delete_room(&self, room_id: RoomId) -> Result<Arc<Room>, RegistryError> {
        let (_, room) = self
            .rooms
            .remove(&room_id)
            .ok_or(RegistryError::RoomNotFound(room_id))?;
        if let Some((_, task)) = self.sweepers.remove(&room_id) {
            task.abort();
        }
        info!("删除房间 {}", room_id);
        Ok(room)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn register_player(&self, player_id: PlayerId, room_id: RoomId) {
        self.player_room.insert(player_id, room_id);
    }

    pub fn unregister_player(&self, player_id: PlayerId) {
        self.player_room.remove(&player_id);
    }

    /// 根据玩家 ID 找到他所在的房间
    pub fn room_by_player(&self, player_id: PlayerId) -> Result<Arc<Room>, RegistryError> {
        // 先把 room_id 拷出来，释放分片锁后再查房间表
        let room_id = *self
            .player_room
            .get(&player_id)
            .ok_or(RegistryError::PlayerNotRegistered(player_id))?;
        self.get_room(room_id).map_err(|_| {
            warn!("玩家 {} 指向的房间 {} 已不存在", player_id, room_id);
            RegistryError::Inconsistent { player: player_id, room: room_id }
        })
    }

    /// 清理一个房间里掉线超时的玩家，并同步注销他们的索引
    pub fn sweep_room(&self, room_id: RoomId, now: Instant) -> Result<Vec<PlayerId>, RegistryError> {
        let room = self.get_room(room_id)?;
        let evicted = room.sweep_offline(now, self.config.offline_timeout);
        for player_id in &evicted {
            self.unregister_player(*player_id);
        }
        if !evicted.is_empty() {
            // 被移出的玩家可能正卡着牌局
            if let Err(e) = room.resume_after_departure() {
                warn!("房间 {} 清理后推进牌局失败: {}", room_id, e);
            }
        }
        Ok(evicted)
    }
}

async fn sweep_loop(registry: Weak<Registry>, room_id: RoomId) {
    let period = match registry.upgrade() {
        Some(r) => r.config.sweep_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let now = ticker.tick().await;
        let Some(registry) = registry.upgrade() else {
            return;
        };
        match registry.sweep_room(room_id, now) {
            Ok(evicted) if !evicted.is_empty() => {
                info!("房间 {} 清理了 {} 名掉线玩家", room_id, evicted.len());
                if registry.delete_room_if_empty(room_id) {
                    return;
                }
            }
            Ok(_) => debug!("房间 {} 没有需要清理的玩家", room_id),
            // 房间已被删除
            Err(_) => return,
        }
    }
}
