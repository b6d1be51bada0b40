//! # 斗牛核心逻辑库
//!
//! 这个 `core` crate 包含了斗牛（牛牛）游戏的牌、牌型计算、
//! 玩家与房间状态、房间状态机、房间注册表以及客户端-服务器通信消息的定义。
//! 它不依赖具体的网络传输，服务器和客户端都可以直接复用。

mod bull;
mod card;
mod error;
mod fsm;
mod message;
mod player;
mod registry;
mod room;
mod state;

pub use bull::*;

pub use card::*;

pub use error::*;

pub use fsm::*;

pub use message::*;

pub use player::*;

pub use registry::*;

pub use room::*;

pub use state::*;
