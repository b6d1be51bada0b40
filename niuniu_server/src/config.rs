//! 服务器配置，全部来自环境变量

use niuniu_core::RoomConfig;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:25917";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub room: RoomConfig,
}

impl ServerConfig {
    /// 读取 `NIUNIU_BIND`、`NIUNIU_SWEEP_INTERVAL_SECS`、`NIUNIU_OFFLINE_TIMEOUT_SECS`，
    /// 没有设置的项使用默认值
    pub fn from_env() -> Result<ServerConfig, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig, ConfigError> {
        let bind = parse_or("NIUNIU_BIND", &lookup, || {
            DEFAULT_BIND.parse().map_err(|_| invalid("NIUNIU_BIND", DEFAULT_BIND))
        })?;

        let defaults = RoomConfig::default();
        let sweep_interval = secs("NIUNIU_SWEEP_INTERVAL_SECS", &lookup, defaults.sweep_interval)?;
        let offline_timeout = secs("NIUNIU_OFFLINE_TIMEOUT_SECS", &lookup, defaults.offline_timeout)?;

        Ok(ServerConfig {
            bind,
            room: RoomConfig { sweep_interval, offline_timeout, ..defaults },
        })
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { key, value: value.to_string() }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: impl FnOnce() -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => default(),
    }
}

fn secs(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parse_or(key, lookup, || Ok(default.as_secs()))?;
    // 周期和超时都必须大于 0
    if secs == 0 {
        return Err(invalid(key, "0"));
    }
    Ok(Duration::from_secs(secs))
}
