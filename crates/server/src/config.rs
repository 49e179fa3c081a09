use crate::error::ConfigError;
use crate::log::LogLevel;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Fixed port the trading client connects to.
pub const DEFAULT_PORT: u16 = 8888;
/// Largest request the bridge accepts in one read.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Runtime settings of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listen address; must be a loopback address.
    pub host: IpAddr,
    pub port: u16,
    /// Initial severity threshold, changed at runtime by `SETLOGLEVEL`.
    pub log_level: LogLevel,
    /// Minimum spacing of heartbeat lines, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Upper bound on a `GETHISTORY` wait, in seconds.
    pub history_timeout_secs: u64,
    /// Poll period while waiting for a history callback, in milliseconds.
    pub history_poll_millis: u64,
    /// Bytes read per request. A request longer than this is split across
    /// reads and each piece is treated as its own command.
    pub read_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            log_level: LogLevel::Info,
            heartbeat_interval_secs: 10,
            history_timeout_secs: 30,
            history_poll_millis: 100,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.host.is_loopback() {
            return Err(ConfigError::NotLoopback(self.host));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Zero {
                field: "read_buffer_size",
            });
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "heartbeat_interval_secs",
            });
        }
        if self.history_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "history_timeout_secs",
            });
        }
        if self.history_poll_millis == 0 {
            return Err(ConfigError::Zero {
                field: "history_poll_millis",
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history_timeout_secs)
    }

    pub fn history_poll(&self) -> Duration {
        Duration::from_millis(self.history_poll_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_compiled_constants() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:8888");
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.history_timeout(), Duration::from_secs(30));
        assert_eq!(config.read_buffer_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            port = 9999
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.history_timeout_secs, 30);
    }

    #[test]
    fn test_rejects_non_loopback_host() {
        let config = BridgeConfig {
            host: "0.0.0.0".parse().unwrap(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotLoopback(_))));
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let config = BridgeConfig {
            read_buffer_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "read_buffer_size"
            })
        );
    }
}
