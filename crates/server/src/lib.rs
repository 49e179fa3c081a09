//! Session engine and TCP server of the bridge.
//!
//! A [`BridgeServer`] accepts loopback connections and hands every request
//! line to a [`Dispatcher`], which runs it against the one process-wide
//! [`Session`] and a [`TradingPlatform`](ntbridge_core::TradingPlatform).

pub mod log;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod session;

pub use config::{BridgeConfig, DEFAULT_PORT, READ_BUFFER_SIZE};
pub use dispatch::Dispatcher;
pub use error::{CommandError, ConfigError, ServerError};
pub use log::{BridgeLog, Heartbeat, HeartbeatSummary, LogLevel, ParseLogLevelError};
pub use server::{BridgeServer, ServerHandle};
pub use session::{ActiveAccount, Session};
