//! Leveled bridge diagnostics and the periodic heartbeat summary.
//!
//! The bridge keeps its own severity threshold (changed at runtime by the
//! `SETLOGLEVEL` command) and only hands records at or above it to
//! `tracing`, under the `ntbridge` target.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Bridge severities, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized log level text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid log level '{0}'. Use: TRACE/DEBUG/INFO/WARN/ERROR")]
pub struct ParseLogLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    /// Accepts the level name in any case, or its ordinal `0`-`4`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.as_str() {
            "TRACE" | "0" => Ok(LogLevel::Trace),
            "DEBUG" | "1" => Ok(LogLevel::Debug),
            "INFO" | "2" => Ok(LogLevel::Info),
            "WARN" | "3" => Ok(LogLevel::Warn),
            "ERROR" | "4" => Ok(LogLevel::Error),
            _ => Err(ParseLogLevelError(upper)),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ParseLogLevelError;

    fn try_from(value: String) -> Result<Self, ParseLogLevelError> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Shared, last-writer-wins severity threshold.
#[derive(Debug)]
pub struct BridgeLog {
    threshold: AtomicU8,
}

impl BridgeLog {
    pub fn new(level: LogLevel) -> Self {
        Self {
            threshold: AtomicU8::new(level as u8),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    /// Install a new threshold, returning the previous one.
    pub fn set_level(&self, level: LogLevel) -> LogLevel {
        LogLevel::from_u8(self.threshold.swap(level as u8, Ordering::Relaxed))
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }
}

impl Default for BridgeLog {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

/// Emit a bridge record if `$log` lets the level through.
///
/// ```ignore
/// bridge_log!(session.log(), Info, "Subscribed to {}", symbol);
/// ```
macro_rules! bridge_log {
    ($log:expr, Trace, $($arg:tt)+) => {
        if $log.enabled($crate::log::LogLevel::Trace) {
            ::tracing::trace!(target: "ntbridge", $($arg)+);
        }
    };
    ($log:expr, Debug, $($arg:tt)+) => {
        if $log.enabled($crate::log::LogLevel::Debug) {
            ::tracing::debug!(target: "ntbridge", $($arg)+);
        }
    };
    ($log:expr, Info, $($arg:tt)+) => {
        if $log.enabled($crate::log::LogLevel::Info) {
            ::tracing::info!(target: "ntbridge", $($arg)+);
        }
    };
    ($log:expr, Warn, $($arg:tt)+) => {
        if $log.enabled($crate::log::LogLevel::Warn) {
            ::tracing::warn!(target: "ntbridge", $($arg)+);
        }
    };
    ($log:expr, Error, $($arg:tt)+) => {
        if $log.enabled($crate::log::LogLevel::Error) {
            ::tracing::error!(target: "ntbridge", $($arg)+);
        }
    };
}

pub(crate) use bridge_log;

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// Counters reported by one heartbeat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSummary {
    /// Price requests since the previous heartbeat.
    pub price_requests: u64,
    /// Orders placed since startup.
    pub orders_placed: u64,
    /// Instruments currently subscribed.
    pub instruments: usize,
}

impl fmt::Display for HeartbeatSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status OK | Prices:{} Orders:{} Instruments:{}",
            self.price_requests, self.orders_placed, self.instruments
        )
    }
}

/// Activity counters plus the clock deciding when a summary is due.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    last: Mutex<Instant>,
    price_requests: AtomicU64,
    orders_placed: AtomicU64,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: Mutex::new(now),
            price_requests: AtomicU64::new(0),
            orders_placed: AtomicU64::new(0),
        }
    }

    pub fn record_price_request(&self) {
        self.price_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn price_requests(&self) -> u64 {
        self.price_requests.load(Ordering::Relaxed)
    }

    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::Relaxed)
    }

    /// Returns a summary when at least one interval has elapsed since the
    /// previous one, restarting the clock and the price-request count.
    /// The order count is cumulative and never reset here.
    pub fn check(&self, now: Instant, instruments: usize) -> Option<HeartbeatSummary> {
        let mut last = self.last.lock();
        if now.saturating_duration_since(*last) < self.interval {
            return None;
        }
        *last = now;
        Some(HeartbeatSummary {
            price_requests: self.price_requests.swap(0, Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            instruments,
        })
    }

    /// Zero every counter and restart the clock.
    pub fn reset(&self, now: Instant) {
        *self.last.lock() = now;
        self.price_requests.store(0, Ordering::Relaxed);
        self.orders_placed.store(0, Ordering::Relaxed);
    }
}
