use ntbridge_core::PlatformError;
use ntbridge_protocol::ProtocolError;

/// Why a command failed. The `Display` text is what follows `ERROR:` on the
/// wire, so the messages are part of the protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    // Protocol errors
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0}")]
    MissingArgument(&'static str),
    #[error("Invalid order format")]
    InvalidOrderFormat,
    #[error("Invalid history request format")]
    InvalidHistoryFormat,
    #[error("Invalid {field} '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("Invalid log level '{0}'. Use: TRACE/DEBUG/INFO/WARN/ERROR")]
    InvalidLogLevel(String),

    // Session-state errors
    #[error("Not logged in")]
    NotLoggedIn,
    #[error("Account '{0}' not found")]
    AccountNotFound(String),
    #[error("Not subscribed to instrument")]
    NotSubscribed,
    #[error("Order not found")]
    OrderNotFound,

    // Host platform errors
    #[error("Instrument '{0}' not found in NinjaTrader")]
    UnknownInstrument(String),
    #[error("Instrument not found")]
    InstrumentNotFound,
    #[error("Bars request timeout")]
    HistoryTimeout,
    #[error("{0}")]
    Platform(#[from] PlatformError),
    #[error("{0}")]
    Protocol(String),
    #[error("{0}")]
    Panicked(String),
}

impl From<ProtocolError> for CommandError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownCommand(name) => CommandError::UnknownCommand(name),
            other => CommandError::Protocol(other.to_string()),
        }
    }
}

/// Invalid server configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bind host {0} is not a loopback address")]
    NotLoopback(std::net::IpAddr),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Failure to start the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
}
