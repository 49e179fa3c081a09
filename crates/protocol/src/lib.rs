//! Wire protocol of the bridge.
//!
//! Requests are single text lines with `:` separated fields, the first field
//! naming the command. Responses are single lines terminated by `\n`.

pub mod command;
pub mod ole;
pub mod response;
pub mod symbol;

pub use command::{CommandName, Request};
pub use response::{format_decimal, BarRow, InstrumentRow, Response};
pub use symbol::translate_symbol;

/// Errors produced while decoding protocol values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("OLE date {0:e} is out of range")]
    OleDateOutOfRange(f64),
}
