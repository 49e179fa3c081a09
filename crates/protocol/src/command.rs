use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Commands understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    Ping,
    Version,
    Login,
    Logout,
    Connected,
    Subscribe,
    Unsubscribe,
    GetPrice,
    GetAccount,
    GetPosition,
    PlaceOrder,
    CancelOrder,
    GetOrderStatus,
    SetLogLevel,
    GetHistory,
    GetInstruments,
}

impl CommandName {
    pub const ALL: [CommandName; 16] = [
        CommandName::Ping,
        CommandName::Version,
        CommandName::Login,
        CommandName::Logout,
        CommandName::Connected,
        CommandName::Subscribe,
        CommandName::Unsubscribe,
        CommandName::GetPrice,
        CommandName::GetAccount,
        CommandName::GetPosition,
        CommandName::PlaceOrder,
        CommandName::CancelOrder,
        CommandName::GetOrderStatus,
        CommandName::SetLogLevel,
        CommandName::GetHistory,
        CommandName::GetInstruments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Ping => "PING",
            CommandName::Version => "VERSION",
            CommandName::Login => "LOGIN",
            CommandName::Logout => "LOGOUT",
            CommandName::Connected => "CONNECTED",
            CommandName::Subscribe => "SUBSCRIBE",
            CommandName::Unsubscribe => "UNSUBSCRIBE",
            CommandName::GetPrice => "GETPRICE",
            CommandName::GetAccount => "GETACCOUNT",
            CommandName::GetPosition => "GETPOSITION",
            CommandName::PlaceOrder => "PLACEORDER",
            CommandName::CancelOrder => "CANCELORDER",
            CommandName::GetOrderStatus => "GETORDERSTATUS",
            CommandName::SetLogLevel => "SETLOGLEVEL",
            CommandName::GetHistory => "GETHISTORY",
            CommandName::GetInstruments => "GETINSTRUMENTS",
        }
    }
}

impl FromStr for CommandName {
    type Err = ProtocolError;

    /// Expects an already upper-cased name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request line: the upper-cased command token plus the
/// positional arguments that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: String,
    pub args: Vec<&'a str>,
}

impl<'a> Request<'a> {
    /// Split a trimmed request line on `:`. Never fails; an empty line yields
    /// an empty command token.
    pub fn parse(line: &'a str) -> Self {
        let mut fields = line.split(':');
        let command = fields.next().unwrap_or_default().to_ascii_uppercase();
        Self {
            command,
            args: fields.collect(),
        }
    }

    pub fn name(&self) -> Result<CommandName, ProtocolError> {
        self.command.parse()
    }

    /// Argument at `index`, if the client sent that many fields.
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }
}
