use ntbridge_core::{InstrumentType, OrderState};
use rust_decimal::Decimal;
use std::fmt;

/// Protocol version reported by `VERSION`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Render a decimal the way the platform prints numbers: no trailing zeros,
/// no exponent, plain `0` for zero.
pub fn format_decimal(value: Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    value.normalize().to_string()
}

/// One row of a `HISTORY` response.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRow {
    /// Bar time as an OLE date.
    pub time: f64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// One row of an `INSTRUMENTS` response.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRow {
    pub symbol: String,
    pub tick_size: Decimal,
    pub point_value: Decimal,
    pub last: Decimal,
    pub instrument_type: InstrumentType,
}

/// Every response line the bridge sends, without the trailing newline.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Pong,
    Version,
    LoggedIn(String),
    LoggedOut,
    Connected(bool),
    Subscribed {
        symbol: String,
        tick_size: Decimal,
        point_value: Decimal,
    },
    Unsubscribed(String),
    Price {
        last: Decimal,
        bid: Decimal,
        ask: Decimal,
        volume: u64,
    },
    Account {
        cash_value: Decimal,
        buying_power: Decimal,
        realized_pnl: Decimal,
        unrealized_pnl: Decimal,
    },
    Position {
        quantity: i64,
        average_price: Decimal,
    },
    OrderPlaced(String),
    OrderCancelled(String),
    OrderStatus {
        order_id: String,
        state: OrderState,
        filled: u32,
        average_fill_price: Decimal,
    },
    LogLevelSet(String),
    History(Vec<BarRow>),
    Instruments(Vec<InstrumentRow>),
    Error(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Pong => f.write_str("PONG"),
            Response::Version => write!(f, "VERSION:{PROTOCOL_VERSION}"),
            Response::LoggedIn(account) => write!(f, "OK:Logged in to {account}"),
            Response::LoggedOut => f.write_str("OK:Logged out"),
            Response::Connected(connected) => {
                write!(f, "CONNECTED:{}", if *connected { 1 } else { 0 })
            }
            Response::Subscribed {
                symbol,
                tick_size,
                point_value,
            } => write!(
                f,
                "OK:Subscribed:{}:{}:{}",
                symbol,
                format_decimal(*tick_size),
                format_decimal(*point_value)
            ),
            Response::Unsubscribed(symbol) => write!(f, "OK:Unsubscribed from {symbol}"),
            Response::Price {
                last,
                bid,
                ask,
                volume,
            } => write!(
                f,
                "PRICE:{}:{}:{}:{}",
                format_decimal(*last),
                format_decimal(*bid),
                format_decimal(*ask),
                volume
            ),
            Response::Account {
                cash_value,
                buying_power,
                realized_pnl,
                unrealized_pnl,
            } => write!(
                f,
                "ACCOUNT:{}:{}:{}:{}",
                format_decimal(*cash_value),
                format_decimal(*buying_power),
                format_decimal(*realized_pnl),
                format_decimal(*unrealized_pnl)
            ),
            Response::Position {
                quantity,
                average_price,
            } => write!(f, "POSITION:{}:{}", quantity, format_decimal(*average_price)),
            Response::OrderPlaced(id) => write!(f, "ORDER:{id}"),
            Response::OrderCancelled(id) => write!(f, "OK:Order {id} cancelled"),
            Response::OrderStatus {
                order_id,
                state,
                filled,
                average_fill_price,
            } => write!(
                f,
                "ORDERSTATUS:{}:{}:{}:{}",
                order_id,
                state,
                filled,
                format_decimal(*average_fill_price)
            ),
            Response::LogLevelSet(level) => write!(f, "OK:Log level set to {level}"),
            Response::History(bars) => {
                write!(f, "HISTORY:{}", bars.len())?;
                for bar in bars {
                    write!(
                        f,
                        "|{},{},{},{},{},{}",
                        bar.time,
                        format_decimal(bar.open),
                        format_decimal(bar.high),
                        format_decimal(bar.low),
                        format_decimal(bar.close),
                        bar.volume
                    )?;
                }
                Ok(())
            }
            Response::Instruments(rows) => {
                write!(f, "INSTRUMENTS:{}|", rows.len())?;
                let mut first = true;
                for row in rows {
                    if !first {
                        f.write_str("|")?;
                    }
                    first = false;
                    write!(
                        f,
                        "{},{},{},{},{}",
                        row.symbol,
                        format_decimal(row.tick_size),
                        format_decimal(row.point_value),
                        format_decimal(row.last),
                        row.instrument_type
                    )?;
                }
                Ok(())
            }
            Response::Error(message) => write!(f, "ERROR:{message}"),
        }
    }
}
