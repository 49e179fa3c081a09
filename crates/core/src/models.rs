use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// The platform's classification of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Future,
    Stock,
    Index,
    Forex,
    Cfd,
    Option,
    Unknown,
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentType::Future => "Future",
            InstrumentType::Stock => "Stock",
            InstrumentType::Index => "Index",
            InstrumentType::Forex => "Forex",
            InstrumentType::Cfd => "Cfd",
            InstrumentType::Option => "Option",
            InstrumentType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Contract specification of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Minimum price movement (e.g. 0.25 for ES futures).
    pub tick_size: Decimal,
    /// Currency value of one full point (contract multiplier, e.g. 50 for ES).
    pub point_value: Decimal,
    /// Platform full name, e.g. `ES 12-25`.
    pub full_name: String,
    pub instrument_type: InstrumentType,
}

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// Current market data snapshot. Every field may be absent when the
/// platform has not received it from the data feed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Daily volume.
    pub volume: Option<u64>,
}

impl Quote {
    /// No field has been populated by the data feed.
    pub fn is_empty(&self) -> bool {
        self.last.is_none() && self.bid.is_none() && self.ask.is_none() && self.volume.is_none()
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Parameters of a historical minute-bar request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub bar_minutes: u32,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Account values the bridge reads from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountItem {
    CashValue,
    BuyingPower,
    RealizedProfitLoss,
}

/// Direction of an open position as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPosition {
    Long,
    Short,
    Flat,
}

impl MarketPosition {
    /// Apply the direction to an unsigned platform quantity.
    pub fn signed(&self, quantity: u32) -> i64 {
        match self {
            MarketPosition::Long => i64::from(quantity),
            MarketPosition::Short => -i64::from(quantity),
            MarketPosition::Flat => 0,
        }
    }
}

impl fmt::Display for MarketPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketPosition::Long => f.write_str("Long"),
            MarketPosition::Short => f.write_str("Short"),
            MarketPosition::Flat => f.write_str("Flat"),
        }
    }
}

/// An open position held by an account. `quantity` is always non-negative;
/// the sign lives in `market_position`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformPosition<I> {
    pub instrument: I,
    pub market_position: MarketPosition,
    pub quantity: u32,
    pub average_price: Decimal,
}

impl<I> PlatformPosition<I> {
    pub fn signed_quantity(&self) -> i64 {
        self.market_position.signed(self.quantity)
    }

    /// Unrealized PnL in account currency at `last`.
    pub fn unrealized_pnl(&self, last: Decimal, point_value: Decimal) -> Decimal {
        let quantity = Decimal::from(self.quantity);
        match self.market_position {
            MarketPosition::Long => (last - self.average_price) * quantity * point_value,
            MarketPosition::Short => (self.average_price - last) * quantity * point_value,
            MarketPosition::Flat => Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `BUY` (any case) is a buy; every other token is treated as a sell.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("BUY") {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// Client tokens: `LIMIT`, `STOP`, `STOPLIMIT`; anything else is a market order.
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "LIMIT" => OrderType::Limit,
            "STOP" => OrderType::StopMarket,
            "STOPLIMIT" => OrderType::StopLimit,
            _ => OrderType::Market,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.write_str("Market"),
            OrderType::Limit => f.write_str("Limit"),
            OrderType::StopMarket => f.write_str("StopMarket"),
            OrderType::StopLimit => f.write_str("StopLimit"),
        }
    }
}

/// An order as submitted by the client. Prices are zero when not applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: u32,
    pub limit_price: Decimal,
    pub stop_price: Decimal,
}

/// The lifecycle state of an order, named as the platform names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Initialized,
    Submitted,
    Accepted,
    Working,
    PartFilled,
    Filled,
    CancelPending,
    Cancelled,
    Rejected,
    Unknown,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderState::Initialized => "Initialized",
            OrderState::Submitted => "Submitted",
            OrderState::Accepted => "Accepted",
            OrderState::Working => "Working",
            OrderState::PartFilled => "PartFilled",
            OrderState::Filled => "Filled",
            OrderState::CancelPending => "CancelPending",
            OrderState::Cancelled => "Cancelled",
            OrderState::Rejected => "Rejected",
            OrderState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Read-through view of an order's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub state: OrderState,
    pub filled: u32,
    pub average_fill_price: Decimal,
}
