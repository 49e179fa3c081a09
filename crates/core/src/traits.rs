use crate::models::*;
use async_trait::async_trait;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Platform Errors
// ---------------------------------------------------------------------------

/// Errors raised by the trading platform behind the bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Order rejected: {0}")]
    OrderRejected(String),
    #[error("No market data for {0}")]
    NoMarketData(String),
    #[error("Bars request failed: {code} - {message}")]
    HistoryFailed { code: String, message: String },
    #[error("Unknown order {0}")]
    UnknownOrder(String),
    #[error("Unknown account {0}")]
    UnknownAccount(String),
    #[error("{0}")]
    Other(String),
}

/// Completion callback of a historical bars request. Invoked exactly once,
/// possibly from another task.
pub type HistoryCallback = Box<dyn FnOnce(Result<Vec<Bar>, PlatformError>) + Send + 'static>;

// ---------------------------------------------------------------------------
// Trading Platform Trait
// ---------------------------------------------------------------------------

/// The narrow capability surface the bridge needs from the host trading
/// platform. Handles are opaque and owned by the platform; the bridge only
/// clones and stores them.
#[async_trait]
pub trait TradingPlatform: Send + Sync + 'static {
    type Account: Clone + Send + Sync + 'static;
    type Instrument: Clone + PartialEq + Send + Sync + 'static;
    type Order: Clone + Send + Sync + 'static;

    /// Look up an account by exact name.
    async fn find_account(&self, name: &str) -> Option<Self::Account>;

    /// Read one currency value of an account.
    async fn account_value(
        &self,
        account: &Self::Account,
        item: AccountItem,
    ) -> Result<Decimal, PlatformError>;

    /// Current positions of an account.
    async fn account_positions(
        &self,
        account: &Self::Account,
    ) -> Result<Vec<PlatformPosition<Self::Instrument>>, PlatformError>;

    /// Resolve a canonical symbol (e.g. `MES 03-26`) to an instrument.
    async fn resolve_instrument(&self, symbol: &str) -> Option<Self::Instrument>;

    /// Latest market data of an instrument.
    async fn quote(&self, instrument: &Self::Instrument) -> Result<Quote, PlatformError>;

    /// Contract specification of an instrument.
    async fn contract_spec(&self, instrument: &Self::Instrument)
        -> Result<ContractSpec, PlatformError>;

    /// Create and submit an order. Errors when the platform rejects it.
    async fn submit_order(
        &self,
        account: &Self::Account,
        instrument: &Self::Instrument,
        request: &OrderRequest,
    ) -> Result<Self::Order, PlatformError>;

    /// Platform-assigned identifier of an order.
    fn order_id(&self, order: &Self::Order) -> String;

    /// Request cancellation of a working order.
    async fn cancel_order(
        &self,
        account: &Self::Account,
        order: &Self::Order,
    ) -> Result<(), PlatformError>;

    /// Current state and fill progress of an order.
    async fn order_status(&self, order: &Self::Order) -> Result<OrderSnapshot, PlatformError>;

    /// Start an asynchronous historical bars request. `on_complete` receives
    /// the bars or the failure once the platform finishes.
    async fn request_historical_bars(
        &self,
        instrument: &Self::Instrument,
        request: HistoryRequest,
        on_complete: HistoryCallback,
    ) -> Result<(), PlatformError>;

    /// Every instrument the platform knows that has live market data attached.
    async fn instruments_with_quotes(&self) -> Result<Vec<Self::Instrument>, PlatformError>;
}
