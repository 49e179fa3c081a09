use crate::config::SimConfig;
use async_trait::async_trait;
use chrono::DateTime;
use ntbridge_core::*;
use ntbridge_data::{load_bars_from_csv, DataError};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Account handle: the account name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRef(Arc<str>);

/// Instrument handle: the canonical instrument name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentRef(Arc<str>);

/// Order handle: the order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderRef(Arc<str>);

impl AccountRef {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl InstrumentRef {
    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl OrderRef {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrderRef {
    fn from(id: &str) -> Self {
        OrderRef(Arc::from(id))
    }
}

/// How the simulated history service answers requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HistoryMode {
    /// Complete with the stored bars.
    #[default]
    Normal,
    /// Complete with a platform error.
    Fail { code: String, message: String },
    /// Accept the request and never call back. The callback is kept
    /// alive so the caller sees a pending request, not a dropped one.
    Silent,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SimPosition {
    market_position: MarketPosition,
    quantity: u32,
    average_price: Decimal,
}

impl SimPosition {
    fn signed(&self) -> i64 {
        self.market_position.signed(self.quantity)
    }
}

#[derive(Debug, Clone)]
struct SimAccount {
    cash: Decimal,
    buying_power: Option<Decimal>,
    realized_pnl: Decimal,
    positions: HashMap<String, SimPosition>,
}

#[derive(Debug, Clone)]
struct SimInstrument {
    spec: ContractSpec,
    quote: Quote,
}

#[derive(Debug, Clone)]
struct SimOrder {
    account: String,
    symbol: String,
    request: OrderRequest,
    /// Stop-limit orders whose stop has been touched behave as limits.
    stop_triggered: bool,
    state: OrderState,
    filled: u32,
    average_fill_price: Decimal,
}

#[derive(Debug, Default)]
struct SimState {
    accounts: HashMap<String, SimAccount>,
    instruments: HashMap<String, SimInstrument>,
    /// Alternative name to canonical name.
    aliases: HashMap<String, String>,
    orders: HashMap<String, SimOrder>,
    bars: HashMap<String, Vec<Bar>>,
}

/// An in-memory trading platform.
///
/// Market orders fill at the last price on submission; limit and stop
/// orders rest until [`SimulatedPlatform::update_last`] moves the market
/// through them. Fills net into the account position and realize PnL at
/// the instrument's point value.
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
    history_mode: Mutex<HistoryMode>,
    /// Callbacks accepted in silent mode.
    unanswered: Mutex<Vec<HistoryCallback>>,
    calls: AtomicU64,
}

impl SimulatedPlatform {
    pub fn new(config: &SimConfig) -> Self {
        let mut state = SimState::default();

        for account in &config.accounts {
            state.accounts.insert(
                account.name.clone(),
                SimAccount {
                    cash: account.cash,
                    buying_power: account.buying_power,
                    realized_pnl: Decimal::ZERO,
                    positions: HashMap::new(),
                },
            );
        }

        for instrument in &config.instruments {
            for alias in &instrument.aliases {
                state
                    .aliases
                    .insert(alias.clone(), instrument.symbol.clone());
            }
            state.instruments.insert(
                instrument.symbol.clone(),
                SimInstrument {
                    spec: ContractSpec {
                        tick_size: instrument.tick_size,
                        point_value: instrument.point_value,
                        full_name: instrument.symbol.clone(),
                        instrument_type: instrument.instrument_type,
                    },
                    quote: Quote {
                        last: instrument.last,
                        bid: instrument.bid,
                        ask: instrument.ask,
                        volume: instrument.volume,
                    },
                },
            );
        }

        Self {
            state: Mutex::new(state),
            history_mode: Mutex::new(HistoryMode::Normal),
            unanswered: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Read the CSV bar files named in `config` into the history store.
    pub fn load_history(&self, config: &SimConfig) -> Result<usize, DataError> {
        let mut total = 0;
        for instrument in &config.instruments {
            if let Some(path) = &instrument.bars_csv {
                let bars = load_bars_from_csv(path)?;
                total += bars.len();
                info!(
                    instrument = %instrument.symbol,
                    bars = bars.len(),
                    "Loaded simulated history"
                );
                self.add_bars(&instrument.symbol, bars);
            }
        }
        Ok(total)
    }

    // -- inspection and control (not part of the platform surface) --------

    /// Number of platform trait calls served so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn find_account_handle(&self, name: &str) -> Option<AccountRef> {
        let state = self.state.lock();
        state
            .accounts
            .contains_key(name)
            .then(|| AccountRef(Arc::from(name)))
    }

    pub fn instrument_handle(&self, symbol: &str) -> Option<InstrumentRef> {
        let state = self.state.lock();
        let canonical = state.aliases.get(symbol).map(String::as_str).unwrap_or(symbol);
        state
            .instruments
            .contains_key(canonical)
            .then(|| InstrumentRef(Arc::from(canonical)))
    }

    pub fn set_history_mode(&self, mode: HistoryMode) {
        *self.history_mode.lock() = mode;
    }

    /// History requests accepted in silent mode and never answered.
    pub fn unanswered_history_requests(&self) -> usize {
        self.unanswered.lock().len()
    }

    pub fn add_bars(&self, symbol: &str, mut bars: Vec<Bar>) {
        let mut state = self.state.lock();
        let stored = state.bars.entry(symbol.to_string()).or_default();
        stored.append(&mut bars);
        stored.sort_by_key(|b| b.timestamp);
    }

    pub fn set_quote(&self, symbol: &str, quote: Quote) {
        let mut state = self.state.lock();
        if let Some(instrument) = state.instruments.get_mut(symbol) {
            instrument.quote = quote;
        }
    }

    /// Move the last price and fill any resting order it crosses.
    pub fn update_last(&self, symbol: &str, last: Decimal) {
        let mut state = self.state.lock();
        match state.instruments.get_mut(symbol) {
            Some(instrument) => instrument.quote.last = Some(last),
            None => return,
        }
        Self::process_working_orders(&mut state, symbol, last);
    }

    /// Overwrite an account's position in `symbol`.
    pub fn set_position(
        &self,
        account: &str,
        symbol: &str,
        market_position: MarketPosition,
        quantity: u32,
        average_price: Decimal,
    ) {
        let mut state = self.state.lock();
        if let Some(acct) = state.accounts.get_mut(account) {
            acct.positions.insert(
                symbol.to_string(),
                SimPosition {
                    market_position,
                    quantity,
                    average_price,
                },
            );
        }
    }

    // -- order simulation -------------------------------------------------

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn validate(request: &OrderRequest) -> Result<(), PlatformError> {
        if request.quantity == 0 {
            return Err(PlatformError::OrderRejected(
                "quantity must be positive".to_string(),
            ));
        }
        let needs_limit = matches!(request.order_type, OrderType::Limit | OrderType::StopLimit);
        if needs_limit && request.limit_price <= Decimal::ZERO {
            return Err(PlatformError::OrderRejected(
                "limit price required".to_string(),
            ));
        }
        let needs_stop = matches!(
            request.order_type,
            OrderType::StopMarket | OrderType::StopLimit
        );
        if needs_stop && request.stop_price <= Decimal::ZERO {
            return Err(PlatformError::OrderRejected("stop price required".to_string()));
        }
        Ok(())
    }

    /// Fill price for a resting order at `last`, if it is marketable.
    fn trigger_price(order: &mut SimOrder, last: Decimal) -> Option<Decimal> {
        let req = &order.request;
        let limit_cross = |limit: Decimal| match req.side {
            Side::Buy => last <= limit,
            Side::Sell => last >= limit,
        };
        let stop_cross = |stop: Decimal| match req.side {
            Side::Buy => last >= stop,
            Side::Sell => last <= stop,
        };
        match req.order_type {
            OrderType::Market => Some(last),
            OrderType::Limit => limit_cross(req.limit_price).then_some(req.limit_price),
            OrderType::StopMarket => stop_cross(req.stop_price).then_some(last),
            OrderType::StopLimit => {
                if !order.stop_triggered && stop_cross(req.stop_price) {
                    order.stop_triggered = true;
                }
                (order.stop_triggered && limit_cross(req.limit_price)).then_some(req.limit_price)
            }
        }
    }

    fn process_working_orders(state: &mut SimState, symbol: &str, last: Decimal) {
        let mut fills = Vec::new();
        for (id, order) in state.orders.iter_mut() {
            if order.symbol != symbol || order.state != OrderState::Working {
                continue;
            }
            if let Some(price) = Self::trigger_price(order, last) {
                fills.push((id.clone(), price));
            }
        }
        for (id, price) in fills {
            if let Err(e) = Self::fill_order(state, &id, price) {
                warn!(order_id = %id, error = %e, "Simulated fill rejected");
            }
        }
    }

    /// Net an order into its account at `price`. A fill the position cannot
    /// absorb leaves the position untouched and rejects the order.
    fn fill_order(state: &mut SimState, order_id: &str, price: Decimal) -> Result<(), PlatformError> {
        let Some(order) = state.orders.get(order_id) else {
            return Ok(());
        };
        let (account, symbol, side, quantity) = (
            order.account.clone(),
            order.symbol.clone(),
            order.request.side,
            order.request.quantity,
        );

        let point_value = state
            .instruments
            .get(&symbol)
            .map(|i| i.spec.point_value)
            .unwrap_or(Decimal::ONE);
        let applied = match state.accounts.get_mut(&account) {
            Some(acct) => Self::apply_fill(acct, &symbol, side, quantity, price, point_value),
            None => Ok(()),
        };

        if let Some(order) = state.orders.get_mut(order_id) {
            if applied.is_ok() {
                order.state = OrderState::Filled;
                order.filled = quantity;
                order.average_fill_price = price;
                debug!(order_id, %symbol, %side, quantity, %price, "Simulated fill");
            } else {
                order.state = OrderState::Rejected;
            }
        }
        applied
    }

    /// Net a fill into the account position, realizing PnL on the closed part.
    fn apply_fill(
        account: &mut SimAccount,
        symbol: &str,
        side: Side,
        quantity: u32,
        price: Decimal,
        point_value: Decimal,
    ) -> Result<(), PlatformError> {
        let fill_direction = match side {
            Side::Buy => MarketPosition::Long,
            Side::Sell => MarketPosition::Short,
        };
        let existing = account
            .positions
            .get(symbol)
            .filter(|p| p.signed() != 0)
            .cloned();

        match existing {
            Some(pos) if pos.market_position != fill_direction => {
                // Closing or reversing
                let close_qty = quantity.min(pos.quantity);
                let closed = Decimal::from(close_qty);
                let pnl = match pos.market_position {
                    MarketPosition::Long => (price - pos.average_price) * closed * point_value,
                    _ => (pos.average_price - price) * closed * point_value,
                };
                account.realized_pnl += pnl;
                account.cash += pnl;

                let remaining_open = pos.quantity - close_qty;
                let reversed = quantity - close_qty;
                if remaining_open > 0 {
                    account.positions.insert(
                        symbol.to_string(),
                        SimPosition {
                            quantity: remaining_open,
                            ..pos
                        },
                    );
                } else if reversed > 0 {
                    account.positions.insert(
                        symbol.to_string(),
                        SimPosition {
                            market_position: fill_direction,
                            quantity: reversed,
                            average_price: price,
                        },
                    );
                } else {
                    account.positions.remove(symbol);
                }
            }
            Some(pos) => {
                // Adding to an existing position
                let total = pos.quantity.checked_add(quantity).ok_or_else(|| {
                    PlatformError::OrderRejected("position size limit exceeded".to_string())
                })?;
                let cost = pos.average_price * Decimal::from(pos.quantity)
                    + price * Decimal::from(quantity);
                account.positions.insert(
                    symbol.to_string(),
                    SimPosition {
                        market_position: fill_direction,
                        quantity: total,
                        average_price: cost / Decimal::from(total),
                    },
                );
            }
            None => {
                account.positions.insert(
                    symbol.to_string(),
                    SimPosition {
                        market_position: fill_direction,
                        quantity,
                        average_price: price,
                    },
                );
            }
        }
        Ok(())
    }

    /// Stored bars within `[start, end]`, merged into `bar_minutes` buckets
    /// stamped with the bucket's closing time.
    fn aggregate(bars: &[Bar], request: &HistoryRequest) -> Vec<Bar> {
        let period = i64::from(request.bar_minutes.max(1)) * 60;
        let mut out: Vec<Bar> = Vec::new();
        let mut current_key = None;

        for bar in bars
            .iter()
            .filter(|b| b.timestamp >= request.start && b.timestamp <= request.end)
        {
            let secs = bar.timestamp.and_utc().timestamp();
            let key = secs.div_euclid(period) + i64::from(secs.rem_euclid(period) != 0);
            match out.last_mut() {
                Some(last) if current_key == Some(key) => {
                    last.high = last.high.max(bar.high);
                    last.low = last.low.min(bar.low);
                    last.close = bar.close;
                    last.volume += bar.volume;
                }
                _ => {
                    let stamp = DateTime::from_timestamp(key * period, 0)
                        .map(|dt| dt.naive_utc())
                        .unwrap_or(bar.timestamp);
                    out.push(Bar {
                        timestamp: stamp,
                        ..bar.clone()
                    });
                    current_key = Some(key);
                }
            }
        }
        out
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new(&SimConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Platform surface
// ---------------------------------------------------------------------------

#[async_trait]
impl TradingPlatform for SimulatedPlatform {
    type Account = AccountRef;
    type Instrument = InstrumentRef;
    type Order = OrderRef;

    async fn find_account(&self, name: &str) -> Option<AccountRef> {
        self.touch();
        self.find_account_handle(name)
    }

    async fn account_value(
        &self,
        account: &AccountRef,
        item: AccountItem,
    ) -> Result<Decimal, PlatformError> {
        self.touch();
        let state = self.state.lock();
        let acct = state
            .accounts
            .get(account.name())
            .ok_or_else(|| PlatformError::UnknownAccount(account.name().to_string()))?;
        Ok(match item {
            AccountItem::CashValue => acct.cash,
            AccountItem::BuyingPower => acct.buying_power.unwrap_or(acct.cash),
            AccountItem::RealizedProfitLoss => acct.realized_pnl,
        })
    }

    async fn account_positions(
        &self,
        account: &AccountRef,
    ) -> Result<Vec<PlatformPosition<InstrumentRef>>, PlatformError> {
        self.touch();
        let state = self.state.lock();
        let acct = state
            .accounts
            .get(account.name())
            .ok_or_else(|| PlatformError::UnknownAccount(account.name().to_string()))?;
        let mut positions: Vec<_> = acct
            .positions
            .iter()
            .map(|(symbol, pos)| PlatformPosition {
                instrument: InstrumentRef(Arc::from(symbol.as_str())),
                market_position: pos.market_position,
                quantity: pos.quantity,
                average_price: pos.average_price,
            })
            .collect();
        positions.sort_by(|a, b| a.instrument.symbol().cmp(b.instrument.symbol()));
        Ok(positions)
    }

    async fn resolve_instrument(&self, symbol: &str) -> Option<InstrumentRef> {
        self.touch();
        self.instrument_handle(symbol)
    }

    async fn quote(&self, instrument: &InstrumentRef) -> Result<Quote, PlatformError> {
        self.touch();
        let state = self.state.lock();
        state
            .instruments
            .get(instrument.symbol())
            .map(|i| i.quote.clone())
            .ok_or_else(|| PlatformError::NoMarketData(instrument.symbol().to_string()))
    }

    async fn contract_spec(&self, instrument: &InstrumentRef) -> Result<ContractSpec, PlatformError> {
        self.touch();
        let state = self.state.lock();
        state
            .instruments
            .get(instrument.symbol())
            .map(|i| i.spec.clone())
            .ok_or_else(|| PlatformError::Other(format!("Unknown instrument {}", instrument.symbol())))
    }

    async fn submit_order(
        &self,
        account: &AccountRef,
        instrument: &InstrumentRef,
        request: &OrderRequest,
    ) -> Result<OrderRef, PlatformError> {
        self.touch();
        Self::validate(request)?;

        let mut state = self.state.lock();
        if !state.accounts.contains_key(account.name()) {
            return Err(PlatformError::UnknownAccount(account.name().to_string()));
        }
        let last = state
            .instruments
            .get(instrument.symbol())
            .and_then(|i| i.quote.last);
        if request.order_type == OrderType::Market && last.is_none() {
            return Err(PlatformError::NoMarketData(instrument.symbol().to_string()));
        }

        let id = Uuid::new_v4().simple().to_string();
        let mut order = SimOrder {
            account: account.name().to_string(),
            symbol: instrument.symbol().to_string(),
            request: request.clone(),
            stop_triggered: false,
            state: OrderState::Working,
            filled: 0,
            average_fill_price: Decimal::ZERO,
        };
        let fill_price = last.and_then(|last| Self::trigger_price(&mut order, last));
        state.orders.insert(id.clone(), order);
        if let Some(price) = fill_price {
            if let Err(e) = Self::fill_order(&mut state, &id, price) {
                state.orders.remove(&id);
                return Err(e);
            }
        }

        Ok(OrderRef(Arc::from(id.as_str())))
    }

    fn order_id(&self, order: &OrderRef) -> String {
        order.id().to_string()
    }

    async fn cancel_order(&self, account: &AccountRef, order: &OrderRef) -> Result<(), PlatformError> {
        self.touch();
        let mut state = self.state.lock();
        let sim_order = state
            .orders
            .get_mut(order.id())
            .filter(|o| o.account == account.name())
            .ok_or_else(|| PlatformError::UnknownOrder(order.id().to_string()))?;
        // Cancelling a finished order is a no-op, as on the real platform.
        if !sim_order.state.is_terminal() {
            sim_order.state = OrderState::Cancelled;
        }
        Ok(())
    }

    async fn order_status(&self, order: &OrderRef) -> Result<OrderSnapshot, PlatformError> {
        self.touch();
        let state = self.state.lock();
        state
            .orders
            .get(order.id())
            .map(|o| OrderSnapshot {
                state: o.state,
                filled: o.filled,
                average_fill_price: o.average_fill_price,
            })
            .ok_or_else(|| PlatformError::UnknownOrder(order.id().to_string()))
    }

    async fn request_historical_bars(
        &self,
        instrument: &InstrumentRef,
        request: HistoryRequest,
        on_complete: HistoryCallback,
    ) -> Result<(), PlatformError> {
        self.touch();
        let mode = self.history_mode.lock().clone();
        let outcome = match mode {
            HistoryMode::Silent => {
                self.unanswered.lock().push(on_complete);
                return Ok(());
            }
            HistoryMode::Fail { code, message } => {
                Err(PlatformError::HistoryFailed { code, message })
            }
            HistoryMode::Normal => {
                let state = self.state.lock();
                let stored = state
                    .bars
                    .get(instrument.symbol())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                Ok(Self::aggregate(stored, &request))
            }
        };
        tokio::spawn(async move { on_complete(outcome) });
        Ok(())
    }

    async fn instruments_with_quotes(&self) -> Result<Vec<InstrumentRef>, PlatformError> {
        self.touch();
        let state = self.state.lock();
        let mut symbols: Vec<&String> = state
            .instruments
            .iter()
            .filter(|(_, i)| !i.quote.is_empty())
            .map(|(symbol, _)| symbol)
            .collect();
        symbols.sort();
        Ok(symbols
            .into_iter()
            .map(|s| InstrumentRef(Arc::from(s.as_str())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;
    use tokio::sync::oneshot;

    fn naive(ts: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").ok()
    }

    fn market(side: Side, quantity: u32) -> OrderRequest {
        OrderRequest {
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
        }
    }

    fn bar(ts: &str, close: Decimal, volume: u64) -> Bar {
        Bar {
            timestamp: naive(ts).unwrap(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume,
        }
    }

    #[tokio::test]
    async fn test_alias_resolves_to_canonical() {
        let sim = SimulatedPlatform::default();
        let es = sim.resolve_instrument("ESZ25").await.unwrap();
        assert_eq!(es.symbol(), "ES 12-25");
        assert_eq!(sim.resolve_instrument("ES 12-25").await, Some(es));
        assert!(sim.resolve_instrument("ZZZ").await.is_none());
        assert_eq!(sim.call_count(), 3);
    }

    #[tokio::test]
    async fn test_market_round_trip_realizes_pnl() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();

        let buy = sim.submit_order(&acct, &es, &market(Side::Buy, 2)).await.unwrap();
        let status = sim.order_status(&buy).await.unwrap();
        assert_eq!(status.state, OrderState::Filled);
        assert_eq!(status.filled, 2);
        assert_eq!(status.average_fill_price, dec!(5000.25));

        sim.update_last("ES 12-25", dec!(5010.25));
        sim.submit_order(&acct, &es, &market(Side::Sell, 2)).await.unwrap();

        // 10 points * 2 contracts * $50
        let realized = sim
            .account_value(&acct, AccountItem::RealizedProfitLoss)
            .await
            .unwrap();
        assert_eq!(realized, dec!(1000));
        assert_eq!(
            sim.account_value(&acct, AccountItem::CashValue).await.unwrap(),
            dec!(101000)
        );
        assert!(sim.account_positions(&acct).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sell_through_long_reverses_to_short() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();

        sim.submit_order(&acct, &es, &market(Side::Buy, 1)).await.unwrap();
        sim.submit_order(&acct, &es, &market(Side::Sell, 3)).await.unwrap();

        let positions = sim.account_positions(&acct).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].market_position, MarketPosition::Short);
        assert_eq!(positions[0].quantity, 2);
        assert_eq!(positions[0].signed_quantity(), -2);
    }

    #[tokio::test]
    async fn test_limit_order_rests_until_crossed() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();
        let request = OrderRequest {
            order_type: OrderType::Limit,
            limit_price: dec!(4990),
            ..market(Side::Buy, 1)
        };

        let order = sim.submit_order(&acct, &es, &request).await.unwrap();
        assert_eq!(sim.order_status(&order).await.unwrap().state, OrderState::Working);

        sim.update_last("ES 12-25", dec!(4989.75));
        let status = sim.order_status(&order).await.unwrap();
        assert_eq!(status.state, OrderState::Filled);
        assert_eq!(status.average_fill_price, dec!(4990));
    }

    #[tokio::test]
    async fn test_cancel_working_order() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();
        let request = OrderRequest {
            order_type: OrderType::StopMarket,
            stop_price: dec!(5100),
            ..market(Side::Buy, 1)
        };

        let order = sim.submit_order(&acct, &es, &request).await.unwrap();
        sim.cancel_order(&acct, &order).await.unwrap();
        assert_eq!(
            sim.order_status(&order).await.unwrap().state,
            OrderState::Cancelled
        );

        // A cancelled stop no longer triggers
        sim.update_last("ES 12-25", dec!(5105));
        assert_eq!(
            sim.order_status(&order).await.unwrap().state,
            OrderState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_rejections() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();

        let err = sim.submit_order(&acct, &es, &market(Side::Buy, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Order rejected: quantity must be positive");

        let limit_without_price = OrderRequest {
            order_type: OrderType::Limit,
            ..market(Side::Buy, 1)
        };
        assert!(matches!(
            sim.submit_order(&acct, &es, &limit_without_price).await,
            Err(PlatformError::OrderRejected(_))
        ));

        sim.set_quote("ES 12-25", Quote::default());
        assert!(matches!(
            sim.submit_order(&acct, &es, &market(Side::Buy, 1)).await,
            Err(PlatformError::NoMarketData(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_add_is_rejected_without_touching_position() {
        let sim = SimulatedPlatform::default();
        let acct = sim.find_account_handle("Sim101").unwrap();
        let es = sim.instrument_handle("ES 12-25").unwrap();

        sim.submit_order(&acct, &es, &market(Side::Buy, u32::MAX)).await.unwrap();
        let err = sim
            .submit_order(&acct, &es, &market(Side::Buy, u32::MAX))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Order rejected: position size limit exceeded");

        let positions = sim.account_positions(&acct).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, u32::MAX);

        // A resting order that cannot be absorbed is rejected when crossed
        let resting = OrderRequest {
            order_type: OrderType::Limit,
            limit_price: dec!(4990),
            ..market(Side::Buy, 1)
        };
        let order = sim.submit_order(&acct, &es, &resting).await.unwrap();
        sim.update_last("ES 12-25", dec!(4989.75));
        let status = sim.order_status(&order).await.unwrap();
        assert_eq!(status.state, OrderState::Rejected);
        assert_eq!(status.filled, 0);
        assert_eq!(sim.account_positions(&acct).await.unwrap()[0].quantity, u32::MAX);
    }

    #[tokio::test]
    async fn test_history_aggregates_into_buckets() {
        let sim = SimulatedPlatform::default();
        let es = sim.instrument_handle("ES 12-25").unwrap();
        sim.add_bars(
            "ES 12-25",
            vec![
                bar("2025-11-14 09:31:00", dec!(5000), 10),
                bar("2025-11-14 09:32:00", dec!(5002), 20),
                bar("2025-11-14 09:36:00", dec!(5001), 30),
                bar("2025-11-14 10:30:00", dec!(4990), 40),
            ],
        );

        let (tx, rx) = oneshot::channel();
        let request = HistoryRequest {
            start: naive("2025-11-14 09:30:00").unwrap(),
            end: naive("2025-11-14 10:00:00").unwrap(),
            bar_minutes: 5,
        };
        sim.request_historical_bars(
            &es,
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        )
        .await
        .unwrap();

        let bars = rx.await.unwrap().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, naive("2025-11-14 09:35:00").unwrap());
        assert_eq!(bars[0].open, dec!(5000));
        assert_eq!(bars[0].high, dec!(5003));
        assert_eq!(bars[0].close, dec!(5002));
        assert_eq!(bars[0].volume, 30);
        assert_eq!(bars[1].timestamp, naive("2025-11-14 09:40:00").unwrap());
    }

    #[tokio::test]
    async fn test_history_failure_mode() {
        let sim = SimulatedPlatform::default();
        let es = sim.instrument_handle("ES 12-25").unwrap();
        sim.set_history_mode(HistoryMode::Fail {
            code: "DataNotAvailable".into(),
            message: "no data".into(),
        });

        let (tx, rx) = oneshot::channel();
        let request = HistoryRequest {
            start: naive("2025-11-14 09:30:00").unwrap(),
            end: naive("2025-11-14 10:00:00").unwrap(),
            bar_minutes: 1,
        };
        sim.request_historical_bars(&es, request, Box::new(move |r| {
            let _ = tx.send(r);
        }))
        .await
        .unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bars request failed: DataNotAvailable - no data"
        );
    }

    #[tokio::test]
    async fn test_silent_history_keeps_request_pending() {
        let sim = SimulatedPlatform::default();
        let es = sim.instrument_handle("ES 12-25").unwrap();
        sim.set_history_mode(HistoryMode::Silent);

        let (tx, mut rx) = oneshot::channel();
        let request = HistoryRequest {
            start: naive("2025-11-14 09:30:00").unwrap(),
            end: naive("2025-11-14 10:00:00").unwrap(),
            bar_minutes: 1,
        };
        sim.request_historical_bars(&es, request, Box::new(move |r| {
            let _ = tx.send(r);
        }))
        .await
        .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(sim.unanswered_history_requests(), 1);
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_instruments_with_quotes_skips_empty_quotes() {
        let sim = SimulatedPlatform::default();
        sim.set_quote("NQ 12-25", Quote::default());
        let symbols: Vec<String> = sim
            .instruments_with_quotes()
            .await
            .unwrap()
            .iter()
            .map(|i| i.symbol().to_string())
            .collect();
        assert_eq!(symbols, vec!["ES 12-25", "MES 03-26"]);
    }
}
