//! Command dispatch: one request line in, one response line out.

use crate::config::BridgeConfig;
use crate::error::CommandError;
use crate::log::bridge_log;
use crate::session::Session;
use futures_util::FutureExt;
use ntbridge_core::*;
use ntbridge_protocol::{ole, translate_symbol, BarRow, CommandName, InstrumentRow, Request, Response};
use rust_decimal::Decimal;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

type CommandResult = Result<Response, CommandError>;

/// Routes decoded requests to their handlers against one shared session.
pub struct Dispatcher<P: TradingPlatform> {
    platform: Arc<P>,
    session: Arc<Session<P>>,
    history_timeout: Duration,
    history_poll: Duration,
}

impl<P: TradingPlatform> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            session: Arc::clone(&self.session),
            history_timeout: self.history_timeout,
            history_poll: self.history_poll,
        }
    }
}

impl<P: TradingPlatform> Dispatcher<P> {
    pub fn new(platform: Arc<P>, session: Arc<Session<P>>, config: &BridgeConfig) -> Self {
        Self {
            platform,
            session,
            history_timeout: config.history_timeout(),
            history_poll: config.history_poll(),
        }
    }

    pub fn session(&self) -> &Arc<Session<P>> {
        &self.session
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Execute one trimmed request line and render the response, without
    /// the trailing newline. Never fails: every error, including a panic
    /// inside the platform binding, becomes an `ERROR:` line.
    pub async fn dispatch(&self, line: &str) -> String {
        let outcome = AssertUnwindSafe(self.execute(line)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => Response::Error(err.to_string()),
            Err(payload) => {
                let err = CommandError::Panicked(panic_message(payload.as_ref()));
                bridge_log!(self.session.log(), Error, "Command '{}' panicked: {}", line, err);
                Response::Error(err.to_string())
            }
        };
        response.to_string()
    }

    async fn execute(&self, line: &str) -> CommandResult {
        let request = Request::parse(line);
        match request.name()? {
            CommandName::Ping => Ok(Response::Pong),
            CommandName::Version => Ok(Response::Version),
            CommandName::Login => self.login(&request).await,
            CommandName::Logout => Ok(self.logout()),
            CommandName::Connected => Ok(Response::Connected(self.session.is_logged_in())),
            CommandName::Subscribe => self.subscribe(&request).await,
            CommandName::Unsubscribe => self.unsubscribe(&request),
            CommandName::GetPrice => self.get_price(&request).await,
            CommandName::GetAccount => self.get_account().await,
            CommandName::GetPosition => self.get_position(&request).await,
            CommandName::PlaceOrder => self.place_order(&request).await,
            CommandName::CancelOrder => self.cancel_order(&request).await,
            CommandName::GetOrderStatus => self.get_order_status(&request).await,
            CommandName::SetLogLevel => self.set_log_level(&request),
            CommandName::GetHistory => self.get_history(&request).await,
            CommandName::GetInstruments => self.get_instruments().await,
        }
    }

    fn logged_in_account(&self) -> Result<P::Account, CommandError> {
        match self.session.account() {
            Some(active) => Ok(active.handle),
            None => {
                bridge_log!(self.session.log(), Error, "Not logged in");
                Err(CommandError::NotLoggedIn)
            }
        }
    }

    /// Translate a client symbol and resolve it on the platform.
    async fn resolve(&self, symbol: &str) -> Option<(String, P::Instrument)> {
        let canonical = translate_symbol(symbol);
        if canonical != symbol {
            bridge_log!(self.session.log(), Debug, "Translated {} -> {}", symbol, canonical);
        }
        let instrument = self.platform.resolve_instrument(&canonical).await?;
        Some((canonical, instrument))
    }

    // -----------------------------------------------------------------------
    // Session commands
    // -----------------------------------------------------------------------

    async fn login(&self, request: &Request<'_>) -> CommandResult {
        let log = self.session.log();
        let name = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Account name required"))?;

        let Some(handle) = self.platform.find_account(name).await else {
            bridge_log!(log, Error, "Account '{}' not found", name);
            return Err(CommandError::AccountNotFound(name.to_string()));
        };

        self.session.login(name, handle);
        bridge_log!(log, Info, "Logged in to account: {}", name);
        Ok(Response::LoggedIn(name.to_string()))
    }

    fn logout(&self) -> Response {
        if let Some(previous) = self.session.logout() {
            bridge_log!(self.session.log(), Info, "Logged out from: {}", previous.name);
        }
        Response::LoggedOut
    }

    fn set_log_level(&self, request: &Request<'_>) -> CommandResult {
        let text = request.arg(0).ok_or(CommandError::MissingArgument(
            "Log level required (TRACE/DEBUG/INFO/WARN/ERROR)",
        ))?;
        let level = text
            .parse()
            .map_err(|e: crate::log::ParseLogLevelError| CommandError::InvalidLogLevel(e.0))?;

        let log = self.session.log();
        let old = log.set_level(level);
        bridge_log!(log, Info, "Log level changed: {} -> {}", old, level);
        Ok(Response::LogLevelSet(level.to_string()))
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    async fn subscribe(&self, request: &Request<'_>) -> CommandResult {
        let log = self.session.log();
        let symbol = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Instrument name required"))?;
        bridge_log!(log, Debug, "Subscribe request: {}", symbol);

        let Some((canonical, instrument)) = self.resolve(symbol).await else {
            let canonical = translate_symbol(symbol);
            bridge_log!(log, Error, "Instrument '{}' not found", canonical);
            return Err(CommandError::UnknownInstrument(canonical));
        };

        match self.platform.quote(&instrument).await {
            Ok(quote) if !quote.is_empty() => {}
            _ => bridge_log!(
                log,
                Warn,
                "No market data for {} - connect to data feed",
                canonical
            ),
        }

        let spec = self.platform.contract_spec(&instrument).await?;
        bridge_log!(log, Trace, "Found: {}", spec.full_name);
        self.session.subscribe(symbol, instrument);

        bridge_log!(log, Info, "Subscribed to {}", symbol);
        bridge_log!(
            log,
            Debug,
            "Contract specs: TickSize={} PointValue={}",
            spec.tick_size,
            spec.point_value
        );
        Ok(Response::Subscribed {
            symbol: symbol.to_string(),
            tick_size: spec.tick_size,
            point_value: spec.point_value,
        })
    }

    fn unsubscribe(&self, request: &Request<'_>) -> CommandResult {
        let symbol = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Instrument name required"))?;
        if self.session.unsubscribe(symbol) {
            bridge_log!(self.session.log(), Debug, "Unsubscribed from {}", symbol);
        }
        Ok(Response::Unsubscribed(symbol.to_string()))
    }

    async fn get_price(&self, request: &Request<'_>) -> CommandResult {
        let log = self.session.log();
        let symbol = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Instrument name required"))?;
        bridge_log!(log, Trace, "GetPrice: {}", symbol);

        let Some(instrument) = self.session.subscription(symbol) else {
            bridge_log!(log, Error, "Not subscribed to {}", symbol);
            return Err(CommandError::NotSubscribed);
        };

        let quote = self.platform.quote(&instrument).await.map_err(|e| {
            bridge_log!(log, Error, "Error getting price: {}", e);
            CommandError::from(e)
        })?;

        let heartbeat = self.session.heartbeat();
        heartbeat.record_price_request();
        if let Some(summary) = heartbeat.check(Instant::now(), self.session.subscription_count()) {
            bridge_log!(log, Info, "{}", summary);
        }

        let response = Response::Price {
            last: quote.last.unwrap_or_default(),
            bid: quote.bid.unwrap_or_default(),
            ask: quote.ask.unwrap_or_default(),
            volume: quote.volume.unwrap_or_default(),
        };
        bridge_log!(log, Debug, "Price {}: {}", symbol, response);
        Ok(response)
    }

    async fn get_instruments(&self) -> CommandResult {
        let log = self.session.log();
        let mut rows = Vec::new();

        for instrument in self.platform.instruments_with_quotes().await? {
            let last = match self.platform.quote(&instrument).await {
                Ok(quote) => quote.last.unwrap_or_default(),
                Err(e) => {
                    bridge_log!(log, Trace, "Skipping instrument: {}", e);
                    continue;
                }
            };
            if last <= Decimal::ZERO {
                continue;
            }
            let spec = match self.platform.contract_spec(&instrument).await {
                Ok(spec) => spec,
                Err(e) => {
                    bridge_log!(log, Trace, "Skipping instrument: {}", e);
                    continue;
                }
            };
            bridge_log!(
                log,
                Trace,
                "Instrument: {} Price:{} Tick:{} Value:{} Type:{}",
                spec.full_name,
                last,
                spec.tick_size,
                spec.point_value,
                spec.instrument_type
            );
            rows.push(InstrumentRow {
                symbol: spec.full_name,
                tick_size: spec.tick_size,
                point_value: spec.point_value,
                last,
                instrument_type: spec.instrument_type,
            });
        }

        bridge_log!(log, Info, "Returning {} instruments with market data", rows.len());
        Ok(Response::Instruments(rows))
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    async fn get_account(&self) -> CommandResult {
        let account = self
            .session
            .account()
            .ok_or(CommandError::NotLoggedIn)?
            .handle;
        let log = self.session.log();

        let cash_value = self
            .platform
            .account_value(&account, AccountItem::CashValue)
            .await?;
        let buying_power = self
            .platform
            .account_value(&account, AccountItem::BuyingPower)
            .await?;
        let realized_pnl = self
            .platform
            .account_value(&account, AccountItem::RealizedProfitLoss)
            .await?;

        let mut unrealized_pnl = Decimal::ZERO;
        for position in self.platform.account_positions(&account).await? {
            if position.market_position == MarketPosition::Flat {
                continue;
            }
            match self.unrealized_contribution(&position).await {
                Ok(Some(pnl)) => unrealized_pnl += pnl,
                Ok(None) => {}
                Err(e) => bridge_log!(log, Warn, "Error calculating unrealized P&L: {}", e),
            }
        }

        bridge_log!(
            log,
            Debug,
            "Account: Cash={} BuyPwr={} RealPnL={} UnrealPnL={}",
            cash_value,
            buying_power,
            realized_pnl,
            unrealized_pnl
        );
        Ok(Response::Account {
            cash_value,
            buying_power,
            realized_pnl,
            unrealized_pnl,
        })
    }

    /// `None` when the instrument has no usable last price.
    async fn unrealized_contribution(
        &self,
        position: &PlatformPosition<P::Instrument>,
    ) -> Result<Option<Decimal>, PlatformError> {
        let quote = self.platform.quote(&position.instrument).await?;
        let Some(last) = quote.last.filter(|l| *l > Decimal::ZERO) else {
            return Ok(None);
        };
        let spec = self.platform.contract_spec(&position.instrument).await?;
        let pnl = position.unrealized_pnl(last, spec.point_value);
        bridge_log!(
            self.session.log(),
            Trace,
            "UnrealizedPnL: {} {} Entry:{} Current:{} Qty:{} PV:{} Contribution:{}",
            spec.full_name,
            position.market_position,
            position.average_price,
            last,
            position.quantity,
            spec.point_value,
            pnl
        );
        Ok(Some(pnl))
    }

    async fn get_position(&self, request: &Request<'_>) -> CommandResult {
        let account = self.logged_in_account()?;
        let log = self.session.log();
        let symbol = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Instrument name required"))?;

        let Some((canonical, instrument)) = self.resolve(symbol).await else {
            bridge_log!(log, Error, "Instrument '{}' not found", symbol);
            return Err(CommandError::InstrumentNotFound);
        };

        let positions = self.platform.account_positions(&account).await?;
        bridge_log!(log, Trace, "Searching {} positions for {}", positions.len(), canonical);

        let (quantity, average_price) = positions
            .iter()
            .find(|p| p.instrument == instrument)
            .map(|p| (p.signed_quantity(), p.average_price))
            .filter(|(quantity, _)| *quantity != 0)
            .unwrap_or((0, Decimal::ZERO));

        bridge_log!(
            log,
            Info,
            "POSITION QUERY: {} = {} contracts @ {}",
            symbol,
            quantity,
            average_price
        );
        Ok(Response::Position {
            quantity,
            average_price,
        })
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// `PLACEORDER:side:symbol:qty:type[:limit[:stop]]`
    async fn place_order(&self, request: &Request<'_>) -> CommandResult {
        let account = self.logged_in_account()?;
        let log = self.session.log();
        if request.args.len() < 4 {
            bridge_log!(
                log,
                Error,
                "Invalid order format (expected >=5 fields, got {})",
                request.args.len() + 1
            );
            return Err(CommandError::InvalidOrderFormat);
        }

        let side = Side::from_token(request.args[0]);
        let symbol = request.args[1];
        let quantity: u32 = parse_field(request.args[2], "quantity")?;
        let order_type = OrderType::from_token(request.args[3]);
        let limit_price = match request.arg(4) {
            Some(text) => parse_field(text, "limit price")?,
            None => Decimal::ZERO,
        };
        let stop_price = match request.arg(5) {
            Some(text) => parse_field(text, "stop price")?,
            None => Decimal::ZERO,
        };
        bridge_log!(log, Debug, "Order: {} {} {} @ {}", side, quantity, symbol, order_type);

        let Some((_, instrument)) = self.resolve(symbol).await else {
            bridge_log!(log, Error, "Instrument '{}' not found", symbol);
            return Err(CommandError::InstrumentNotFound);
        };

        let order_request = OrderRequest {
            side,
            order_type,
            quantity,
            limit_price,
            stop_price,
        };
        let order = self
            .platform
            .submit_order(&account, &instrument, &order_request)
            .await
            .map_err(|e| {
                bridge_log!(log, Error, "PlaceOrder failed: {}", e);
                CommandError::from(e)
            })?;

        let order_id = self.platform.order_id(&order);
        self.session.track_order(&order_id, order);
        self.session.heartbeat().record_order();
        bridge_log!(
            log,
            Info,
            "ORDER PLACED: {} {} {} @ {} (ID:{})",
            side,
            quantity,
            symbol,
            order_type,
            order_id
        );
        Ok(Response::OrderPlaced(order_id))
    }

    async fn cancel_order(&self, request: &Request<'_>) -> CommandResult {
        let account = self.logged_in_account()?;
        let order_id = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Order ID required"))?;
        let order = self
            .session
            .order(order_id)
            .ok_or(CommandError::OrderNotFound)?;

        self.platform.cancel_order(&account, &order).await?;
        bridge_log!(self.session.log(), Info, "ORDER CANCELLED: {}", order_id);
        Ok(Response::OrderCancelled(order_id.to_string()))
    }

    async fn get_order_status(&self, request: &Request<'_>) -> CommandResult {
        let order_id = request
            .arg(0)
            .ok_or(CommandError::MissingArgument("Order ID required"))?;
        let order = self
            .session
            .order(order_id)
            .ok_or(CommandError::OrderNotFound)?;

        let snapshot = self.platform.order_status(&order).await?;
        bridge_log!(
            self.session.log(),
            Trace,
            "Order {}: State={} Filled={} AvgPrice={}",
            order_id,
            snapshot.state,
            snapshot.filled,
            snapshot.average_fill_price
        );
        Ok(Response::OrderStatus {
            order_id: order_id.to_string(),
            state: snapshot.state,
            filled: snapshot.filled,
            average_fill_price: snapshot.average_fill_price,
        })
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// `GETHISTORY:symbol:startOle:endOle:barMinutes:maxBars`
    async fn get_history(&self, request: &Request<'_>) -> CommandResult {
        self.logged_in_account()?;
        let log = self.session.log();
        if request.args.len() < 5 {
            bridge_log!(
                log,
                Error,
                "Invalid format (expected 6 fields, got {})",
                request.args.len() + 1
            );
            return Err(CommandError::InvalidHistoryFormat);
        }

        let symbol = request.args[0];
        let start: f64 = parse_field(request.args[1], "start date")?;
        let end: f64 = parse_field(request.args[2], "end date")?;
        let bar_minutes: u32 = parse_field(request.args[3], "bar minutes")?;
        if bar_minutes == 0 {
            return Err(CommandError::InvalidNumber {
                field: "bar minutes",
                value: request.args[3].to_string(),
            });
        }
        // Every bar the platform returns is sent; the client chunks.
        let max_bars: i64 = parse_field(request.args[4], "max bars")?;
        bridge_log!(
            log,
            Debug,
            "History request: {} {}min bars, max {}",
            symbol,
            bar_minutes,
            max_bars
        );

        let history = HistoryRequest {
            start: ole::from_oa_date(start)?,
            end: ole::from_oa_date(end)?,
            bar_minutes,
        };
        bridge_log!(log, Debug, "Date range: {} to {}", history.start, history.end);

        let Some((_, instrument)) = self.resolve(symbol).await else {
            bridge_log!(log, Error, "Instrument '{}' not found", symbol);
            return Err(CommandError::InstrumentNotFound);
        };

        let (tx, rx) = oneshot::channel();
        self.platform
            .request_historical_bars(
                &instrument,
                history,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .await?;

        let bars = self.await_history(rx).await.map_err(|e| {
            bridge_log!(log, Error, "{}", e);
            e
        })?;

        if bars.is_empty() {
            bridge_log!(log, Warn, "No bars available for requested period");
        } else {
            bridge_log!(log, Info, "Returning {} bars for {}", bars.len(), symbol);
        }
        let rows = bars
            .into_iter()
            .map(|bar| BarRow {
                time: ole::to_oa_date(bar.timestamp),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .collect();
        Ok(Response::History(rows))
    }

    /// Poll for the history callback until it fires or the timeout elapses.
    /// A callback dropped without being invoked counts as a timeout.
    async fn await_history(
        &self,
        mut rx: oneshot::Receiver<Result<Vec<Bar>, PlatformError>>,
    ) -> Result<Vec<Bar>, CommandError> {
        let started = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(result) => return Ok(result?),
                Err(oneshot::error::TryRecvError::Empty)
                    if started.elapsed() < self.history_timeout =>
                {
                    tokio::time::sleep(self.history_poll).await;
                }
                Err(_) => return Err(CommandError::HistoryTimeout),
            }
        }
    }
}

fn parse_field<T: FromStr>(text: &str, field: &'static str) -> Result<T, CommandError> {
    text.trim().parse().map_err(|_| CommandError::InvalidNumber {
        field,
        value: text.to_string(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Command panicked".to_string()
    }
}
