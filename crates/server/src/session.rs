//! Process-wide session state shared by every client connection.

use crate::log::{BridgeLog, Heartbeat, LogLevel};
use dashmap::DashMap;
use ntbridge_core::TradingPlatform;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

/// The account a client logged in to.
#[derive(Debug, Clone)]
pub struct ActiveAccount<A> {
    pub name: String,
    pub handle: A,
}

/// The single logical client context of a running bridge.
///
/// Registries are internally synchronized so connection tasks read and
/// mutate them without outside locking. The account slot and the log
/// threshold are last-writer-wins.
pub struct Session<P: TradingPlatform> {
    account: RwLock<Option<ActiveAccount<P::Account>>>,
    /// Client symbol (as sent) to resolved instrument.
    subscriptions: DashMap<String, P::Instrument>,
    /// Platform order id to order handle.
    orders: DashMap<String, P::Order>,
    log: BridgeLog,
    heartbeat: Heartbeat,
}

impl<P: TradingPlatform> Session<P> {
    pub fn new(log_level: LogLevel, heartbeat_interval: Duration) -> Self {
        Self {
            account: RwLock::new(None),
            subscriptions: DashMap::new(),
            orders: DashMap::new(),
            log: BridgeLog::new(log_level),
            heartbeat: Heartbeat::new(heartbeat_interval),
        }
    }

    pub fn log(&self) -> &BridgeLog {
        &self.log
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    // -- account ----------------------------------------------------------

    /// Replace the active account. Subscriptions and orders carry over.
    pub fn login(&self, name: &str, handle: P::Account) {
        *self.account.write() = Some(ActiveAccount {
            name: name.to_string(),
            handle,
        });
    }

    /// Drop the account and every subscription; tracked orders stay.
    pub fn logout(&self) -> Option<ActiveAccount<P::Account>> {
        let previous = self.account.write().take();
        self.subscriptions.clear();
        previous
    }

    pub fn account(&self) -> Option<ActiveAccount<P::Account>> {
        self.account.read().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.account.read().is_some()
    }

    // -- subscriptions ----------------------------------------------------

    pub fn subscribe(&self, symbol: &str, instrument: P::Instrument) {
        self.subscriptions.insert(symbol.to_string(), instrument);
    }

    /// Returns whether the symbol was subscribed.
    pub fn unsubscribe(&self, symbol: &str) -> bool {
        self.subscriptions.remove(symbol).is_some()
    }

    pub fn subscription(&self, symbol: &str) -> Option<P::Instrument> {
        self.subscriptions.get(symbol).map(|entry| entry.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // -- orders -----------------------------------------------------------

    pub fn track_order(&self, order_id: &str, order: P::Order) {
        self.orders.insert(order_id.to_string(), order);
    }

    pub fn order(&self, order_id: &str) -> Option<P::Order> {
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    pub fn tracked_order_count(&self) -> usize {
        self.orders.len()
    }

    /// Tear everything down, as at process shutdown.
    pub fn reset(&self) {
        *self.account.write() = None;
        self.subscriptions.clear();
        self.orders.clear();
        self.heartbeat.reset(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntbridge_sim::SimulatedPlatform;

    fn session() -> Session<SimulatedPlatform> {
        Session::new(LogLevel::Info, Duration::from_secs(10))
    }

    #[test]
    fn test_logout_clears_account_and_subscriptions_only() {
        let sim = SimulatedPlatform::default();
        let session = session();
        let account = sim.find_account_handle("Sim101").unwrap();
        let instrument = sim.instrument_handle("ES 12-25").unwrap();

        session.login("Sim101", account);
        session.subscribe("ESZ25", instrument);
        session.track_order("abc", "abc".into());
        assert!(session.is_logged_in());

        let previous = session.logout().unwrap();
        assert_eq!(previous.name, "Sim101");
        assert!(!session.is_logged_in());
        assert_eq!(session.subscription_count(), 0);
        assert_eq!(session.tracked_order_count(), 1);
    }

    #[test]
    fn test_second_login_carries_state_over() {
        let sim = SimulatedPlatform::default();
        let session = session();
        session.login("Sim101", sim.find_account_handle("Sim101").unwrap());
        session.subscribe("ESZ25", sim.instrument_handle("ES 12-25").unwrap());

        session.login("Sim102", sim.find_account_handle("Sim102").unwrap());
        assert_eq!(session.account().unwrap().name, "Sim102");
        assert!(session.subscription("ESZ25").is_some());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let session = session();
        assert!(!session.unsubscribe("ESZ25"));
        assert!(!session.unsubscribe("ESZ25"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let session = session();
        session.track_order("abc", "abc".into());
        session.heartbeat().record_order();
        session.reset();
        assert_eq!(session.tracked_order_count(), 0);
        assert_eq!(session.heartbeat().orders_placed(), 0);
    }
}
