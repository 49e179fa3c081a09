//! Simulated trading platform.
//!
//! Stands in for the host platform: accounts, instruments with quotes,
//! order fills, positions and an asynchronous historical-bars service, all
//! held in memory.

pub mod config;
pub mod simulated;

pub use config::{SimAccountConfig, SimConfig, SimInstrumentConfig};
pub use simulated::{AccountRef, HistoryMode, InstrumentRef, OrderRef, SimulatedPlatform};
