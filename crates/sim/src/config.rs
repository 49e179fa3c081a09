use ntbridge_core::InstrumentType;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Seed data of the simulated platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub accounts: Vec<SimAccountConfig>,
    pub instruments: Vec<SimInstrumentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimAccountConfig {
    pub name: String,
    /// Starting cash value.
    pub cash: Decimal,
    /// Defaults to the cash value.
    #[serde(default)]
    pub buying_power: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimInstrumentConfig {
    /// Canonical platform name, e.g. `ES 12-25`.
    pub symbol: String,
    /// Other names that resolve to this instrument, e.g. `ESZ25`.
    #[serde(default)]
    pub aliases: Vec<String>,
    pub tick_size: Decimal,
    pub point_value: Decimal,
    #[serde(default = "default_instrument_type")]
    pub instrument_type: InstrumentType,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<u64>,
    /// CSV file with historical bars for this instrument.
    #[serde(default)]
    pub bars_csv: Option<PathBuf>,
}

fn default_instrument_type() -> InstrumentType {
    InstrumentType::Future
}

impl SimInstrumentConfig {
    fn future(symbol: &str, alias: &str, tick_size: Decimal, point_value: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            aliases: vec![alias.to_string()],
            tick_size,
            point_value,
            instrument_type: InstrumentType::Future,
            last: None,
            bid: None,
            ask: None,
            volume: None,
            bars_csv: None,
        }
    }

    fn quoted(mut self, bid: Decimal, ask: Decimal, last: Decimal, volume: u64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self.last = Some(last);
        self.volume = Some(volume);
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            accounts: vec![
                SimAccountConfig {
                    name: "Sim101".to_string(),
                    cash: dec!(100000),
                    buying_power: None,
                },
                SimAccountConfig {
                    name: "Sim102".to_string(),
                    cash: dec!(50000),
                    buying_power: None,
                },
            ],
            instruments: vec![
                SimInstrumentConfig::future("ES 12-25", "ESZ25", dec!(0.25), dec!(50))
                    .quoted(dec!(5000.00), dec!(5000.50), dec!(5000.25), 1_250_000),
                SimInstrumentConfig::future("MES 03-26", "MESH26", dec!(0.25), dec!(5))
                    .quoted(dec!(5040.50), dec!(5040.75), dec!(5040.75), 310_000),
                SimInstrumentConfig::future("NQ 12-25", "NQZ25", dec!(0.25), dec!(20))
                    .quoted(dec!(21000.25), dec!(21000.75), dec!(21000.50), 540_000),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_seed() {
        let config: SimConfig = toml::from_str(
            r#"
            [[accounts]]
            name = "Sim101"
            cash = "25000"

            [[instruments]]
            symbol = "CL 01-26"
            aliases = ["CLF26"]
            tick_size = "0.01"
            point_value = "1000"
            last = "61.25"
            "#,
        )
        .unwrap();
        assert_eq!(config.accounts[0].cash, dec!(25000));
        assert_eq!(config.accounts[0].buying_power, None);
        let cl = &config.instruments[0];
        assert_eq!(cl.instrument_type, InstrumentType::Future);
        assert_eq!(cl.point_value, dec!(1000));
        assert_eq!(cl.last, Some(dec!(61.25)));
        assert_eq!(cl.bid, None);
    }

    #[test]
    fn test_default_seed_has_sim_accounts() {
        let config = SimConfig::default();
        assert!(config.accounts.iter().any(|a| a.name == "Sim101"));
        assert!(config
            .instruments
            .iter()
            .any(|i| i.aliases.contains(&"ESZ25".to_string())));
    }
}
