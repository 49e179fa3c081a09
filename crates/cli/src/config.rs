use anyhow::{Context, Result};
use ntbridge_server::BridgeConfig;
use ntbridge_sim::SimConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of the TOML config file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub simulation: SimConfig,
}

impl AppConfig {
    /// Read `path`, or fall back to the built-in defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.bridge.validate()?;
        Ok(config)
    }
}
