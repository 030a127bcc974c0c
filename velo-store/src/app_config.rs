use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use tracing::warn;

use velo_core::config::{DriverPayMode, SettlementConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub settlement: SettlementRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty string means no database; the API falls back to the
    /// in-memory store.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

/// Settlement knobs as they appear in config files and the settings
/// table. Amounts are plain numbers here; `to_config` converts them to
/// the exact decimals the ledger works with.
#[derive(Debug, Deserialize, Clone)]
pub struct SettlementRules {
    #[serde(default = "default_pay_enabled")]
    pub driver_pay_enabled: bool,
    #[serde(default = "default_pay_mode")]
    pub driver_pay_mode: String,
    #[serde(default)]
    pub driver_pay_amount: f64,
    #[serde(default = "default_pay_percentage")]
    pub driver_pay_percentage: f64,
}

fn default_pay_enabled() -> bool {
    true
}

fn default_pay_mode() -> String {
    "percentage".to_string()
}

fn default_pay_percentage() -> f64 {
    30.0
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self {
            driver_pay_enabled: default_pay_enabled(),
            driver_pay_mode: default_pay_mode(),
            driver_pay_amount: 0.0,
            driver_pay_percentage: default_pay_percentage(),
        }
    }
}

impl SettlementRules {
    pub fn to_config(&self) -> SettlementConfig {
        let mode = match self.driver_pay_mode.as_str() {
            "flat" => DriverPayMode::Flat,
            "percentage" => DriverPayMode::Percentage,
            other => {
                warn!(mode = other, "unknown driver pay mode, using percentage");
                DriverPayMode::Percentage
            }
        };
        SettlementConfig {
            driver_pay_enabled: self.driver_pay_enabled,
            driver_pay_mode: mode,
            driver_pay_amount: Decimal::from_f64(self.driver_pay_amount).unwrap_or(Decimal::ZERO),
            driver_pay_percentage: Decimal::from_f64(self.driver_pay_percentage)
                .unwrap_or(Decimal::ZERO),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of VELO)
            // Eg.. `VELO_DEBUG=1` would set the `debug` key
            .add_source(config::Environment::with_prefix("VELO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
