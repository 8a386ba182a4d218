use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::LedgerError;

/// Length of the payout cycle when the config does not override it.
pub const DEFAULT_CYCLE_MONTHS: u32 = 11;

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "LEDGER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub source: Source,
    pub ledger: Ledger,
    pub observability: Observability,
    pub web: Option<Web>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    /// Published CSV export of the sheet (`.../pub?output=csv`).
    pub sheet_url: String,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ledger {
    #[serde(default = "default_cycle_months")]
    pub cycle_months: u32,
    pub strategy: StrategyKind,
    pub invalid_date_policy: InvalidDatePolicy,
    pub estimated_monthly_rate_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observability {
    pub service_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Web {
    pub port: u16,
    pub host: String,
    pub auth_password: Option<String>,
}

/// Which reconciliation algorithm derives months elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Count `Payout` rows per investor.
    PayoutCount,
    /// Whole calendar months since the start date.
    Calendar,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayoutCount => "payout_count",
            Self::Calendar => "calendar",
        }
    }
}

/// What a missing or unparsable start date means for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidDatePolicy {
    /// Assume the cycle is exhausted: zero months remaining.
    Expired,
    /// Assume the contract just started: the full cycle remains.
    Fresh,
}

/// Validated, typed view of the `[ledger]` section used by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub cycle_months: u32,
    pub strategy: StrategyKind,
    pub invalid_date_policy: InvalidDatePolicy,
    pub estimated_monthly_rate_pct: Decimal,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            cycle_months: DEFAULT_CYCLE_MONTHS,
            strategy: StrategyKind::Calendar,
            invalid_date_policy: InvalidDatePolicy::Expired,
            estimated_monthly_rate_pct: Decimal::new(3, 0),
        }
    }
}

fn default_cycle_months() -> u32 {
    DEFAULT_CYCLE_MONTHS
}

impl Config {
    /// Load from `$LEDGER_CONFIG`, falling back to `config/default.toml`.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.ledger_settings()?;
        Ok(config)
    }

    pub fn ledger_settings(&self) -> std::result::Result<LedgerSettings, LedgerError> {
        let ledger = &self.ledger;
        if ledger.cycle_months == 0 {
            return Err(LedgerError::InvalidConfig(
                "ledger.cycle_months must be at least 1".to_string(),
            ));
        }
        let rate = Decimal::from_f64(ledger.estimated_monthly_rate_pct)
            .filter(|r| !r.is_sign_negative())
            .ok_or_else(|| {
                LedgerError::InvalidConfig(format!(
                    "ledger.estimated_monthly_rate_pct must be a non-negative number, got {}",
                    ledger.estimated_monthly_rate_pct
                ))
            })?;
        Ok(LedgerSettings {
            cycle_months: ledger.cycle_months,
            strategy: ledger.strategy,
            invalid_date_policy: ledger.invalid_date_policy,
            estimated_monthly_rate_pct: rate.normalize(),
        })
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
