//! Engine configuration loaded from the environment.

use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::warn;

use splitledger_core::MINOR_UNIT;
use splitledger_observability::{LOG_FORMAT_ENV, LogFormat};

pub const SPLIT_EPSILON_ENV: &str = "SPLITLEDGER_SPLIT_EPSILON";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tolerance when reconciling split allocations against their total.
    pub split_epsilon: Decimal,
    pub log_format: LogFormat,
    /// Postgres connection string; `None` means in-memory storage.
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            split_epsilon: MINOR_UNIT,
            log_format: LogFormat::default(),
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Load from process environment. Invalid values fall back to defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`] but fails on the first invalid value.
    pub fn try_from_env() -> anyhow::Result<Self> {
        Self::try_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let split_epsilon = match lookup(SPLIT_EPSILON_ENV).map(|raw| parse_epsilon(&raw)) {
            Some(Ok(epsilon)) => epsilon,
            Some(Err(err)) => {
                warn!(error = %err, default = %defaults.split_epsilon, "invalid {SPLIT_EPSILON_ENV}; using default");
                defaults.split_epsilon
            }
            None => defaults.split_epsilon,
        };

        let log_format = match lookup(LOG_FORMAT_ENV).map(|raw| raw.parse::<LogFormat>()) {
            Some(Ok(format)) => format,
            Some(Err(err)) => {
                warn!(error = %err, default = %defaults.log_format, "invalid {LOG_FORMAT_ENV}; using default");
                defaults.log_format
            }
            None => defaults.log_format,
        };

        Self {
            split_epsilon,
            log_format,
            database_url: database_url(&lookup),
        }
    }

    /// Install the process-wide subscriber in the configured format.
    pub fn init_tracing(&self) {
        splitledger_observability::init_with(self.log_format);
    }

    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let split_epsilon = lookup(SPLIT_EPSILON_ENV)
            .map(|raw| parse_epsilon(&raw))
            .transpose()
            .with_context(|| format!("reading {SPLIT_EPSILON_ENV}"))?
            .unwrap_or(defaults.split_epsilon);

        let log_format = lookup(LOG_FORMAT_ENV)
            .map(|raw| raw.parse::<LogFormat>())
            .transpose()
            .with_context(|| format!("reading {LOG_FORMAT_ENV}"))?
            .unwrap_or(defaults.log_format);

        Ok(Self {
            split_epsilon,
            log_format,
            database_url: database_url(&lookup),
        })
    }
}

fn database_url(lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(DATABASE_URL_ENV)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn parse_epsilon(raw: &str) -> anyhow::Result<Decimal> {
    let epsilon = Decimal::from_str(raw.trim())
        .with_context(|| format!("'{raw}' is not a decimal number"))?;
    anyhow::ensure!(epsilon > Decimal::ZERO, "split epsilon must be positive, got {epsilon}");
    Ok(epsilon)
}
