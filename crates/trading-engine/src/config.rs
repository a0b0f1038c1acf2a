use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use risk_gate::{default_exclusions, RiskGate};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::error::EngineError;

pub const DEFAULT_PAPER_URL: &str = "https://paper-api.alpaca.markets";
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Master switch for execute and scheduled runs
    pub auto_trading_enabled: bool,

    // Sizing and exits
    pub max_positions: usize,
    pub trade_amount: Decimal,     // dollars per entry
    pub stop_loss_pct: Decimal,    // fraction, 0.05 = 5%
    pub take_profit_pct: Decimal,  // fraction, 0.10 = 10%
    pub track_buying_power: bool,  // decrement buying power after each submission

    // Candidate gate
    pub min_score: f64,
    pub excluded_symbols: HashSet<String>,

    // Signal source
    pub signal_source_url: Option<String>,
    pub scan_cache_ttl: Duration,

    // Timer trigger
    pub scheduler_enabled: bool,
    pub scan_interval: Duration,
    pub cron_secret: Option<String>,

    // Broker
    pub alpaca_api_key: String,
    pub alpaca_secret_key: String,
    pub alpaca_base_url: String,
    pub alpaca_data_url: String,
    pub broker_timeout: Duration,
    pub live_trading_approved: bool,

    // Upper bound on the post-run trade alert
    pub notify_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_trading_enabled: false,
            max_positions: 5,
            trade_amount: Decimal::from(1000),
            stop_loss_pct: Decimal::new(5, 2),
            take_profit_pct: Decimal::new(10, 2),
            track_buying_power: true,
            min_score: 60.0,
            excluded_symbols: default_exclusions(),
            signal_source_url: None,
            scan_cache_ttl: Duration::from_secs(300),
            scheduler_enabled: false,
            scan_interval: Duration::from_secs(900),
            cron_secret: None,
            alpaca_api_key: String::new(),
            alpaca_secret_key: String::new(),
            alpaca_base_url: DEFAULT_PAPER_URL.to_string(),
            alpaca_data_url: DEFAULT_DATA_URL.to_string(),
            broker_timeout: Duration::from_secs(15),
            live_trading_approved: false,
            notify_timeout: Duration::from_secs(10),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .trim()
        .parse()
        .with_context(|| format!("{} is not valid", name))
}

fn parse_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{} must be a boolean, got '{}'", name, other),
        },
        _ => Ok(default),
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated symbol list, upper-cased, blanks dropped.
pub fn parse_symbol_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut excluded_symbols = default_exclusions();
        excluded_symbols.extend(parse_symbol_list(&var_or("EXCLUDED_SYMBOLS", "")));

        let config = Self {
            auto_trading_enabled: parse_flag("AUTO_TRADING_ENABLED", false)?,

            max_positions: parse_var("MAX_POSITIONS", "5")?,
            trade_amount: parse_var("TRADE_AMOUNT", "1000")?,
            stop_loss_pct: parse_var("STOP_LOSS_PCT", "0.05")?,
            take_profit_pct: parse_var("TAKE_PROFIT_PCT", "0.10")?,
            track_buying_power: parse_flag("TRACK_BUYING_POWER", true)?,

            min_score: parse_var("MIN_SCORE", "60")?,
            excluded_symbols,

            signal_source_url: optional_var("SIGNAL_SOURCE_URL"),
            scan_cache_ttl: Duration::from_secs(parse_var("SCAN_CACHE_TTL_SECS", "300")?),

            scheduler_enabled: parse_flag("SCHEDULER_ENABLED", false)?,
            scan_interval: Duration::from_secs(parse_var("SCAN_INTERVAL_SECS", "900")?),
            cron_secret: optional_var("CRON_SECRET"),

            alpaca_api_key: optional_var("APCA_API_KEY_ID")
                .or_else(|| optional_var("ALPACA_API_KEY"))
                .context("APCA_API_KEY_ID (or ALPACA_API_KEY) not set")?,
            alpaca_secret_key: optional_var("APCA_API_SECRET_KEY")
                .or_else(|| optional_var("ALPACA_SECRET_KEY"))
                .context("APCA_API_SECRET_KEY (or ALPACA_SECRET_KEY) not set")?,
            alpaca_base_url: var_or("ALPACA_BASE_URL", DEFAULT_PAPER_URL),
            alpaca_data_url: var_or("ALPACA_DATA_URL", DEFAULT_DATA_URL),
            broker_timeout: Duration::from_secs(parse_var("BROKER_TIMEOUT_SECS", "15")?),
            live_trading_approved: var_or("LIVE_TRADING_APPROVED", "")
                .trim()
                .eq_ignore_ascii_case("yes"),

            notify_timeout: Duration::from_secs(parse_var("NOTIFY_TIMEOUT_SECS", "10")?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.trade_amount <= Decimal::ZERO {
            return Err(EngineError::InvalidConfig(format!(
                "TRADE_AMOUNT must be positive, got {}",
                self.trade_amount
            )));
        }
        if self.max_positions == 0 {
            return Err(EngineError::InvalidConfig(
                "MAX_POSITIONS must be at least 1".to_string(),
            ));
        }
        for (name, pct) in [
            ("STOP_LOSS_PCT", self.stop_loss_pct),
            ("TAKE_PROFIT_PCT", self.take_profit_pct),
        ] {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE {
                return Err(EngineError::InvalidConfig(format!(
                    "{} must be a fraction in (0, 1), got {}",
                    name, pct
                )));
            }
        }
        if !self.min_score.is_finite() {
            return Err(EngineError::InvalidConfig("MIN_SCORE must be finite".to_string()));
        }
        if self.scan_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "SCAN_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.notify_timeout.is_zero() {
            return Err(EngineError::InvalidConfig(
                "NOTIFY_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_paper(&self) -> bool {
        self.alpaca_base_url.contains("paper-api")
    }

    /// Identifies the trading account for the single-flight run lease.
    ///
    /// The key id is hashed so the value can appear in logs and 409 bodies.
    pub fn account_key(&self) -> String {
        if self.alpaca_api_key.is_empty() {
            return "alpaca".to_string();
        }
        let digest = hex::encode(Sha256::digest(self.alpaca_api_key.as_bytes()));
        format!("alpaca:{}", &digest[..12])
    }

    pub fn risk_gate(&self) -> RiskGate {
        RiskGate::new(self.max_positions, self.min_score, self.excluded_symbols.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_paper());
        assert_eq!(config.trade_amount, dec!(1000));
        assert_eq!(config.stop_loss_pct, dec!(0.05));
        assert!(config.excluded_symbols.contains("SPY"));
    }

    #[test]
    fn rejects_out_of_range_percentages() {
        for pct in [dec!(0), dec!(1), dec!(5), dec!(-0.05)] {
            let config = EngineConfig {
                stop_loss_pct: pct,
                ..EngineConfig::default()
            };
            assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

            let config = EngineConfig {
                take_profit_pct: pct,
                ..EngineConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn rejects_zero_amount_and_capacity() {
        let config = EngineConfig {
            trade_amount: Decimal::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_positions: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn symbol_list_parsing() {
        let parsed = parse_symbol_list(" gme, amc ,,BB ");
        assert_eq!(parsed.len(), 3);
        assert!(parsed.contains("GME"));
        assert!(parsed.contains("AMC"));
        assert!(parsed.contains("BB"));
    }

    #[test]
    fn account_key_scopes_to_api_key() {
        let config = EngineConfig {
            alpaca_api_key: "PK123".into(),
            ..EngineConfig::default()
        };
        let key = config.account_key();
        assert!(key.starts_with("alpaca:"));
        assert_eq!(key.len(), "alpaca:".len() + 12);
        assert!(!key.contains("PK123"));
        assert_eq!(key, config.clone().account_key());

        let other = EngineConfig {
            alpaca_api_key: "PK456".into(),
            ..EngineConfig::default()
        };
        assert_ne!(key, other.account_key());
        assert_eq!(EngineConfig::default().account_key(), "alpaca");
    }

    #[test]
    fn live_url_is_not_paper() {
        let config = EngineConfig {
            alpaca_base_url: "https://api.alpaca.markets".into(),
            ..EngineConfig::default()
        };
        assert!(!config.is_paper());
    }
}
