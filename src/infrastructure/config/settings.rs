//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file. Credentials never live in the
//! file: the reference API key and the exchange key pair come from the
//! `REFERENCE_API_KEY`, `EXCHANGE_ACCESS_KEY`, and `EXCHANGE_SECRET_KEY`
//! environment variables (a `.env` file is honored via `dotenvy` at the
//! binary edge).

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use url::Url;

use super::logging::LoggingConfig;
use crate::application::controller::ControllerConfig;
use crate::application::pairing::PairingConfig;
use crate::application::scheduler::SchedulerConfig;
use crate::application::state::RuntimeSettings;
use crate::domain::market::MarketKind;
use crate::domain::pricing::PricingConfig;
use crate::error::{ConfigError, Result};

/// Reference feed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// API key, from `REFERENCE_API_KEY`. Never read from the file.
    #[serde(skip)]
    pub api_key: String,
    #[serde(default = "default_reference_base_url")]
    pub base_url: String,
    /// Sport label, also used for exchange tournament filtering.
    #[serde(default = "default_sport")]
    pub sport: String,
    /// Sport key on the feed's odds endpoint.
    #[serde(default = "default_sport_key")]
    pub sport_key: String,
    /// The single sharp book whose prices are replicated.
    #[serde(default = "default_bookmaker")]
    pub bookmaker: String,
    /// Market kinds to replicate.
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketKind>,
    /// Minimum spacing between feed requests.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

fn default_reference_base_url() -> String {
    "https://api.the-odds-api.com".into()
}

fn default_sport() -> String {
    "baseball".into()
}

fn default_sport_key() -> String {
    "baseball_mlb".into()
}

fn default_bookmaker() -> String {
    "pinnacle".into()
}

fn default_markets() -> Vec<MarketKind> {
    vec![MarketKind::Moneyline, MarketKind::Spread, MarketKind::Total]
}

fn default_min_request_interval_ms() -> u64 {
    1000
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_reference_base_url(),
            sport: default_sport(),
            sport_key: default_sport_key(),
            bookmaker: default_bookmaker(),
            markets: default_markets(),
            min_request_interval_ms: default_min_request_interval_ms(),
        }
    }
}

/// Exchange connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Access key, from `EXCHANGE_ACCESS_KEY`.
    #[serde(skip)]
    pub access_key: String,
    /// Secret key, from `EXCHANGE_SECRET_KEY`.
    #[serde(skip)]
    pub secret_key: String,
    /// Use the sandbox environment. Selects the base URL.
    #[serde(default = "default_true")]
    pub sandbox: bool,
    /// Explicit base URL override; normally derived from `sandbox`.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            sandbox: true,
            base_url: None,
        }
    }
}

impl ExchangeConfig {
    /// Effective base URL for the configured environment.
    #[must_use]
    pub fn effective_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.clone();
        }
        if self.sandbox {
            "https://api-sandbox.betfoundry.io".into()
        } else {
            "https://api.betfoundry.io".into()
        }
    }
}

/// Pricing and placement strategy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    #[serde(default = "default_base_plus_stake")]
    pub base_plus_stake: Decimal,
    #[serde(default = "default_hard_max_plus")]
    pub hard_max_plus: Decimal,
    #[serde(default = "default_position_multiplier")]
    pub position_multiplier: Decimal,
    /// American-points move that invalidates resting wagers.
    #[serde(default = "default_significant_move")]
    pub significant_move_threshold: i32,
    #[serde(default = "default_cool_down_seconds")]
    pub cool_down_seconds: u64,
}

fn default_commission_rate() -> Decimal {
    Decimal::new(3, 2)
}

fn default_base_plus_stake() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn default_hard_max_plus() -> Decimal {
    Decimal::from(500)
}

fn default_position_multiplier() -> Decimal {
    Decimal::from(5)
}

fn default_significant_move() -> i32 {
    5
}

fn default_cool_down_seconds() -> u64 {
    300
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            commission_rate: default_commission_rate(),
            base_plus_stake: default_base_plus_stake(),
            hard_max_plus: default_hard_max_plus(),
            position_multiplier: default_position_multiplier(),
            significant_move_threshold: default_significant_move(),
            cool_down_seconds: default_cool_down_seconds(),
        }
    }
}

/// Cycle scheduling settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_stop_margin_minutes")]
    pub stop_margin_minutes: i64,
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: i64,
    #[serde(default = "default_max_events_tracked")]
    pub max_events_tracked: usize,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_max_exposure_per_event")]
    pub max_exposure_per_event: Decimal,
    #[serde(default = "default_max_exposure_total")]
    pub max_exposure_total: Decimal,
    #[serde(default)]
    pub cancel_at_stop: bool,
    /// Request timeout for all outbound HTTP.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_stop_margin_minutes() -> i64 {
    15
}

fn default_lookahead_hours() -> i64 {
    72
}

fn default_max_events_tracked() -> usize {
    30
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_max_exposure_per_event() -> Decimal {
    Decimal::from(500)
}

fn default_max_exposure_total() -> Decimal {
    Decimal::from(2000)
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            stop_margin_minutes: default_stop_margin_minutes(),
            lookahead_hours: default_lookahead_hours(),
            max_events_tracked: default_max_events_tracked(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_exposure_per_event: default_max_exposure_per_event(),
            max_exposure_total: default_max_exposure_total(),
            cancel_at_stop: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Event pairing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingSettings {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_time_tolerance_minutes")]
    pub time_tolerance_minutes: i64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_time_tolerance_minutes() -> i64 {
    15
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            time_tolerance_minutes: default_time_tolerance_minutes(),
        }
    }
}

/// Admin HTTP surface settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_bind")]
    pub bind: String,
}

fn default_admin_bind() -> String {
    "127.0.0.1:8080".into()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind: default_admin_bind(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub scheduler: PollingConfig,
    #[serde(default)]
    pub pairing: PairingSettings,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Log placements and cancellations without dispatching them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

impl Config {
    /// Parse configuration from TOML content, pulling credentials from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        config.reference.api_key = std::env::var("REFERENCE_API_KEY").unwrap_or_default();
        config.exchange.access_key = std::env::var("EXCHANGE_ACCESS_KEY").unwrap_or_default();
        config.exchange.secret_key = std::env::var("EXCHANGE_SECRET_KEY").unwrap_or_default();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, the TOML is
    /// malformed, or validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_seconds < 60 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_seconds",
                reason: "must be at least 60 to stay within feed rate limits".into(),
            }
            .into());
        }
        if self.strategy.commission_rate < Decimal::ZERO
            || self.strategy.commission_rate >= Decimal::ONE
        {
            return Err(ConfigError::InvalidValue {
                field: "commission_rate",
                reason: "must be in [0, 1)".into(),
            }
            .into());
        }
        if self.strategy.base_plus_stake <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "base_plus_stake",
                reason: "must be greater than 0".into(),
            }
            .into());
        }
        if self.strategy.position_multiplier < Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "position_multiplier",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.pairing.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "confidence_threshold",
                reason: "must be between 0 and 1".into(),
            }
            .into());
        }
        if self.scheduler.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests",
                reason: "must be greater than 0".into(),
            }
            .into());
        }
        if self.reference.markets.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "reference.markets",
                reason: "at least one market kind is required".into(),
            }
            .into());
        }
        Url::parse(&self.reference.base_url)?;
        Url::parse(&self.exchange.effective_base_url())?;
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    #[must_use]
    pub fn pricing_config(&self) -> PricingConfig {
        PricingConfig {
            commission: self.strategy.commission_rate,
            base_plus_stake: self.strategy.base_plus_stake,
            hard_max_plus: self.strategy.hard_max_plus,
            position_multiplier: self.strategy.position_multiplier,
        }
    }

    #[must_use]
    pub fn pairing_config(&self) -> PairingConfig {
        PairingConfig {
            confidence_threshold: self.pairing.confidence_threshold,
            time_tolerance: Duration::minutes(self.pairing.time_tolerance_minutes),
        }
    }

    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            cool_down: Duration::seconds(self.strategy.cool_down_seconds as i64),
            significant_move: self.strategy.significant_move_threshold,
            dedup_guard: Duration::minutes(2),
        }
    }

    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sport: self.reference.sport.clone(),
            stop_margin: Duration::minutes(self.scheduler.stop_margin_minutes),
            lookahead: Duration::hours(self.scheduler.lookahead_hours),
            max_events_tracked: self.scheduler.max_events_tracked,
            max_concurrent_requests: self.scheduler.max_concurrent_requests,
            max_exposure_per_event: self.scheduler.max_exposure_per_event,
            max_exposure_total: self.scheduler.max_exposure_total,
            cancel_at_stop: self.scheduler.cancel_at_stop,
        }
    }

    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            poll_interval_seconds: self.scheduler.poll_interval_seconds,
            base_plus_stake: self.strategy.base_plus_stake,
            cool_down_seconds: self.strategy.cool_down_seconds,
        }
    }
}
