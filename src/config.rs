use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration, layered from `config/default.toml`,
/// `config/{environment}.toml` and `APP__*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment (development / production / test)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool sizing and timeouts
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Rate limiting (in-memory, fixed window)
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests_per_window: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_seconds: u64,
    #[serde(default = "default_true")]
    pub rate_limit_enable_headers: bool,

    /// Pricing knobs (see `services::carts::PricingConfig`)
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,
    #[serde(default = "default_flat_shipping_rate")]
    pub flat_shipping_rate: f64,

    /// Cart session lifetime in days
    #[serde(default = "default_cart_expiry_days")]
    pub cart_expiry_days: i64,

    /// ISO 4217 currency for orders and payments
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Stripe credentials
    #[serde(default)]
    pub stripe_secret_key: Option<String>,
    #[serde(default)]
    pub stripe_publishable_key: Option<String>,
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,
    /// Webhook timestamp tolerance in seconds
    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,

    /// PayPal credentials
    #[serde(default)]
    pub paypal_client_id: Option<String>,
    #[serde(default)]
    pub paypal_client_secret: Option<String>,
    #[serde(default = "default_true")]
    pub paypal_sandbox: bool,

    /// Transactional email delivery (HTTP API); disabled when unset
    #[serde(default)]
    pub email_api_url: Option<String>,
    #[serde(default)]
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,

    /// Public base URL used in email links
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

impl AppConfig {
    /// Minimal constructor used by tests; everything else takes defaults.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            host: default_host(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            rate_limit_requests_per_window: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window_secs(),
            rate_limit_enable_headers: true,
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_rate: default_flat_shipping_rate(),
            cart_expiry_days: default_cart_expiry_days(),
            currency: default_currency(),
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
            paypal_client_id: None,
            paypal_client_secret: None,
            paypal_sandbox: true,
            email_api_url: None,
            email_api_key: None,
            email_from: default_email_from(),
            app_url: default_app_url(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Tax rate as a normalized `Decimal` (4 dp is plenty for a rate).
    pub fn tax_rate_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.tax_rate)
            .unwrap_or_default()
            .round_dp(4)
    }

    pub fn free_shipping_threshold_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.free_shipping_threshold)
            .unwrap_or_default()
            .round_dp(2)
    }

    pub fn flat_shipping_rate_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.flat_shipping_rate)
            .unwrap_or_default()
            .round_dp(2)
    }
}

/// Load configuration from files and environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("APP__ENVIRONMENT")
        .or_else(|_| std::env::var("ENVIRONMENT"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default");
    builder = builder.add_source(File::from(default_path).required(false));

    let env_path = Path::new(CONFIG_DIR).join(&environment);
    builder = builder.add_source(File::from(env_path).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %config.environment, "configuration loaded");
    Ok(config)
}

/// Install the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_rate_limit_requests() -> u32 {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_tax_rate() -> f64 {
    0.085
}
fn default_free_shipping_threshold() -> f64 {
    75.0
}
fn default_flat_shipping_rate() -> f64 {
    10.0
}
fn default_cart_expiry_days() -> i64 {
    7
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    300
}
fn default_email_from() -> String {
    "orders@matchable.store".to_string()
}
fn default_app_url() -> String {
    "http://localhost:4200".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pricing_decimals_are_normalized() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        assert_eq!(cfg.tax_rate_decimal(), dec!(0.0850));
        assert_eq!(cfg.free_shipping_threshold_decimal(), dec!(75.00));
        assert_eq!(cfg.flat_shipping_rate_decimal(), dec!(10.00));
    }

    #[test]
    fn development_allows_permissive_cors() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "development".into());
        assert!(cfg.should_allow_permissive_cors());

        let mut prod = AppConfig::new("sqlite::memory:".into(), "production".into());
        assert!(!prod.should_allow_permissive_cors());
        prod.cors_allow_any_origin = true;
        assert!(prod.should_allow_permissive_cors());
    }
}
