use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_NOTIFICATION_QUEUE: &str = "wallcraft:notifications";
const DEFAULT_CURRENCY: &str = "INR";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (notification queue)
    pub redis_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create the database schema on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Payment gateway API base URL
    #[serde(default = "default_gateway_api_base")]
    pub gateway_api_base: String,

    /// Payment gateway key id (basic auth user)
    pub gateway_key_id: String,

    /// Payment gateway key secret; also signs client verification callbacks
    #[validate(length(min = 16, message = "gateway key secret is too short"))]
    pub gateway_key_secret: String,

    /// Webhook secret for verifying payment gateway callbacks
    #[validate(length(min = 16, message = "webhook secret is too short"))]
    pub payment_webhook_secret: String,

    /// Gateway HTTP timeout (seconds)
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    /// Settlement currency for gateway intents
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Redis list the notification dispatcher pushes jobs onto
    #[serde(default = "default_notification_queue")]
    pub notification_queue: String,

    /// Disable the notification dispatcher entirely (jobs are dropped)
    #[serde(default)]
    pub notifications_disabled: bool,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Constructor used by tests and tools that bypass file/env layering.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        redis_url: String,
        gateway_key_id: String,
        gateway_key_secret: String,
        payment_webhook_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url,
            host,
            port,
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
            gateway_api_base: default_gateway_api_base(),
            gateway_key_id,
            gateway_key_secret,
            payment_webhook_secret,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            default_currency: default_currency(),
            notification_queue: default_notification_queue(),
            notifications_disabled: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// CORS must be explicitly configured outside development.
    pub fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        if !self.is_development()
            && self.cors_allowed_origins.is_none()
            && !self.cors_allow_any_origin
        {
            let mut errs = validator::ValidationErrors::new();
            let mut err = ValidationError::new("cors");
            err.message = Some(
                "set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true outside development"
                    .into(),
            );
            errs.add("cors_allowed_origins", err);
            return Err(errs);
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
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

fn default_gateway_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_notification_queue() -> String {
    DEFAULT_NOTIFICATION_QUEUE.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("wallcraft_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: gateway credentials have no defaults - they MUST come from the
    // environment or a config file so an unconfigured deploy fails fast.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://wallcraft.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for key in [
        "gateway_key_id",
        "gateway_key_secret",
        "payment_webhook_secret",
    ] {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set APP__{} with the gateway dashboard value.",
                key,
                key.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                key
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
