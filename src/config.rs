use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_AUTH_ISSUER: &str = "freshstock-api";
const DEFAULT_AUTH_AUDIENCE: &str = "freshstock-clients";
const DEFAULT_JWT_EXPIRATION_SECS: i64 = 3600;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration, loaded from `config/{default,<env>}.toml` with
/// `APP__`-prefixed environment variable overrides.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub log_json: bool,

    /// Run pending migrations on startup.
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    #[serde(default)]
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters"))]
    pub jwt_secret: String,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Access token lifetime in seconds.
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: i64,

    /// Comma-separated list of allowed CORS origins; unset means permissive
    /// CORS in development and a startup error elsewhere.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
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

fn default_true() -> bool {
    true
}

fn default_auth_issuer() -> String {
    DEFAULT_AUTH_ISSUER.to_string()
}

fn default_auth_audience() -> String {
    DEFAULT_AUTH_AUDIENCE.to_string()
}

fn default_jwt_expiration() -> i64 {
    DEFAULT_JWT_EXPIRATION_SECS
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Load configuration from files and environment.
///
/// Precedence (lowest to highest): `config/default.toml`,
/// `config/<APP_ENV>.toml`, `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let builder = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

    if cfg.jwt_secret.is_empty() {
        if cfg.is_development() {
            info!("No JWT secret configured; using the development default");
            cfg.jwt_secret = DEV_DEFAULT_JWT_SECRET.to_string();
        } else {
            return Err(AppConfigError::Invalid(
                "APP__JWT_SECRET must be set outside development".to_string(),
            ));
        }
    }

    cfg.validate()
        .map_err(|e| AppConfigError::Invalid(e.to_string()))?;

    Ok(cfg)
}

/// Initialise the tracing subscriber. `RUST_LOG` overrides the configured
/// level when present.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".to_string(),
            host: default_host(),
            port: default_port(),
            environment: "development".to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            jwt_secret: DEV_DEFAULT_JWT_SECRET.to_string(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            jwt_expiration: default_jwt_expiration(),
            cors_allowed_origins: None,
        }
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = base_config();
        cfg.jwt_secret = "too-short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn development_environments_are_detected() {
        let mut cfg = base_config();
        assert!(cfg.is_development());
        cfg.environment = "production".to_string();
        assert!(!cfg.is_development());
    }
}
