//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `LIQPAY_BILLING` prefix
//! and `__` between nesting levels.
//!
//! # Example
//!
//! ```no_run
//! use liqpay_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod liqpay;
mod server;
mod subscription;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use liqpay::LiqPayConfig;
pub use server::{Environment, ServerConfig};
pub use subscription::{AuditConfig, SubscriptionConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// PostgreSQL connection (required)
    pub database: DatabaseConfig,

    #[serde(default)]
    pub liqpay: LiqPayConfig,

    #[serde(default)]
    pub subscription: SubscriptionConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `LIQPAY_BILLING` prefix
    /// 3. Splits nesting on `__`
    ///
    /// # Environment Variable Format
    ///
    /// - `LIQPAY_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `LIQPAY_BILLING__LIQPAY__PRIVATE_KEY=...` -> `liqpay.private_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required values are missing or unparsable.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("LIQPAY_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section.
    ///
    /// Absent LiqPay keys pass; they are reported per request instead.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.liqpay.validate()?;
        self.subscription.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "LIQPAY_BILLING__DATABASE__URL",
        "LIQPAY_BILLING__SERVER__PORT",
        "LIQPAY_BILLING__SERVER__ENVIRONMENT",
        "LIQPAY_BILLING__LIQPAY__PUBLIC_KEY",
        "LIQPAY_BILLING__LIQPAY__PRIVATE_KEY",
        "LIQPAY_BILLING__SUBSCRIPTION__TRIAL_LENGTH_DAYS",
    ];

    fn set_minimal_env() {
        env::set_var("LIQPAY_BILLING__DATABASE__URL", "postgresql://test@localhost/test");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.subscription.trial_length_days, 14);
        assert!(!config.liqpay.has_keys());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("LIQPAY_BILLING__SERVER__PORT", "3000");
        env::set_var("LIQPAY_BILLING__SERVER__ENVIRONMENT", "production");
        env::set_var("LIQPAY_BILLING__LIQPAY__PUBLIC_KEY", "sandbox_i000");
        env::set_var("LIQPAY_BILLING__LIQPAY__PRIVATE_KEY", "sandbox_secret");
        env::set_var("LIQPAY_BILLING__SUBSCRIPTION__TRIAL_LENGTH_DAYS", "7");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert!(config.liqpay.has_keys());
        assert_eq!(config.subscription.trial_length_days, 7);
    }

    #[test]
    fn test_missing_database_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }
}
