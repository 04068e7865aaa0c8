//! Configuration loading.
//!
//! Defaults are overridden by `PIZZA_`-prefixed environment variables, with
//! `__` separating nested keys (`PIZZA_DATABASE__URL`, `PIZZA_SERVER__PORT`).

use chrono::Duration;
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pricing::PricingPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub nats_url: Option<String>,
    pub log_level: String,
    pub log_json: bool,
    pub pricing: PricingConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub currency: String,
    pub new_pizza_window_days: i64,
    pub new_pizza_discount_percent: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub timeout_secs: u64,
}

/// Serializable defaults; secrets default to empty strings and must be
/// supplied by the environment in any real deployment.
#[derive(Serialize)]
struct Defaults {
    server: ServerConfig,
    database: DatabaseDefaults,
    log_level: &'static str,
    log_json: bool,
    pricing: PricingConfig,
    gateway: GatewayDefaults,
}

#[derive(Serialize)]
struct DatabaseDefaults {
    url: &'static str,
    max_connections: u32,
}

#[derive(Serialize)]
struct GatewayDefaults {
    base_url: &'static str,
    key_id: &'static str,
    key_secret: &'static str,
    webhook_secret: &'static str,
    timeout_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 8083 },
            database: DatabaseDefaults { url: "postgres://localhost/pizza_storefront", max_connections: 10 },
            log_level: "info",
            log_json: false,
            pricing: PricingConfig { currency: "INR".to_string(), new_pizza_window_days: 30, new_pizza_discount_percent: Decimal::TEN },
            gateway: GatewayDefaults {
                base_url: "https://api.razorpay.com",
                key_id: "",
                key_secret: "",
                webhook_secret: "",
                timeout_secs: 10,
            },
        }
    }
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Defaults::default())).merge(Env::prefixed("PIZZA_").split("__"))
    }

    /// Loads configuration from defaults and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::figment().extract()?)
    }
}

impl PricingConfig {
    pub fn policy(&self) -> PricingPolicy {
        PricingPolicy {
            currency: self.currency.to_uppercase(),
            new_pizza_window: Duration::days(self.new_pizza_window_days),
            new_pizza_discount_percent: self.new_pizza_discount_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.server.port, 8083);
            assert_eq!(config.pricing.policy().new_pizza_window, Duration::days(30));
            assert!(config.nats_url.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PIZZA_SERVER__PORT", "9000");
            jail.set_env("PIZZA_DATABASE__URL", "postgres://user:pass@db/pizza");
            jail.set_env("PIZZA_PRICING__NEW_PIZZA_DISCOUNT_PERCENT", "15");
            let config: AppConfig = AppConfig::figment().extract()?;
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.database.url.expose_secret(), "postgres://user:pass@db/pizza");
            assert_eq!(config.pricing.new_pizza_discount_percent, Decimal::from(15));
            Ok(())
        });
    }

    #[test]
    fn test_secret_redaction() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PIZZA_GATEWAY__KEY_SECRET", "super-secret-key");
            let config: AppConfig = AppConfig::figment().extract()?;
            assert!(!format!("{:?}", config.gateway).contains("super-secret-key"));
            Ok(())
        });
    }
}
