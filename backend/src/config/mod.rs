use config::{Config, ConfigError, Environment, File};
use dotenv::dotenv;
use serde::Deserialize;
use std::fmt;

use crate::accounting::{AmountPolicy, MarketPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_pool_size: u32,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub seed_sample_data: bool,
    pub appreciation_multiplier: f64,
    pub amount_policy: AmountPolicy,
    pub debit_wallets: bool,
}

impl AppConfig {
    /// Defaults, then `marketplace.toml` if present, then the environment
    /// (including `.env`).
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        let settings = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 5000_i64)?
            .set_default("storage", "memory")?
            .set_default("database_pool_size", 8_i64)?
            .set_default("token_ttl_hours", 24_i64)?
            .set_default("seed_sample_data", true)?
            .set_default("appreciation_multiplier", 1.08_f64)?
            .set_default("amount_policy", "unchecked")?
            .set_default("debit_wallets", false)?
            .add_source(File::with_name("marketplace").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("JWT_SECRET must not be empty".into()));
        }
        if self.storage == StorageBackend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::Message(
                "DATABASE_URL must be set when STORAGE=postgres".into(),
            ));
        }
        if !self.appreciation_multiplier.is_finite() || self.appreciation_multiplier <= 0.0 {
            return Err(ConfigError::Message(
                "APPRECIATION_MULTIPLIER must be a positive number".into(),
            ));
        }
        if self.token_ttl_hours <= 0 {
            return Err(ConfigError::Message("TOKEN_TTL_HOURS must be positive".into()));
        }
        Ok(())
    }

    pub fn policy(&self) -> MarketPolicy {
        MarketPolicy {
            amount: self.amount_policy,
            debit_wallets: self.debit_wallets,
        }
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn testing() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            storage: StorageBackend::Memory,
            database_url: None,
            database_pool_size: 1,
            jwt_secret: "test-secret".into(),
            token_ttl_hours: 1,
            seed_sample_data: false,
            appreciation_multiplier: 1.08,
            amount_policy: AmountPolicy::Unchecked,
            debit_wallets: false,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage", &self.storage)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("database_pool_size", &self.database_pool_size)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("seed_sample_data", &self.seed_sample_data)
            .field("appreciation_multiplier", &self.appreciation_multiplier)
            .field("amount_policy", &self.amount_policy)
            .field("debit_wallets", &self.debit_wallets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_requires_database_url() {
        let mut config = AppConfig::testing();
        config.storage = StorageBackend::Postgres;
        assert!(config.check().is_err());
        config.database_url = Some("postgres://localhost/marketplace".into());
        assert!(config.check().is_ok());
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", AppConfig::testing());
        assert!(!rendered.contains("test-secret"));
    }
}
