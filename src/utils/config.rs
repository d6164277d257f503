use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Port the API listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Postgres connection string. Without it the server runs on the
    /// in-memory store.
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    /// Enables cross-instance snapshot invalidation when set
    pub redis_url: Option<String>,

    /// Bearer token expected on every API route except /healthz and /metrics
    #[serde(default)]
    pub api_key: String,

    /// How long a subscription snapshot stays cached (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Max cached snapshots, one per actor
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: u64,

    /// Per-request timeout in ms
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_invitation_expiry_days")]
    pub invitation_expiry_days: i64,

    #[serde(default = "default_invitation_max_uses")]
    pub invitation_max_uses: u32,

    /// Day of the month fees fall due (1..=28)
    #[serde(default = "default_fee_due_day")]
    pub fee_due_day: u32,

    #[serde(default)]
    pub fee_grace_days: u32,
}

impl AppConfig {
    /// Loads and validates the server configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Self::from_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads `.env` and the process environment without validating, for
    /// tools that do not serve the API.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let cfg: AppConfig = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("api_key must be set".to_string()));
        }
        if self.invitation_max_uses == 0 {
            return Err(ConfigError::Invalid(
                "invitation_max_uses must be at least 1".to_string(),
            ));
        }
        if !(1..=28).contains(&self.fee_due_day) {
            return Err(ConfigError::Invalid(format!(
                "fee_due_day must be between 1 and 28, got {}",
                self.fee_due_day
            )));
        }
        if self.invitation_expiry_days <= 0 {
            return Err(ConfigError::Invalid(
                "invitation_expiry_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: None,
            database_max_connections: default_max_connections(),
            redis_url: None,
            api_key: String::new(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_entries: default_cache_max_entries(),
            request_timeout_ms: default_timeout_ms(),
            invitation_expiry_days: default_invitation_expiry_days(),
            invitation_max_uses: default_invitation_max_uses(),
            fee_due_day: default_fee_due_day(),
            fee_grace_days: 0,
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> u32 {
    crate::utils::constants::DEFAULT_MAX_CONNECTIONS
}
fn default_cache_ttl_ms() -> u64 {
    30_000
}
fn default_cache_max_entries() -> u64 {
    10_000
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_invitation_expiry_days() -> i64 {
    7
}
fn default_invitation_max_uses() -> u32 {
    1
}
fn default_fee_due_day() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            api_key: "secret".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn defaults_validate_once_a_key_is_set() {
        assert!(valid().validate().is_ok());
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cfg = AppConfig {
            fee_due_day: 31,
            ..valid()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = AppConfig {
            invitation_max_uses: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .set_override("api_key", "k")
            .and_then(|b| b.set_override("fee_due_day", 10))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.cache_ttl_ms, 30_000);
        assert_eq!(cfg.fee_due_day, 10);
        assert!(cfg.database_url.is_none());
    }
}
