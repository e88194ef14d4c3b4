use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::DriverConfig;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ram_multiplier: {0}. Must be in (0.0, 1.0]")]
    InvalidRamMultiplier(f64),

    #[error("Invalid delete_retry_attempts: 0. At least one attempt is required")]
    ZeroDeleteRetries,

    #[error("Invalid poll_interval_ms: 0. Polling requires a non-zero interval")]
    ZeroPollInterval,

    #[error("Invalid {0}: 0. Deadlines must be non-zero")]
    ZeroDeadline(&'static str),

    #[error(
        "rebalance_deadline_secs ({rebalance}) must not be shorter than \
         client_request_deadline_secs ({generic}); rebalance is the slower operation"
    )]
    RebalanceDeadlineTooShort { rebalance: u64, generic: u64 },
}

/// Loader with hierarchical merging, lowest to highest precedence:
/// programmatic defaults, `cbdrive.yaml` in the working directory, then
/// `CBDRIVE_*` environment variables.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<DriverConfig> {
        let config: DriverConfig = Figment::new()
            .merge(Serialized::defaults(DriverConfig::default()))
            .merge(Yaml::file("cbdrive.yaml"))
            .merge(Env::prefixed("CBDRIVE_"))
            .extract()
            .context("Failed to extract driver configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<DriverConfig> {
        let config: DriverConfig = Figment::new()
            .merge(Serialized::defaults(DriverConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", path.as_ref()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &DriverConfig) -> Result<(), ConfigError> {
        if config.ram_multiplier <= 0.0 || config.ram_multiplier > 1.0 {
            return Err(ConfigError::InvalidRamMultiplier(config.ram_multiplier));
        }
        if config.delete_retry_attempts == 0 {
            return Err(ConfigError::ZeroDeleteRetries);
        }
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if config.client_request_deadline_secs == 0 {
            return Err(ConfigError::ZeroDeadline("client_request_deadline_secs"));
        }
        if config.rebalance_deadline_secs == 0 {
            return Err(ConfigError::ZeroDeadline("rebalance_deadline_secs"));
        }
        if config.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDeadline("request_timeout_secs"));
        }
        if config.rebalance_deadline_secs < config.client_request_deadline_secs {
            return Err(ConfigError::RebalanceDeadlineTooShort {
                rebalance: config.rebalance_deadline_secs,
                generic: config.client_request_deadline_secs,
            });
        }
        Ok(())
    }
}
