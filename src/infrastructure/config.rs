//! Configuration loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::SimulationConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_iterations: {0}. Must be at least 1")]
    InvalidMaxIterations(u32),

    #[error("Invalid concurrency: {0}. Must be between 1 and 64")]
    InvalidConcurrency(usize),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid base_backoff_ms: {0}. Must be positive")]
    InvalidBackoff(u64),

    #[error("Invalid micro_steps: {0}. Must be at least 1")]
    InvalidMicroSteps(u32),

    #[error("Invalid step_timeout_ms: {0}. Must be positive")]
    InvalidStepTimeout(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. mirage.yaml (project config)
    /// 3. Environment variables (MIRAGE_* prefix, highest priority)
    pub fn load() -> Result<SimulationConfig> {
        let config: SimulationConfig = Figment::new()
            .merge(Serialized::defaults(SimulationConfig::default()))
            .merge(Yaml::file("mirage.yaml"))
            .merge(Env::prefixed("MIRAGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SimulationConfig> {
        let config: SimulationConfig = Figment::new()
            .merge(Serialized::defaults(SimulationConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &SimulationConfig) -> Result<(), ConfigError> {
        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidMaxIterations(config.max_iterations));
        }

        if config.concurrency == 0 || config.concurrency > 64 {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.retry.base_backoff_ms == 0 {
            return Err(ConfigError::InvalidBackoff(config.retry.base_backoff_ms));
        }

        if config.micro_steps == 0 {
            return Err(ConfigError::InvalidMicroSteps(config.micro_steps));
        }

        if config.step_timeout_ms == 0 {
            return Err(ConfigError::InvalidStepTimeout(config.step_timeout_ms));
        }

        Ok(())
    }
}
