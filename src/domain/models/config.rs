//! Simulation configuration models.

use serde::{Deserialize, Serialize};

/// Simulation speed, mapped to the base inter-iteration delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationSpeed {
    Slow,
    Normal,
    Fast,
}

impl Default for SimulationSpeed {
    fn default() -> Self {
        Self::Normal
    }
}

impl SimulationSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "slow" => Some(Self::Slow),
            "normal" => Some(Self::Normal),
            "fast" => Some(Self::Fast),
            _ => None,
        }
    }

    /// Base delay between orchestration iterations, in simulated
    /// milliseconds.
    pub fn iteration_delay_ms(&self) -> u64 {
        match self {
            Self::Slow => 3_000,
            Self::Normal => 2_000,
            Self::Fast => 1_000,
        }
    }
}

/// Retry policy for task execution attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum dispatch attempts per task
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_backoff_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

/// Main configuration structure for the simulation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SimulationConfig {
    /// Iteration ceiling per objective
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Simulation speed (drives inter-iteration delay)
    #[serde(default)]
    pub speed: SimulationSpeed,

    /// Maximum concurrently executing tasks per objective
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Micro-progress increments per execution step
    #[serde(default = "default_micro_steps")]
    pub micro_steps: u32,

    /// Absolute ceiling for a single step execution, in milliseconds
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Seed for the pseudo-random source; `None` draws from entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

const fn default_max_iterations() -> u32 {
    10
}

const fn default_concurrency() -> usize {
    3
}

const fn default_micro_steps() -> u32 {
    10
}

const fn default_step_timeout_ms() -> u64 {
    300_000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            speed: SimulationSpeed::default(),
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            micro_steps: default_micro_steps(),
            step_timeout_ms: default_step_timeout_ms(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_backoff_ms, 500);
        assert_eq!(config.micro_steps, 10);
        assert_eq!(config.step_timeout_ms, 300_000);
        assert_eq!(config.speed, SimulationSpeed::Normal);
    }

    #[test]
    fn test_speed_delays() {
        assert_eq!(SimulationSpeed::Slow.iteration_delay_ms(), 3_000);
        assert_eq!(SimulationSpeed::Normal.iteration_delay_ms(), 2_000);
        assert_eq!(SimulationSpeed::Fast.iteration_delay_ms(), 1_000);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"speed":"fast"}"#).unwrap();
        assert_eq!(config.speed, SimulationSpeed::Fast);
        assert_eq!(config.concurrency, 3);
    }
}
