//! Domain models for the simulation core.

pub mod config;
pub mod insight;
pub mod objective;
pub mod task;

pub use config::{RetryConfig, SimulationConfig, SimulationSpeed};
pub use insight::{InsightCategory, LearningInsight};
pub use objective::{Objective, ObjectiveDraft, ObjectiveStatus};
pub use task::{Task, TaskDraft, TaskStatus};
