//! Mirage - Simulated-Agent Execution Core
//!
//! Mirage decomposes objectives into dependency-aware task graphs and
//! drives them through a simulated, learning execution loop: decompose,
//! resolve the executable frontier, execute with adaptive retries and
//! plan mutation, mine insights, assess completion.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic and domain models
//! - **Application Layer** (`application`): The orchestration loop
//! - **Service Layer** (`services`): Resolver, engine, learning, events
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading
//!
//! # Example
//!
//! ```ignore
//! use mirage::application::Orchestrator;
//! use mirage::domain::models::{ObjectiveDraft, SimulationConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::new(SimulationConfig::default());
//!     let id = orchestrator
//!         .add_objective(ObjectiveDraft::new("Ship it", "End to end", 5))
//!         .await?;
//!     orchestrator.start(id).await?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::Orchestrator;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    InsightCategory, LearningInsight, Objective, ObjectiveDraft, ObjectiveStatus, RetryConfig,
    SimulationConfig, SimulationSpeed, Task, TaskDraft, TaskStatus,
};
pub use domain::ports::{DecompositionProvider, RandomSource, TaskBlueprint};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DependencyResolver, EventBus, EventEnvelope, EventSeverity, ExecutionEngine, ExecutionOutcome,
    LearningSystem, SimEvent, TemplateDecomposer,
};
