//! Domain errors for the simulation core.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors.
///
/// `DependencyCycle` is fatal for the insertion that caused it;
/// `MissingDependency` is non-fatal (the task stays pending and the
/// resolver reports it); `IterationsExhausted` is fatal for one
/// objective only.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Objective not found: {0}")]
    ObjectiveNotFound(Uuid),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Task dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Task {task} references unknown dependency {dependency}")]
    MissingDependency { task: Uuid, dependency: Uuid },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Objective {objective} exhausted its iteration ceiling of {iterations}")]
    IterationsExhausted { objective: Uuid, iterations: u32 },

    #[error("Simulation is already running for objective {0}")]
    SimulationAlreadyRunning(Uuid),
}

pub type DomainResult<T> = Result<T, DomainError>;
