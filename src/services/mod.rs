//! Service layer: the cooperating pieces of the simulation core.

pub mod decomposition;
pub mod dependency_resolver;
pub mod event_bus;
pub mod execution_engine;
pub mod learning_system;
pub mod rng;
pub mod task_graph;

pub use decomposition::TemplateDecomposer;
pub use dependency_resolver::{DependencyResolver, MissingDependency, Resolution};
pub use event_bus::{EventBus, EventEnvelope, EventSeverity, SequenceNumber, SimEvent};
pub use execution_engine::{EngineConfig, ExecutionEngine, ExecutionOutcome, ExecutionRecord};
pub use learning_system::{LearningSystem, PatternKey, PatternStats, TaskType};
pub use rng::{ScriptedRandom, SeededRandom};
pub use task_graph::TaskGraph;
