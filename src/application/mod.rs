//! Application layer: the orchestration loop over the service layer.

pub mod orchestrator;

pub use orchestrator::Orchestrator;
