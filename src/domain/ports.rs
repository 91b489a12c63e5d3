//! Ports (trait seams) for the simulation core.
//!
//! Two things are injectable: the decomposition source (an external AI
//! collaborator may replace the built-in templates) and the
//! pseudo-random source (seedable so tests can force deterministic
//! pass/fail sequences).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{LearningInsight, Objective};

/// A candidate task produced by decomposition, before ids exist.
///
/// `depends_on` holds indices into the same batch; the orchestrator maps
/// them to real task ids on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBlueprint {
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub complexity: u8,
    pub estimated_duration_ms: u64,
    pub depends_on: Vec<usize>,
}

impl TaskBlueprint {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority: 5,
            complexity: 5,
            estimated_duration_ms: 5_000,
            depends_on: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity.clamp(1, 10);
        self
    }

    pub fn with_estimated_duration_ms(mut self, estimate: u64) -> Self {
        self.estimated_duration_ms = estimate.max(1);
        self
    }

    pub fn with_dependency(mut self, index: usize) -> Self {
        if !self.depends_on.contains(&index) {
            self.depends_on.push(index);
        }
        self
    }
}

/// Pluggable decomposition source.
///
/// The orchestration loop calls this once per objective that has no
/// tasks yet. Errors are absorbed: the loop falls back to the built-in
/// template generator transparently.
#[async_trait]
pub trait DecompositionProvider: Send + Sync {
    /// Produce candidate tasks for an objective. Recent insights are
    /// provided so an external provider can bias its output.
    async fn decompose(
        &self,
        objective: &Objective,
        insights: &[LearningInsight],
    ) -> anyhow::Result<Vec<TaskBlueprint>>;
}

/// Injectable pseudo-random source.
///
/// All stochastic behavior (step jitter, simulated failures) samples
/// through this trait so tests can script exact sequences.
pub trait RandomSource: Send {
    /// Uniform sample in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform sample in `[lo, hi)`.
    fn next_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}
