//! Built-in task decomposition.
//!
//! The orchestration loop asks a [`DecompositionProvider`] for candidate
//! tasks when an objective has none. `TemplateDecomposer` is the default
//! provider: heuristic phase templates sized by objective complexity.
//! An external collaborator may replace it; on provider error the loop
//! falls back here transparently.

use async_trait::async_trait;

use crate::domain::models::{InsightCategory, LearningInsight, Objective};
use crate::domain::ports::{DecompositionProvider, TaskBlueprint};

/// Per-complexity-point duration used to size phase estimates.
const PHASE_UNIT_MS: u64 = 1_500;

/// Heuristic phase-template decomposer.
///
/// Produces a plan/implement/verify/review pipeline whose implementation
/// breadth grows with objective complexity. Recent timing insights that
/// report overruns inflate every estimate by a margin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDecomposer;

impl TemplateDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Number of parallel implementation tasks for a complexity.
    fn implementation_breadth(complexity: u8) -> usize {
        (usize::from(complexity) / 4 + 1).min(3)
    }

    /// Estimate for one phase: complexity-weighted base scaled by an
    /// overrun margin learned from recent timing insights.
    fn phase_estimate(complexity: u8, weight: f64, overrun_margin: f64) -> u64 {
        let base = u64::from(complexity.max(1)) * PHASE_UNIT_MS;
        ((base as f64 * weight * overrun_margin).round() as u64).max(1)
    }

    /// Inflation factor from recent timing insights reporting overruns.
    fn overrun_margin(insights: &[LearningInsight]) -> f64 {
        let overruns = insights
            .iter()
            .filter(|i| i.category == InsightCategory::Timing && i.insight.contains("over"))
            .count();
        match overruns {
            0 => 1.0,
            1 => 1.1,
            _ => 1.2,
        }
    }

    /// Build the phase blueprint batch for one objective.
    pub fn plan(&self, objective: &Objective, insights: &[LearningInsight]) -> Vec<TaskBlueprint> {
        let complexity = objective.complexity;
        let margin = Self::overrun_margin(insights);
        let mut batch = Vec::new();

        // Phase 1: analysis, no dependencies.
        batch.push(
            TaskBlueprint::new(
                format!("Analyze requirements for '{}'", objective.title),
                format!("Break down what '{}' needs before work starts", objective.title),
            )
            .with_priority(9)
            .with_complexity(complexity.saturating_sub(2).max(1))
            .with_estimated_duration_ms(Self::phase_estimate(complexity, 0.6, margin)),
        );

        // Phase 2: design, gated on analysis.
        batch.push(
            TaskBlueprint::new(
                format!("Design approach for '{}'", objective.title),
                "Settle structure and interfaces for the work ahead".to_string(),
            )
            .with_priority(8)
            .with_complexity(complexity.saturating_sub(1).max(1))
            .with_estimated_duration_ms(Self::phase_estimate(complexity, 0.8, margin))
            .with_dependency(0),
        );

        // Phase 3: implementation, breadth grows with complexity. All
        // gated on design, independent of each other.
        let breadth = Self::implementation_breadth(complexity);
        let first_impl = batch.len();
        for part in 1..=breadth {
            let title = if breadth == 1 {
                format!("Implement core work for '{}'", objective.title)
            } else {
                format!("Implement part {part}/{breadth} of '{}'", objective.title)
            };
            batch.push(
                TaskBlueprint::new(title, "Carry out the planned work".to_string())
                    .with_priority(8)
                    .with_complexity(complexity)
                    .with_estimated_duration_ms(Self::phase_estimate(complexity, 1.0, margin))
                    .with_dependency(1),
            );
        }

        // Phase 4: verification, gated on every implementation task.
        let mut verify = TaskBlueprint::new(
            format!("Verify results for '{}'", objective.title),
            "Test the delivered work against the objective".to_string(),
        )
        .with_priority(7)
        .with_complexity(complexity.saturating_sub(1).max(1))
        .with_estimated_duration_ms(Self::phase_estimate(complexity, 0.7, margin));
        for index in first_impl..first_impl + breadth {
            verify = verify.with_dependency(index);
        }
        let verify_index = batch.len();
        batch.push(verify);

        // Phase 5: review and wrap-up.
        batch.push(
            TaskBlueprint::new(
                format!("Review and finalize '{}'", objective.title),
                "Close out the objective and record outcomes".to_string(),
            )
            .with_priority(6)
            .with_complexity(complexity.saturating_sub(2).max(1))
            .with_estimated_duration_ms(Self::phase_estimate(complexity, 0.5, margin))
            .with_dependency(verify_index),
        );

        batch
    }
}

#[async_trait]
impl DecompositionProvider for TemplateDecomposer {
    async fn decompose(
        &self,
        objective: &Objective,
        insights: &[LearningInsight],
    ) -> anyhow::Result<Vec<TaskBlueprint>> {
        Ok(self.plan(objective, insights))
    }
}
