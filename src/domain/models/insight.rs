//! Learning insight domain model.
//!
//! Insights are confidence-scored observations mined from execution
//! history. They are append-only: nothing mutates after creation except
//! the `applied` flag, flipped when the insight is folded into task
//! generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a learning insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    /// Execution approach should change (low efficiency, misestimated complexity)
    Strategy,
    /// Duration estimates are off
    Timing,
    /// Dependency structure caused trouble
    Dependencies,
    /// Priority assignment should change
    Priority,
}

impl InsightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Timing => "timing",
            Self::Dependencies => "dependencies",
            Self::Priority => "priority",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strategy" => Some(Self::Strategy),
            "timing" => Some(Self::Timing),
            "dependencies" => Some(Self::Dependencies),
            "priority" => Some(Self::Priority),
            _ => None,
        }
    }
}

impl std::fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A confidence-scored observation derived from one or more terminal
/// tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsight {
    /// Unique identifier
    pub id: Uuid,
    /// What kind of signal triggered this insight
    pub category: InsightCategory,
    /// Free-text observation
    pub insight: String,
    /// Strength of the triggering signal (0.0-1.0)
    pub confidence: f64,
    /// Whether this insight has been folded into task generation
    pub applied: bool,
    /// Task that triggered the insight, if any
    pub source_task_id: Option<Uuid>,
    /// When created
    pub created_at: DateTime<Utc>,
}

impl LearningInsight {
    /// Create a new unapplied insight. Confidence is clamped to [0, 1].
    pub fn new(category: InsightCategory, insight: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            insight: insight.into(),
            confidence: confidence.clamp(0.0, 1.0),
            applied: false,
            source_task_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the task that triggered this insight.
    pub fn with_source_task(mut self, task_id: Uuid) -> Self {
        self.source_task_id = Some(task_id);
        self
    }

    /// Mark the insight as folded into future task generation.
    pub fn mark_applied(&mut self) {
        self.applied = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_confidence_clamped() {
        let insight = LearningInsight::new(InsightCategory::Timing, "estimates run long", 1.4);
        assert!((insight.confidence - 1.0).abs() < f64::EPSILON);
        assert!(!insight.applied);
    }

    #[test]
    fn test_insight_applied_flag() {
        let mut insight =
            LearningInsight::new(InsightCategory::Strategy, "break work down further", 0.7);
        insight.mark_applied();
        assert!(insight.applied);
    }

    #[test]
    fn test_category_round_trip() {
        for category in [
            InsightCategory::Strategy,
            InsightCategory::Timing,
            InsightCategory::Dependencies,
            InsightCategory::Priority,
        ] {
            assert_eq!(InsightCategory::from_str(category.as_str()), Some(category));
        }
    }
}
