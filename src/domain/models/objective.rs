//! Objective domain model.
//!
//! Objectives are top-level goals the simulation decomposes into tasks.
//! They own an ordered list of task ids (insertion order = creation order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    /// Objective is defined but the loop has not started
    Pending,
    /// The orchestration loop is driving this objective
    InProgress,
    /// Completion threshold reached
    Completed,
    /// Iteration ceiling reached without completion
    Failed,
}

impl Default for ObjectiveStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ObjectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state. Terminal objectives are
    /// immutable except for external audit fields.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        matches!(
            (self, new_status),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

/// A top-level goal decomposed into tasks by the orchestration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Detailed description
    pub description: String,
    /// Complexity (1-10, drives decomposition breadth)
    pub complexity: u8,
    /// Current status
    pub status: ObjectiveStatus,
    /// Owned task ids in creation order
    pub task_ids: Vec<Uuid>,
    /// Free-text result summary, set on completion or failure
    pub result: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When the objective reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl Objective {
    /// Create a new pending objective. Complexity is clamped to 1-10.
    pub fn new(title: impl Into<String>, description: impl Into<String>, complexity: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            complexity: complexity.clamp(1, 10),
            status: ObjectiveStatus::default(),
            task_ids: Vec::new(),
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record ownership of a task. Keeps insertion order.
    pub fn adopt_task(&mut self, task_id: Uuid) {
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
        }
    }

    pub fn can_transition_to(&self, new_status: ObjectiveStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to new status, stamping completion time on terminal
    /// states.
    pub fn transition_to(&mut self, new_status: ObjectiveStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate objective invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Objective title cannot be empty".to_string());
        }
        if !(1..=10).contains(&self.complexity) {
            return Err(format!(
                "Objective complexity {} out of range 1-10",
                self.complexity
            ));
        }
        Ok(())
    }
}

/// Payload for creating an objective from outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveDraft {
    pub title: String,
    pub description: String,
    #[serde(default = "default_complexity")]
    pub complexity: u8,
}

const fn default_complexity() -> u8 {
    5
}

impl ObjectiveDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>, complexity: u8) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            complexity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_creation_clamps_complexity() {
        let objective = Objective::new("Ship feature", "Ship the feature end to end", 14);
        assert_eq!(objective.complexity, 10);
        assert_eq!(objective.status, ObjectiveStatus::Pending);
    }

    #[test]
    fn test_objective_transitions() {
        let mut objective = Objective::new("Goal", "Description", 5);

        assert!(objective.transition_to(ObjectiveStatus::Completed).is_err());
        objective.transition_to(ObjectiveStatus::InProgress).unwrap();
        objective.transition_to(ObjectiveStatus::Completed).unwrap();
        assert!(objective.completed_at.is_some());
        assert!(objective.is_terminal());

        // Terminal objectives are immutable
        assert!(objective.transition_to(ObjectiveStatus::InProgress).is_err());
    }

    #[test]
    fn test_adopt_task_preserves_order_and_dedupes() {
        let mut objective = Objective::new("Goal", "Description", 5);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        objective.adopt_task(a);
        objective.adopt_task(b);
        objective.adopt_task(a);
        assert_eq!(objective.task_ids, vec![a, b]);
    }
}
