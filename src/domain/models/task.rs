//! Task domain model.
//!
//! Tasks are discrete units of simulated work produced by objective
//! decomposition. They form a DAG with dependencies and carry the
//! estimates the learning system adjusts over time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::insight::LearningInsight;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but not yet dispatched
    Pending,
    /// Task is currently being executed
    InProgress,
    /// Task completed successfully
    Completed,
    /// Task failed after exhausting its attempt budget
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
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

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    ///
    /// `InProgress -> Pending` is the cancellation unwind; `Failed ->
    /// Pending` is a manual retry reset. Completed tasks are immutable.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::InProgress],
            Self::InProgress => vec![Self::Completed, Self::Failed, Self::Pending],
            Self::Completed => vec![],
            Self::Failed => vec![Self::Pending],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A discrete unit of simulated work with dependencies, priority, and
/// complexity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Owning objective
    pub objective_id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Detailed description
    pub description: String,
    /// Priority (1-10, higher runs first)
    pub priority: u8,
    /// Complexity (1-10, drives plan size and failure odds)
    pub complexity: u8,
    /// Current status
    pub status: TaskStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Estimated duration in simulated milliseconds
    pub estimated_duration_ms: u64,
    /// Actual duration, set only on terminal states
    pub actual_duration_ms: Option<u64>,
    /// Dispatch attempts so far
    pub attempts: u32,
    /// Task IDs this depends on
    pub depends_on: Vec<Uuid>,
    /// Result text from the execution engine
    pub result: Option<String>,
    /// Insight attached by the learning system, if any
    pub insight: Option<LearningInsight>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
    /// When execution first started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task owned by an objective.
    pub fn new(
        objective_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            objective_id,
            title: title.into(),
            description: description.into(),
            priority: 5,
            complexity: 5,
            status: TaskStatus::default(),
            progress: 0,
            estimated_duration_ms: 5_000,
            actual_duration_ms: None,
            attempts: 0,
            depends_on: Vec::new(),
            result: None,
            insight: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set priority (clamped to 1-10).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    /// Set complexity (clamped to 1-10).
    pub fn with_complexity(mut self, complexity: u8) -> Self {
        self.complexity = complexity.clamp(1, 10);
        self
    }

    /// Set the duration estimate.
    pub fn with_estimated_duration_ms(mut self, estimate: u64) -> Self {
        self.estimated_duration_ms = estimate.max(1);
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.depends_on.contains(&task_id) && task_id != self.id {
            self.depends_on.push(task_id);
        }
        self
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to new status, maintaining timestamps and counters.
    ///
    /// Dispatching (`-> InProgress`) increments the attempt counter.
    /// Resetting (`-> Pending`) clears progress so a future run starts
    /// clean. Completion forces progress to 100.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        self.updated_at = Utc::now();

        match new_status {
            TaskStatus::InProgress => {
                self.attempts += 1;
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            TaskStatus::Completed => {
                self.progress = 100;
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Failed => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending => {
                self.progress = 0;
            }
        }

        Ok(())
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate task invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if !(1..=10).contains(&self.priority) {
            return Err(format!("Task priority {} out of range 1-10", self.priority));
        }
        if !(1..=10).contains(&self.complexity) {
            return Err(format!(
                "Task complexity {} out of range 1-10",
                self.complexity
            ));
        }
        if self.depends_on.contains(&self.id) {
            return Err("Task cannot depend on itself".to_string());
        }
        Ok(())
    }
}

/// Payload for creating a task from outside the core (the `add_task`
/// surface). Dependency ids must reference tasks already in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    #[serde(default = "default_draft_level")]
    pub priority: u8,
    #[serde(default = "default_draft_level")]
    pub complexity: u8,
    #[serde(default = "default_draft_estimate")]
    pub estimated_duration_ms: u64,
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
}

const fn default_draft_level() -> u8 {
    5
}

const fn default_draft_estimate() -> u64 {
    5_000
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority: default_draft_level(),
            complexity: default_draft_level(),
            estimated_duration_ms: default_draft_estimate(),
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

    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if !self.depends_on.contains(&task_id) {
            self.depends_on.push(task_id);
        }
        self
    }

    /// Materialize the draft into a task owned by an objective.
    pub fn into_task(self, objective_id: Uuid) -> Task {
        let mut task = Task::new(objective_id, self.title, self.description)
            .with_priority(self.priority)
            .with_complexity(self.complexity)
            .with_estimated_duration_ms(self.estimated_duration_ms);
        for dep in self.depends_on {
            task = task.with_dependency(dep);
        }
        task
    }
}
