//! Execution engine: drives one task through a bounded plan of
//! simulated steps.
//!
//! A task execution is a sequence of 3-10 steps sized by complexity.
//! Steps run as micro-progress increments with per-step jitter, adaptive
//! plan mutation on timing variance, simulated failures with a bounded
//! single-step retry, and whole-task retries with exponential backoff.
//! Cancellation is observed at every suspension point and unwinds the
//! task back to pending without marking it failed.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::models::{SimulationConfig, Task, TaskStatus};
use crate::domain::ports::RandomSource;
use crate::services::event_bus::{EventBus, EventSeverity, SimEvent};

/// Per-attempt execution records kept after terminal transitions.
const MAX_HISTORY: usize = 64;

/// Interior step names, cycled as the plan grows with complexity.
const STEP_NAMES: [&str; 8] = [
    "Analysis",
    "Preparation",
    "Core implementation",
    "Refinement",
    "Validation",
    "Integration",
    "Optimization",
    "Review",
];

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Micro-progress increments per step.
    pub micro_steps: u32,
    /// Absolute ceiling for a single step, in milliseconds.
    pub step_timeout_ms: u64,
    /// Maximum dispatch attempts per task.
    pub max_attempts: u32,
    /// Base backoff delay, doubled per attempt.
    pub base_backoff_ms: u64,
}

impl From<&SimulationConfig> for EngineConfig {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            micro_steps: config.micro_steps.max(1),
            step_timeout_ms: config.step_timeout_ms,
            max_attempts: config.retry.max_attempts.max(1),
            base_backoff_ms: config.retry.base_backoff_ms,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

/// One step of an execution plan.
#[derive(Debug, Clone)]
struct PlanStep {
    name: String,
    complexity: u8,
    duration_ms: u64,
    /// Adaptive steps are eligible for mid-plan modification and
    /// single-step retry.
    adaptive: bool,
}

/// A log entry recorded during an attempt.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub message: String,
}

/// Per-attempt execution state. Exists while a task is in progress and
/// moves to a bounded history on terminal transition.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub task_id: Uuid,
    pub attempt: u32,
    pub current_step: String,
    pub progress: u8,
    pub log: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    fn new(task_id: Uuid, attempt: u32) -> Self {
        Self {
            task_id,
            attempt,
            current_step: String::new(),
            progress: 0,
            log: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    fn log(&mut self, severity: EventSeverity, message: impl Into<String>) {
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        });
    }
}

/// Terminal result of driving one task.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// All steps succeeded; task is `Completed`.
    Completed(Task),
    /// Attempt budget exhausted; task is `Failed`.
    Failed(Task),
    /// Cancellation observed; task is back to `Pending`.
    Canceled(Task),
}

impl ExecutionOutcome {
    pub fn task(&self) -> &Task {
        match self {
            Self::Completed(t) | Self::Failed(t) | Self::Canceled(t) => t,
        }
    }

    pub fn into_task(self) -> Task {
        match self {
            Self::Completed(t) | Self::Failed(t) | Self::Canceled(t) => t,
        }
    }

    /// Whether the task reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Canceled(_))
    }
}

enum StepOutcome {
    Completed { actual_ms: u64 },
    Failed,
    Canceled,
}

enum AttemptResult {
    Completed { steps: usize },
    Aborted { reason: String },
    Canceled,
}

/// Engine that simulates multi-step task execution.
pub struct ExecutionEngine {
    config: RwLock<EngineConfig>,
    events: Arc<EventBus>,
    rng: Mutex<Box<dyn RandomSource>>,
    history: Mutex<VecDeque<ExecutionRecord>>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, events: Arc<EventBus>, rng: Box<dyn RandomSource>) -> Self {
        Self {
            config: RwLock::new(config),
            events,
            rng: Mutex::new(rng),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Replace the engine configuration. Applies to dispatches that
    /// start after the swap; an in-flight execution keeps its snapshot.
    pub async fn set_config(&self, config: EngineConfig) {
        *self.config.write().await = config;
    }

    /// Plan size for a given complexity: `max(3, min(10, complexity+2))`.
    fn step_count(complexity: u8) -> usize {
        (usize::from(complexity) + 2).clamp(3, 10)
    }

    /// Deterministic complexity factor in [0.8, 1.2].
    fn complexity_factor(complexity: u8) -> f64 {
        0.8 + (f64::from(complexity) / 10.0) * 0.4
    }

    /// Simulated failure probability, rising with complexity and
    /// attempt count, capped at 30%.
    fn failure_probability(complexity: u8, attempt: u32) -> f64 {
        let base = f64::from(complexity) * 0.02;
        let retries = f64::from(attempt.saturating_sub(1)) * 0.05;
        (base + retries).min(0.30)
    }

    /// Build an execution plan for one attempt.
    ///
    /// First and last steps are fixed with reduced effective complexity;
    /// interior steps inherit full complexity and are adaptive.
    async fn build_plan(&self, task: &Task) -> Vec<PlanStep> {
        let count = Self::step_count(task.complexity);
        let base = (task.estimated_duration_ms / count as u64).max(1);
        let mut rng = self.rng.lock().await;

        let mut steps = Vec::with_capacity(count);
        for index in 0..count {
            let (name, complexity, adaptive) = if index == 0 {
                ("Initialization".to_string(), task.complexity.saturating_sub(3).max(1), false)
            } else if index == count - 1 {
                ("Finalization".to_string(), task.complexity.saturating_sub(2).max(1), false)
            } else {
                let name = STEP_NAMES[(index - 1) % STEP_NAMES.len()].to_string();
                (name, task.complexity, true)
            };

            let jitter = rng.next_range(0.7, 1.3);
            let duration =
                (base as f64 * Self::complexity_factor(complexity) * jitter).round() as u64;
            steps.push(PlanStep {
                name,
                complexity,
                duration_ms: duration.max(1),
                adaptive,
            });
        }
        steps
    }

    /// Drive one task to a terminal state (or unwind on cancellation).
    ///
    /// The task must already be `InProgress` for its first attempt; the
    /// caller marks it synchronously at dispatch so no two executions
    /// can claim the same task.
    pub async fn execute(&self, mut task: Task, cancel: CancellationToken) -> ExecutionOutcome {
        debug_assert_eq!(task.status, TaskStatus::InProgress);
        let config = self.config.read().await.clone();
        let wall_start = Instant::now();

        loop {
            let attempt = task.attempts;
            self.events.publish(SimEvent::TaskStarted {
                task_id: task.id,
                title: task.title.clone(),
                attempt,
            });

            match self.run_attempt(&mut task, attempt, &config, &cancel).await {
                AttemptResult::Completed { steps } => {
                    let elapsed = (wall_start.elapsed().as_millis() as u64).max(1);
                    let efficiency = task.estimated_duration_ms as f64 / elapsed as f64;
                    task.actual_duration_ms = Some(elapsed);
                    task.result = Some(format!(
                        "Completed {steps} steps in {elapsed} ms (efficiency ratio {efficiency:.2})"
                    ));
                    if let Err(reason) = task.transition_to(TaskStatus::Completed) {
                        tracing::error!(task_id = %task.id, %reason, "terminal transition rejected");
                    }
                    self.events.publish(SimEvent::TaskCompleted {
                        task_id: task.id,
                        actual_duration_ms: elapsed,
                        efficiency,
                    });
                    return ExecutionOutcome::Completed(task);
                }
                AttemptResult::Canceled => {
                    if let Err(reason) = task.transition_to(TaskStatus::Pending) {
                        tracing::error!(task_id = %task.id, %reason, "cancel unwind rejected");
                    }
                    return ExecutionOutcome::Canceled(task);
                }
                AttemptResult::Aborted { reason } => {
                    tracing::warn!(task_id = %task.id, attempt, %reason, "task attempt aborted");

                    if attempt >= config.max_attempts {
                        let elapsed = (wall_start.elapsed().as_millis() as u64).max(1);
                        task.actual_duration_ms = Some(elapsed);
                        task.result =
                            Some(format!("Failed after {attempt} attempts: {reason}"));
                        if let Err(reason) = task.transition_to(TaskStatus::Failed) {
                            tracing::error!(task_id = %task.id, %reason, "terminal transition rejected");
                        }
                        self.events.publish(SimEvent::TaskFailed {
                            task_id: task.id,
                            reason,
                            attempts: attempt,
                        });
                        return ExecutionOutcome::Failed(task);
                    }

                    // Exponential backoff before the next dispatch.
                    let backoff_ms = config.base_backoff_ms << (attempt - 1);
                    if let Err(reason) = task.transition_to(TaskStatus::Pending) {
                        tracing::error!(task_id = %task.id, %reason, "retry reset rejected");
                    }
                    self.events.publish(SimEvent::TaskRetrying {
                        task_id: task.id,
                        attempt: attempt + 1,
                        max_attempts: config.max_attempts,
                        backoff_ms,
                    });

                    tokio::select! {
                        () = cancel.cancelled() => return ExecutionOutcome::Canceled(task),
                        () = sleep(Duration::from_millis(backoff_ms)) => {}
                    }

                    if let Err(reason) = task.transition_to(TaskStatus::InProgress) {
                        tracing::error!(task_id = %task.id, %reason, "re-dispatch rejected");
                        return ExecutionOutcome::Canceled(task);
                    }
                }
            }
        }
    }

    /// Run one whole-task attempt through its plan.
    async fn run_attempt(
        &self,
        task: &mut Task,
        attempt: u32,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        let mut plan = self.build_plan(task).await;
        let total = plan.len();
        let nominal = (task.estimated_duration_ms / total as u64).max(1);
        let mut record = ExecutionRecord::new(task.id, attempt);

        for index in 0..total {
            let step = plan[index].clone();
            record.current_step = step.name.clone();
            record.log(
                EventSeverity::Info,
                format!("Step {}/{} '{}' started", index + 1, total, step.name),
            );

            let outcome = match timeout(
                Duration::from_millis(config.step_timeout_ms),
                self.run_step(task, &step, index, total, attempt, config, cancel, &mut record),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    let reason = format!(
                        "Step '{}' exceeded the {} ms ceiling",
                        step.name, config.step_timeout_ms
                    );
                    record.log(EventSeverity::Error, reason.clone());
                    self.finish_record(record).await;
                    return AttemptResult::Aborted { reason };
                }
            };

            let actual_ms = match outcome {
                StepOutcome::Completed { actual_ms } => actual_ms,
                StepOutcome::Canceled => {
                    self.finish_record(record).await;
                    return AttemptResult::Canceled;
                }
                StepOutcome::Failed => {
                    if !step.adaptive {
                        let reason = format!("Step '{}' failed", step.name);
                        record.log(EventSeverity::Error, reason.clone());
                        self.finish_record(record).await;
                        return AttemptResult::Aborted { reason };
                    }

                    // Single-step retry: reduced complexity, stretched
                    // duration.
                    let retry_step = PlanStep {
                        complexity: step.complexity.saturating_sub(1).max(1),
                        duration_ms: step.duration_ms + step.duration_ms / 2,
                        ..step.clone()
                    };
                    record.log(
                        EventSeverity::Warning,
                        format!("Step '{}' failed, retrying at reduced complexity", step.name),
                    );
                    self.events.publish(SimEvent::ExecutionLog {
                        task_id: Some(task.id),
                        level: EventSeverity::Warning,
                        message: format!("Retrying step '{}' at reduced complexity", step.name),
                    });

                    match timeout(
                        Duration::from_millis(config.step_timeout_ms),
                        self.run_step(
                            task,
                            &retry_step,
                            index,
                            total,
                            attempt,
                            config,
                            cancel,
                            &mut record,
                        ),
                    )
                    .await
                    {
                        Ok(StepOutcome::Completed { actual_ms }) => actual_ms,
                        Ok(StepOutcome::Canceled) => {
                            self.finish_record(record).await;
                            return AttemptResult::Canceled;
                        }
                        Ok(StepOutcome::Failed) | Err(_) => {
                            let reason = format!("Step '{}' failed twice", step.name);
                            record.log(EventSeverity::Error, reason.clone());
                            self.finish_record(record).await;
                            return AttemptResult::Aborted { reason };
                        }
                    }
                }
            };

            record.log(
                EventSeverity::Info,
                format!("Step '{}' completed in {} ms", step.name, actual_ms),
            );

            // Timing-variance signal: a step running well over its
            // nominal share stretches the remaining plan.
            let variance = (actual_ms as f64 - nominal as f64).abs() / nominal as f64;
            if variance > 0.30 && actual_ms > nominal && index + 1 < total {
                let factor = actual_ms as f64 / nominal as f64;
                for later in &mut plan[index + 1..] {
                    later.duration_ms = ((later.duration_ms as f64) * factor).round() as u64;
                }
                let message = format!(
                    "Plan adapted after '{}': variance {:.0}%, remaining steps scaled by {:.2}",
                    step.name,
                    variance * 100.0,
                    factor
                );
                record.log(EventSeverity::Warning, message.clone());
                self.events.publish(SimEvent::ExecutionLog {
                    task_id: Some(task.id),
                    level: EventSeverity::Warning,
                    message,
                });
            }
        }

        self.finish_record(record).await;
        AttemptResult::Completed { steps: total }
    }

    /// Run one step as micro-progress increments.
    #[allow(clippy::too_many_arguments)]
    async fn run_step(
        &self,
        task: &mut Task,
        step: &PlanStep,
        index: usize,
        total: usize,
        attempt: u32,
        config: &EngineConfig,
        cancel: &CancellationToken,
        record: &mut ExecutionRecord,
    ) -> StepOutcome {
        let micro = u64::from(config.micro_steps.max(1));
        let slice = Duration::from_millis((step.duration_ms / micro).max(1));

        for m in 1..=micro {
            if cancel.is_cancelled() {
                record.log(EventSeverity::Info, "Cancellation observed, unwinding");
                return StepOutcome::Canceled;
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    record.log(EventSeverity::Info, "Cancellation observed, unwinding");
                    return StepOutcome::Canceled;
                }
                () = sleep(slice) => {}
            }

            let fraction = (index as f64 + m as f64 / micro as f64) / total as f64;
            let progress = (fraction * 100.0).round().min(100.0) as u8;
            task.progress = progress;
            record.progress = progress;
            self.events.publish(SimEvent::TaskProgress {
                task_id: task.id,
                progress,
                current_step: step.name.clone(),
            });
        }

        let probability = Self::failure_probability(step.complexity, attempt);
        let sample = self.rng.lock().await.next_f64();
        if sample < probability {
            record.log(
                EventSeverity::Warning,
                format!("Step '{}' hit a simulated failure", step.name),
            );
            return StepOutcome::Failed;
        }

        StepOutcome::Completed {
            actual_ms: step.duration_ms,
        }
    }

    async fn finish_record(&self, mut record: ExecutionRecord) {
        record.ended_at = Some(Utc::now());
        let mut history = self.history.lock().await;
        if history.len() >= MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Recent per-attempt execution records, oldest first.
    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.history.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rng::ScriptedRandom;

    fn engine_with(rng: ScriptedRandom) -> (Arc<EventBus>, ExecutionEngine) {
        let events = Arc::new(EventBus::default());
        let engine = ExecutionEngine::new(EngineConfig::default(), events.clone(), Box::new(rng));
        (events, engine)
    }

    fn dispatched_task(complexity: u8, estimate: u64) -> Task {
        let mut task = Task::new(Uuid::new_v4(), "Engine test task", "desc")
            .with_complexity(complexity)
            .with_estimated_duration_ms(estimate);
        task.transition_to(TaskStatus::InProgress).unwrap();
        task
    }

    #[test]
    fn test_step_count_bounds() {
        assert_eq!(ExecutionEngine::step_count(1), 3);
        assert_eq!(ExecutionEngine::step_count(3), 5);
        assert_eq!(ExecutionEngine::step_count(8), 10);
        assert_eq!(ExecutionEngine::step_count(10), 10);
    }

    #[test]
    fn test_failure_probability_capped() {
        assert!(ExecutionEngine::failure_probability(10, 10) <= 0.30);
        assert!(
            ExecutionEngine::failure_probability(5, 2)
                > ExecutionEngine::failure_probability(5, 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_shape() {
        let (_events, engine) = engine_with(ScriptedRandom::always(0.5));
        let task = dispatched_task(6, 8_000);
        let plan = engine.build_plan(&task).await;

        assert_eq!(plan.len(), 8);
        assert_eq!(plan[0].name, "Initialization");
        assert_eq!(plan[0].complexity, 3); // 6 - 3
        assert!(!plan[0].adaptive);
        assert_eq!(plan.last().unwrap().name, "Finalization");
        assert_eq!(plan.last().unwrap().complexity, 4); // 6 - 2
        assert!(!plan.last().unwrap().adaptive);
        assert!(plan[1..7].iter().all(|s| s.adaptive && s.complexity == 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_execution() {
        let (_events, engine) = engine_with(ScriptedRandom::always(0.99));
        let task = dispatched_task(4, 6_000);

        let outcome = engine.execute(task, CancellationToken::new()).await;
        let task = match outcome {
            ExecutionOutcome::Completed(task) => task,
            other => panic!("expected completion, got {other:?}"),
        };

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        assert_eq!(task.attempts, 1);
        assert!(task.actual_duration_ms.unwrap() > 0);
        assert!(task.result.unwrap().contains("efficiency ratio"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhaustion() {
        // Fallback 0.0 forces every failure sample under the threshold;
        // the first step is non-adaptive so each attempt aborts at once.
        let (events, engine) = engine_with(ScriptedRandom::always(0.0));
        let mut rx = events.subscribe();
        let task = dispatched_task(5, 4_000);

        let outcome = engine.execute(task, CancellationToken::new()).await;
        let task = match outcome {
            ExecutionOutcome::Failed(task) => task,
            other => panic!("expected failure, got {other:?}"),
        };

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 3); // exactly max_attempts
        assert!(task.result.unwrap().contains("Failed after 3 attempts"));

        let mut retry_backoffs = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if let SimEvent::TaskRetrying { backoff_ms, .. } = envelope.event {
                retry_backoffs.push(backoff_ms);
            }
        }
        assert_eq!(retry_backoffs, vec![500, 1_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_monotonic_within_attempt() {
        let (events, engine) = engine_with(ScriptedRandom::always(0.99));
        let mut rx = events.subscribe();
        let task = dispatched_task(7, 9_000);
        let task_id = task.id;

        let outcome = engine.execute(task, CancellationToken::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Completed(_)));

        let mut last = 0u8;
        let mut seen = 0usize;
        while let Ok(envelope) = rx.try_recv() {
            if let SimEvent::TaskProgress { task_id: id, progress, .. } = envelope.event {
                assert_eq!(id, task_id);
                assert!(progress >= last, "progress regressed: {last} -> {progress}");
                last = progress;
                seen += 1;
            }
        }
        assert!(seen >= 10);
        assert_eq!(last, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_task_to_pending() {
        let (_events, engine) = engine_with(ScriptedRandom::always(0.99));
        let task = dispatched_task(5, 60_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine.execute(task, cancel).await;
        let task = match outcome {
            ExecutionOutcome::Canceled(task) => task,
            other => panic!("expected cancellation, got {other:?}"),
        };

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_aborts_attempt() {
        // Estimate so large that one step exceeds the 5 minute ceiling.
        let (_events, engine) = engine_with(ScriptedRandom::always(0.99));
        let task = dispatched_task(1, 3 * 400_000);

        let outcome = engine.execute(task, CancellationToken::new()).await;
        let task = match outcome {
            ExecutionOutcome::Failed(task) => task,
            other => panic!("expected timeout failure, got {other:?}"),
        };

        assert_eq!(task.attempts, 3); // timeouts count against the budget
        assert!(task.result.unwrap().contains("ceiling"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_step_retry_recovers() {
        // Jitter samples come first (one per plan step), then failure
        // samples. Complexity 1 gives a 3-step plan. Script: three
        // jitter draws at 0.5, step 1 passes (0.9), step 2 fails (0.0)
        // then passes on its reduced-complexity retry (0.9), step 3
        // passes (0.9).
        let rng = ScriptedRandom::new([0.5, 0.5, 0.5, 0.9, 0.0, 0.9, 0.9], 0.99);
        let (_events, engine) = engine_with(rng);
        let task = dispatched_task(1, 3_000);

        let outcome = engine.execute(task, CancellationToken::new()).await;
        let task = match outcome {
            ExecutionOutcome::Completed(task) => task,
            other => panic!("expected recovery, got {other:?}"),
        };

        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.attempts, 1);

        let history = engine.history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0]
            .log
            .iter()
            .any(|entry| entry.message.contains("reduced complexity")));
    }
}
