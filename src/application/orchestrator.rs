//! Orchestration loop.
//!
//! Drives one objective through iterations: decompose, resolve the
//! frontier, execute up to the concurrency limit, learn from terminal
//! tasks, assess completion. A single task failure never aborts the
//! loop; only the completion threshold or the iteration ceiling ends
//! it. Stopping the simulation unwinds in-flight tasks back to pending.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Objective, ObjectiveDraft, ObjectiveStatus, SimulationConfig, Task, TaskDraft, TaskStatus,
};
use crate::domain::ports::{DecompositionProvider, RandomSource};
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::event_bus::{EventBus, EventEnvelope, SimEvent};
use crate::services::execution_engine::{EngineConfig, ExecutionEngine, ExecutionOutcome};
use crate::services::learning_system::LearningSystem;
use crate::services::rng::SeededRandom;
use crate::services::task_graph::TaskGraph;
use crate::services::TemplateDecomposer;

/// Mutable simulation state guarded by one lock.
struct SimState {
    objectives: HashMap<Uuid, Objective>,
    graph: TaskGraph,
    learning: LearningSystem,
}

/// Owns the simulation loop and all in-process state.
///
/// One objective runs at a time; `start` drives the loop to a terminal
/// objective status and `stop` cancels cooperatively from another task.
pub struct Orchestrator {
    state: RwLock<SimState>,
    config: RwLock<SimulationConfig>,
    events: Arc<EventBus>,
    engine: Arc<ExecutionEngine>,
    resolver: DependencyResolver,
    provider: Option<Arc<dyn DecompositionProvider>>,
    templates: TemplateDecomposer,
    cancel: RwLock<CancellationToken>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator with the production random source, seeded
    /// from the configuration.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = Box::new(SeededRandom::new(config.seed));
        Self::with_random_source(config, rng)
    }

    /// Create an orchestrator with an explicit random source. Tests use
    /// this to script exact pass/fail sequences.
    pub fn with_random_source(config: SimulationConfig, rng: Box<dyn RandomSource>) -> Self {
        let events = Arc::new(EventBus::default());
        let engine = Arc::new(ExecutionEngine::new(
            EngineConfig::from(&config),
            Arc::clone(&events),
            rng,
        ));
        Self {
            state: RwLock::new(SimState {
                objectives: HashMap::new(),
                graph: TaskGraph::new(),
                learning: LearningSystem::new(),
            }),
            config: RwLock::new(config),
            events,
            engine,
            resolver: DependencyResolver::new(),
            provider: None,
            templates: TemplateDecomposer::new(),
            cancel: RwLock::new(CancellationToken::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Install an external decomposition provider. The built-in
    /// templates remain the fallback when the provider errors.
    pub fn with_provider(mut self, provider: Arc<dyn DecompositionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register a new objective. Returns its id.
    pub async fn add_objective(&self, draft: ObjectiveDraft) -> DomainResult<Uuid> {
        let objective = Objective::new(draft.title, draft.description, draft.complexity);
        objective.validate().map_err(DomainError::ValidationFailed)?;

        let id = objective.id;
        self.state.write().await.objectives.insert(id, objective);
        Ok(id)
    }

    /// Add a task to an objective's graph. Dependency ids may reference
    /// tasks not yet inserted; such tasks stay blocked until they appear.
    pub async fn add_task(&self, objective_id: Uuid, draft: TaskDraft) -> DomainResult<Uuid> {
        let mut state = self.state.write().await;
        let objective = state
            .objectives
            .get(&objective_id)
            .ok_or(DomainError::ObjectiveNotFound(objective_id))?;
        if objective.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "Objective {objective_id} is terminal, cannot add tasks"
            )));
        }

        let task = draft.into_task(objective_id);
        let id = task.id;
        state.graph.insert(task)?;
        if let Some(objective) = state.objectives.get_mut(&objective_id) {
            objective.adopt_task(id);
        }
        Ok(id)
    }

    /// Replace the runtime settings. The engine picks up retry and
    /// timeout changes on the next dispatch.
    pub async fn update_settings(&self, config: SimulationConfig) -> DomainResult<()> {
        if config.max_iterations == 0 {
            return Err(DomainError::ValidationFailed(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if config.concurrency == 0 {
            return Err(DomainError::ValidationFailed(
                "concurrency must be at least 1".to_string(),
            ));
        }

        self.engine.set_config(EngineConfig::from(&config)).await;
        *self.config.write().await = config;
        Ok(())
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub async fn objective(&self, id: Uuid) -> Option<Objective> {
        self.state.read().await.objectives.get(&id).cloned()
    }

    /// Snapshot of an objective's tasks, in creation order.
    pub async fn tasks(&self, objective_id: Uuid) -> Vec<Task> {
        self.state
            .read()
            .await
            .graph
            .tasks_for(objective_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Recent unapplied insights from the learning system.
    pub async fn recent_insights(&self, limit: usize) -> Vec<crate::domain::models::LearningInsight> {
        self.state.read().await.learning.recent_insights(limit)
    }

    /// Cooperatively stop the running simulation. In-flight tasks unwind
    /// to pending at their next suspension point.
    pub async fn stop(&self) {
        self.cancel.read().await.cancel();
        self.events.publish(SimEvent::SimulationStopped);
    }

    /// Drive one objective to a terminal status.
    ///
    /// Returns the final objective status, or `IterationsExhausted` once
    /// the ceiling is reached (the objective is marked failed first). A
    /// stopped simulation returns with the objective still in progress.
    pub async fn start(&self, objective_id: Uuid) -> DomainResult<ObjectiveStatus> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DomainError::SimulationAlreadyRunning(objective_id));
        }

        let cancel = {
            let mut guard = self.cancel.write().await;
            *guard = CancellationToken::new();
            guard.clone()
        };

        let result = self.drive(objective_id, cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn drive(
        &self,
        objective_id: Uuid,
        cancel: CancellationToken,
    ) -> DomainResult<ObjectiveStatus> {
        let title = {
            let mut state = self.state.write().await;
            let objective = state
                .objectives
                .get_mut(&objective_id)
                .ok_or(DomainError::ObjectiveNotFound(objective_id))?;
            if objective.is_terminal() {
                return Err(DomainError::InvalidStateTransition {
                    from: objective.status.as_str().to_string(),
                    to: ObjectiveStatus::InProgress.as_str().to_string(),
                    reason: "objective already reached a terminal state".to_string(),
                });
            }
            if objective.status == ObjectiveStatus::Pending {
                objective
                    .transition_to(ObjectiveStatus::InProgress)
                    .map_err(|reason| DomainError::InvalidStateTransition {
                        from: ObjectiveStatus::Pending.as_str().to_string(),
                        to: ObjectiveStatus::InProgress.as_str().to_string(),
                        reason,
                    })?;
            }
            objective.title.clone()
        };

        self.events.publish(SimEvent::ObjectiveStarted {
            objective_id,
            title,
        });
        tracing::info!(%objective_id, "objective loop started");

        let max_iterations = self.config.read().await.max_iterations;
        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Ok(ObjectiveStatus::InProgress);
            }

            self.events.publish(SimEvent::IterationStarted {
                objective_id,
                iteration,
                max_iterations,
            });

            self.ensure_tasks(objective_id).await?;
            let stopped = self.run_frontier(objective_id, &cancel).await;

            let (completed, total) = {
                let state = self.state.read().await;
                let tasks = state.graph.tasks_for(objective_id);
                let completed = tasks
                    .iter()
                    .filter(|t| t.status == TaskStatus::Completed)
                    .count();
                (completed, tasks.len())
            };
            self.events.publish(SimEvent::IterationCompleted {
                objective_id,
                iteration,
                tasks_completed: completed,
                tasks_total: total,
            });

            if stopped {
                tracing::info!(%objective_id, iteration, "simulation stopped mid-objective");
                return Ok(ObjectiveStatus::InProgress);
            }

            if self.completion_reached(objective_id).await {
                let result = format!("Completed {completed}/{total} tasks");
                {
                    let mut state = self.state.write().await;
                    if let Some(objective) = state.objectives.get_mut(&objective_id) {
                        objective.result = Some(result.clone());
                        if let Err(reason) = objective.transition_to(ObjectiveStatus::Completed) {
                            tracing::error!(%objective_id, %reason, "completion transition rejected");
                        }
                    }
                }
                self.events.publish(SimEvent::ObjectiveCompleted {
                    objective_id,
                    result,
                });
                tracing::info!(%objective_id, iteration, "objective completed");
                return Ok(ObjectiveStatus::Completed);
            }

            if iteration < max_iterations {
                let delay = self.config.read().await.speed.iteration_delay_ms();
                tokio::select! {
                    () = cancel.cancelled() => return Ok(ObjectiveStatus::InProgress),
                    () = sleep(Duration::from_millis(delay)) => {}
                }
            }
        }

        let reason = "maximum iterations reached".to_string();
        {
            let mut state = self.state.write().await;
            if let Some(objective) = state.objectives.get_mut(&objective_id) {
                objective.result = Some(reason.clone());
                if let Err(reason) = objective.transition_to(ObjectiveStatus::Failed) {
                    tracing::error!(%objective_id, %reason, "failure transition rejected");
                }
            }
        }
        self.events.publish(SimEvent::ObjectiveFailed {
            objective_id,
            reason,
        });
        Err(DomainError::IterationsExhausted {
            objective: objective_id,
            iterations: max_iterations,
        })
    }

    /// Decompose the objective when it owns no tasks yet.
    ///
    /// The external provider is tried first when installed; errors and
    /// empty batches fall back to the built-in templates transparently.
    async fn ensure_tasks(&self, objective_id: Uuid) -> DomainResult<()> {
        let (objective, insights) = {
            let state = self.state.read().await;
            let objective = state
                .objectives
                .get(&objective_id)
                .ok_or(DomainError::ObjectiveNotFound(objective_id))?;
            if !objective.task_ids.is_empty() {
                return Ok(());
            }
            (objective.clone(), state.learning.recent_insights(10))
        };

        let (blueprints, source) = match &self.provider {
            Some(provider) => match provider.decompose(&objective, &insights).await {
                Ok(batch) if !batch.is_empty() => (batch, "provider"),
                Ok(_) => (self.templates.plan(&objective, &insights), "templates"),
                Err(error) => {
                    tracing::warn!(%error, "decomposition provider failed, using templates");
                    (self.templates.plan(&objective, &insights), "templates")
                }
            },
            None => (self.templates.plan(&objective, &insights), "templates"),
        };

        let mut state = self.state.write().await;
        let mut batch_ids: Vec<Uuid> = Vec::with_capacity(blueprints.len());
        let mut inserted = 0usize;
        for mut blueprint in blueprints {
            state.learning.apply_feedback(&mut blueprint);

            let mut task = Task::new(objective_id, blueprint.title, blueprint.description)
                .with_priority(blueprint.priority)
                .with_complexity(blueprint.complexity)
                .with_estimated_duration_ms(blueprint.estimated_duration_ms);
            for &index in &blueprint.depends_on {
                if let Some(&dep_id) = batch_ids.get(index) {
                    task = task.with_dependency(dep_id);
                }
            }

            let id = task.id;
            match state.graph.insert(task) {
                Ok(()) => {
                    if let Some(objective) = state.objectives.get_mut(&objective_id) {
                        objective.adopt_task(id);
                    }
                    inserted += 1;
                }
                Err(error) => {
                    tracing::warn!(%error, "generated task rejected by graph");
                }
            }
            // Index positions must line up with the batch even when an
            // insert is rejected.
            batch_ids.push(id);
        }

        for insight in &insights {
            state.learning.mark_applied(insight.id);
        }

        self.events.publish(SimEvent::TasksGenerated {
            objective_id,
            count: inserted,
            source: source.to_string(),
        });
        Ok(())
    }

    /// Execute the objective's frontier until it drains.
    ///
    /// The resolver is re-queried after every completion so unblocked
    /// tasks enter immediately. Returns true when cancellation was
    /// observed.
    async fn run_frontier(&self, objective_id: Uuid, cancel: &CancellationToken) -> bool {
        let concurrency = self.config.read().await.concurrency.max(1);
        let mut active: JoinSet<ExecutionOutcome> = JoinSet::new();
        let mut reported_missing: HashSet<(Uuid, Uuid)> = HashSet::new();

        loop {
            if !cancel.is_cancelled() {
                let mut state = self.state.write().await;
                let resolution = self.resolver.resolve(&state.graph, objective_id);

                for missing in &resolution.missing {
                    if reported_missing.insert((missing.task_id, missing.dependency_id)) {
                        self.events.publish(SimEvent::TaskBlocked {
                            task_id: missing.task_id,
                            missing_dependency: missing.dependency_id,
                        });
                    }
                }

                for candidate in resolution.ready {
                    if active.len() >= concurrency {
                        break;
                    }
                    let Some(task) = state.graph.get_mut(candidate.id) else {
                        continue;
                    };
                    // Marking in-progress before any await is the
                    // lightweight lock: no second dispatch can claim
                    // this task.
                    if let Err(reason) = task.transition_to(TaskStatus::InProgress) {
                        tracing::warn!(task_id = %candidate.id, %reason, "dispatch rejected");
                        continue;
                    }
                    let snapshot = task.clone();
                    let engine = Arc::clone(&self.engine);
                    let token = cancel.child_token();
                    active.spawn(async move { engine.execute(snapshot, token).await });
                }
            }

            let Some(joined) = active.join_next().await else {
                return cancel.is_cancelled();
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(%error, "execution task join failed");
                    continue;
                }
            };

            let terminal = outcome.is_terminal();
            let mut task = outcome.into_task();

            let mut state = self.state.write().await;
            if terminal {
                let dependencies: Vec<Task> = task
                    .depends_on
                    .iter()
                    .filter_map(|id| state.graph.get(*id).cloned())
                    .collect();
                let insights = state.learning.process_task_completion(&task, &dependencies);
                task.insight = insights.first().cloned();
                for insight in &insights {
                    self.events.publish(SimEvent::InsightGenerated {
                        category: insight.category,
                        confidence: insight.confidence,
                        insight: insight.insight.clone(),
                    });
                }
            }
            if let Err(error) = state.graph.update(task) {
                tracing::error!(%error, "task write-back failed");
            }
        }
    }

    /// Completion policy: 80% of tasks completed, or every high-priority
    /// (>= 8) task completed when at least one exists.
    async fn completion_reached(&self, objective_id: Uuid) -> bool {
        let state = self.state.read().await;
        let tasks = state.graph.tasks_for(objective_id);
        if tasks.is_empty() {
            return false;
        }

        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        if completed * 5 >= tasks.len() * 4 {
            return true;
        }

        let critical: Vec<_> = tasks.iter().filter(|t| t.priority >= 8).collect();
        !critical.is_empty() && critical.iter().all(|t| t.status == TaskStatus::Completed)
    }
}
