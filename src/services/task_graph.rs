//! In-memory task graph.
//!
//! Holds every task keyed by id with a stable insertion order. Insertion
//! is the admission point: validation and cycle detection run before the
//! graph is touched, so a rejected task never mutates state.

use std::collections::HashMap;

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskStatus};
use crate::services::dependency_resolver::DependencyResolver;

/// Task store with dependency-cycle admission checks.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: HashMap<Uuid, Task>,
    order: Vec<Uuid>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a task into the graph.
    ///
    /// Rejects with `ValidationFailed` on invariant violations and with
    /// `DependencyCycle` when the task's dependency chain loops back to
    /// itself. On rejection the graph is left untouched. Dependencies on
    /// ids not yet in the graph are allowed; the resolver reports them
    /// as missing until they appear.
    pub fn insert(&mut self, task: Task) -> DomainResult<()> {
        task.validate().map_err(DomainError::ValidationFailed)?;

        if self.tasks.contains_key(&task.id) {
            return Err(DomainError::ValidationFailed(format!(
                "Task {} already in graph",
                task.id
            )));
        }

        // Cycle check over the prospective graph (existing + candidate).
        let mut prospective: Vec<Task> = self.tasks.values().cloned().collect();
        prospective.push(task.clone());
        if let Some(path) = DependencyResolver::new().detect_cycle(&prospective) {
            return Err(DomainError::DependencyCycle(path));
        }

        self.order.push(task.id);
        self.tasks.insert(task.id, task);
        Ok(())
    }

    /// Replace an existing task (used for status write-backs).
    pub fn update(&mut self, task: Task) -> DomainResult<()> {
        if !self.tasks.contains_key(&task.id) {
            return Err(DomainError::TaskNotFound(task.id));
        }
        self.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.tasks.contains_key(&id)
    }

    /// All tasks for one objective, in insertion order.
    pub fn tasks_for(&self, objective_id: Uuid) -> Vec<&Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.objective_id == objective_id)
            .collect()
    }

    /// Count tasks for an objective matching a status.
    pub fn count_by_status(&self, objective_id: Uuid, status: TaskStatus) -> usize {
        self.tasks_for(objective_id)
            .iter()
            .filter(|t| t.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;

    #[test]
    fn test_insert_and_lookup() {
        let objective_id = Uuid::new_v4();
        let task = Task::new(objective_id, "First", "desc");
        let id = task.id;

        let mut graph = TaskGraph::new();
        graph.insert(task).unwrap();
        assert!(graph.contains(id));
        assert_eq!(graph.tasks_for(objective_id).len(), 1);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let objective_id = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let task = Task::new(objective_id, format!("t{i}"), "desc");
            ids.push(task.id);
            graph.insert(task).unwrap();
        }
        let stored: Vec<Uuid> = graph.tasks_for(objective_id).iter().map(|t| t.id).collect();
        assert_eq!(stored, ids);
    }

    #[test]
    fn test_cycle_rejected_without_mutation() {
        let objective_id = Uuid::new_v4();
        let mut a = Task::new(objective_id, "a", "desc");
        let b = Task::new(objective_id, "b", "desc").with_dependency(a.id);
        a.depends_on = vec![b.id];

        let mut graph = TaskGraph::new();
        graph.insert(b).unwrap();
        let before = graph.len();

        let err = graph.insert(a).unwrap_err();
        assert!(matches!(err, DomainError::DependencyCycle(_)));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_self_dependency_rejected() {
        let objective_id = Uuid::new_v4();
        let mut task = Task::new(objective_id, "selfish", "desc");
        let id = task.id;
        task.depends_on = vec![id];

        let mut graph = TaskGraph::new();
        assert!(graph.insert(task).is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_forward_dependency_allowed() {
        // Dependency on an id not yet in the graph is admitted; the
        // resolver reports it as missing until it appears.
        let objective_id = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        let task = Task::new(objective_id, "early", "desc").with_dependency(ghost);

        let mut graph = TaskGraph::new();
        assert!(graph.insert(task).is_ok());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let objective_id = Uuid::new_v4();
        let task = Task::new(objective_id, "dup", "desc");
        let mut graph = TaskGraph::new();
        graph.insert(task.clone()).unwrap();
        assert!(graph.insert(task).is_err());
    }

    #[test]
    fn test_objectives_are_scoped() {
        let obj_a = Uuid::new_v4();
        let obj_b = Uuid::new_v4();
        let mut graph = TaskGraph::new();
        graph.insert(Task::new(obj_a, "a", "desc")).unwrap();
        graph.insert(Task::new(obj_b, "b", "desc")).unwrap();

        assert_eq!(graph.tasks_for(obj_a).len(), 1);
        assert_eq!(graph.tasks_for(obj_b).len(), 1);
        assert_eq!(graph.len(), 2);
    }
}
