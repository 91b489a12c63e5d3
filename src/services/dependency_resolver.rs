//! Dependency resolution for task graphs.
//!
//! Computes the executable frontier (pending tasks whose dependencies
//! are all completed) and detects circular dependencies before they
//! enter the graph.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::models::{Task, TaskStatus};
use crate::services::task_graph::TaskGraph;

/// A non-fatal report: a pending task references a dependency id that
/// is not in the graph. The task stays pending until the dependency
/// appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingDependency {
    pub task_id: Uuid,
    pub dependency_id: Uuid,
}

/// Result of one resolver query.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Executable frontier, ordered by descending priority, ties broken
    /// by ascending estimated duration (shorter jobs first).
    pub ready: Vec<Task>,
    /// Permanently blocked tasks, surfaced to the caller.
    pub missing: Vec<MissingDependency>,
}

/// Service for resolving task dependencies and detecting cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

// Standalone helper for cycle detection (no self needed)
fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Compute the executable frontier for one objective.
    ///
    /// Idempotent: two calls with no state change in between return an
    /// identical ordered list. Ordering within a query is priority desc,
    /// then estimated duration asc, then insertion order.
    pub fn resolve(&self, graph: &TaskGraph, objective_id: Uuid) -> Resolution {
        let mut resolution = Resolution::default();

        for task in graph.tasks_for(objective_id) {
            if task.status != TaskStatus::Pending {
                continue;
            }

            let mut runnable = true;
            for &dep_id in &task.depends_on {
                match graph.get(dep_id) {
                    Some(dep) if dep.status == TaskStatus::Completed => {}
                    Some(_) => {
                        runnable = false;
                    }
                    None => {
                        runnable = false;
                        resolution.missing.push(MissingDependency {
                            task_id: task.id,
                            dependency_id: dep_id,
                        });
                    }
                }
            }

            if runnable {
                resolution.ready.push(task.clone());
            }
        }

        // Stable sort keeps insertion order as the final tiebreak.
        resolution
            .ready
            .sort_by_key(|t| (Reverse(t.priority), t.estimated_duration_ms));
        resolution
    }

    /// Detect a circular dependency in a set of tasks.
    ///
    /// Returns the cycle path when one exists. Used by the graph before
    /// admitting a new task; a detected cycle rejects the insertion.
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph
                .entry(task.id)
                .or_default()
                .extend(task.depends_on.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        let mut roots: Vec<Uuid> = graph.keys().copied().collect();
        roots.sort();
        for task_id in roots {
            if !visited.contains(&task_id)
                && detect_cycle_util(task_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use proptest::prelude::*;

    fn graph_with(tasks: Vec<Task>) -> (TaskGraph, Uuid) {
        let objective_id = tasks.first().map_or_else(Uuid::new_v4, |t| t.objective_id);
        let mut graph = TaskGraph::new();
        for task in tasks {
            graph.insert(task).unwrap();
        }
        (graph, objective_id)
    }

    fn task(objective_id: Uuid, title: &str, priority: u8, estimate: u64) -> Task {
        Task::new(objective_id, title, "test")
            .with_priority(priority)
            .with_estimated_duration_ms(estimate)
    }

    #[test]
    fn test_empty_dependency_list_is_ready() {
        let objective_id = Uuid::new_v4();
        let (graph, _) = graph_with(vec![task(objective_id, "solo", 5, 1_000)]);
        let resolution = DependencyResolver::new().resolve(&graph, objective_id);
        assert_eq!(resolution.ready.len(), 1);
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_frontier_ordering_priority_then_duration() {
        let objective_id = Uuid::new_v4();
        let (graph, _) = graph_with(vec![
            task(objective_id, "low", 5, 1_000),
            task(objective_id, "high-slow", 9, 8_000),
            task(objective_id, "high-fast", 9, 2_000),
            task(objective_id, "mid", 7, 4_000),
        ]);

        let resolution = DependencyResolver::new().resolve(&graph, objective_id);
        let titles: Vec<&str> = resolution.ready.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["high-fast", "high-slow", "mid", "low"]);
    }

    #[test]
    fn test_incomplete_dependency_blocks() {
        let objective_id = Uuid::new_v4();
        let dep = task(objective_id, "dep", 5, 1_000);
        let dependent = task(objective_id, "dependent", 9, 1_000).with_dependency(dep.id);
        let (graph, _) = graph_with(vec![dep, dependent]);

        let resolution = DependencyResolver::new().resolve(&graph, objective_id);
        let titles: Vec<&str> = resolution.ready.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["dep"]);
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_completed_dependency_unblocks() {
        let objective_id = Uuid::new_v4();
        let mut dep = task(objective_id, "dep", 5, 1_000);
        dep.transition_to(crate::domain::models::TaskStatus::InProgress)
            .unwrap();
        dep.transition_to(crate::domain::models::TaskStatus::Completed)
            .unwrap();
        let dependent = task(objective_id, "dependent", 9, 1_000).with_dependency(dep.id);
        let (graph, _) = graph_with(vec![dep, dependent]);

        let resolution = DependencyResolver::new().resolve(&graph, objective_id);
        let titles: Vec<&str> = resolution.ready.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["dependent"]);
    }

    #[test]
    fn test_missing_dependency_reported_non_fatal() {
        let objective_id = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        let blocked = task(objective_id, "blocked", 9, 1_000).with_dependency(ghost);
        let blocked_id = blocked.id;
        let (graph, _) = graph_with(vec![blocked]);

        let resolution = DependencyResolver::new().resolve(&graph, objective_id);
        assert!(resolution.ready.is_empty());
        assert_eq!(
            resolution.missing,
            vec![MissingDependency {
                task_id: blocked_id,
                dependency_id: ghost
            }]
        );
        // Task stays pending
        assert_eq!(
            graph.get(blocked_id).unwrap().status,
            crate::domain::models::TaskStatus::Pending
        );
    }

    #[test]
    fn test_resolver_idempotent() {
        let objective_id = Uuid::new_v4();
        let (graph, _) = graph_with(vec![
            task(objective_id, "a", 9, 3_000),
            task(objective_id, "b", 9, 3_000),
            task(objective_id, "c", 2, 500),
        ]);

        let resolver = DependencyResolver::new();
        let first = resolver.resolve(&graph, objective_id);
        let second = resolver.resolve(&graph, objective_id);
        let ids = |r: &Resolution| r.ready.iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_detect_cycle_with_cycle() {
        let objective_id = Uuid::new_v4();
        let mut a = task(objective_id, "a", 5, 1_000);
        let mut b = task(objective_id, "b", 5, 1_000);
        a.depends_on = vec![b.id];
        b.depends_on = vec![a.id];

        assert!(DependencyResolver::new().detect_cycle(&[a, b]).is_some());
    }

    #[test]
    fn test_detect_cycle_no_cycle() {
        let objective_id = Uuid::new_v4();
        let a = task(objective_id, "a", 5, 1_000);
        let b = task(objective_id, "b", 5, 1_000).with_dependency(a.id);

        assert!(DependencyResolver::new().detect_cycle(&[a, b]).is_none());
    }

    proptest! {
        #[test]
        fn prop_frontier_sorted_and_stable(priorities in proptest::collection::vec(1u8..=10, 1..20)) {
            let objective_id = Uuid::new_v4();
            let tasks: Vec<Task> = priorities
                .iter()
                .enumerate()
                .map(|(i, &p)| task(objective_id, &format!("t{i}"), p, 1_000 + i as u64))
                .collect();
            let (graph, _) = graph_with(tasks);

            let resolver = DependencyResolver::new();
            let first = resolver.resolve(&graph, objective_id);
            let second = resolver.resolve(&graph, objective_id);

            // Deterministic across calls
            let ids = |r: &Resolution| r.ready.iter().map(|t| t.id).collect::<Vec<_>>();
            prop_assert_eq!(ids(&first), ids(&second));

            // Sorted by priority desc, duration asc
            for pair in first.ready.windows(2) {
                prop_assert!(
                    pair[0].priority > pair[1].priority
                        || (pair[0].priority == pair[1].priority
                            && pair[0].estimated_duration_ms <= pair[1].estimated_duration_ms)
                );
            }
        }
    }
}
