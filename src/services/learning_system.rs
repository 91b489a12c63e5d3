//! Learning system: mines insights from terminal tasks and feeds
//! accumulated patterns back into task generation.
//!
//! Four independent analysis dimensions run over each terminal task:
//! overall efficiency, complexity mismatch, timing variance, and
//! dependency health. Raw metrics also accumulate into pattern buckets
//! keyed by task type and bucketed complexity/dependency counts; a
//! bucket influences future estimates only once it has enough
//! occurrences to be trusted.

use std::collections::{HashMap, VecDeque};

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{InsightCategory, LearningInsight, Task, TaskStatus};
use crate::domain::ports::TaskBlueprint;

/// Bounded insight log size.
const MAX_INSIGHTS: usize = 100;

/// Insights older than this are dropped from the log.
const INSIGHT_TTL_MINUTES: i64 = 60;

/// Occurrences a bucket needs before it influences generation.
const MIN_BUCKET_OCCURRENCES: u32 = 3;

/// Safety buffer applied when nudging estimates toward bucket averages.
const ESTIMATE_SAFETY_BUFFER: f64 = 1.1;

/// Efficiency score below which a strategy insight is emitted.
const LOW_EFFICIENCY_THRESHOLD: f64 = 0.6;

/// Relative timing variance above which a timing insight is emitted.
const TIMING_VARIANCE_THRESHOLD: f64 = 0.3;

/// Title keywords treated as signals of technical depth. Illustrative
/// rather than exhaustive; classification only feeds bucket keys and
/// the effective-complexity estimate.
const TECHNICAL_KEYWORDS: [&str; 10] = [
    "implement",
    "integrate",
    "refactor",
    "optimize",
    "migrate",
    "database",
    "protocol",
    "concurrent",
    "distributed",
    "async",
];

/// Coarse task-type classification derived from the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Planning,
    Implementation,
    Testing,
    Review,
    General,
}

impl TaskType {
    /// Classify a task title by its leading verb-ish keywords.
    pub fn classify(title: &str) -> Self {
        let lower = title.to_lowercase();
        if ["design", "plan", "analyze", "research", "initialization"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Planning
        } else if ["implement", "build", "create", "develop", "integrate"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Implementation
        } else if ["test", "verify", "validate", "check"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Testing
        } else if ["review", "document", "finalize", "polish"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Review
        } else {
            Self::General
        }
    }
}

/// Aggregation key: task type crossed with bucketed complexity and
/// dependency count (steps of 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternKey {
    pub task_type: TaskType,
    pub complexity_bucket: u8,
    pub dependency_bucket: u8,
}

impl PatternKey {
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_type: TaskType::classify(&task.title),
            complexity_bucket: task.complexity / 2,
            dependency_bucket: (task.depends_on.len() as u8) / 2,
        }
    }

    pub fn for_blueprint(blueprint: &TaskBlueprint) -> Self {
        Self {
            task_type: TaskType::classify(&blueprint.title),
            complexity_bucket: blueprint.complexity / 2,
            dependency_bucket: (blueprint.depends_on.len() as u8) / 2,
        }
    }
}

/// Accumulated history for one pattern bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternStats {
    pub occurrences: u32,
    pub successes: u32,
    pub total_duration_ms: u64,
    pub avg_complexity: f64,
    pub avg_dependencies: f64,
}

impl PatternStats {
    fn record(&mut self, task: &Task) {
        self.occurrences += 1;
        if task.status == TaskStatus::Completed {
            self.successes += 1;
        }
        self.total_duration_ms += task.actual_duration_ms.unwrap_or(task.estimated_duration_ms);

        // Rolling averages.
        let n = f64::from(self.occurrences);
        self.avg_complexity += (f64::from(task.complexity) - self.avg_complexity) / n;
        self.avg_dependencies += (task.depends_on.len() as f64 - self.avg_dependencies) / n;
    }

    /// Average observed duration across the bucket.
    pub fn avg_duration_ms(&self) -> u64 {
        if self.occurrences == 0 {
            0
        } else {
            self.total_duration_ms / u64::from(self.occurrences)
        }
    }

    /// Whether the bucket has enough history to influence generation.
    pub fn is_trusted(&self) -> bool {
        self.occurrences >= MIN_BUCKET_OCCURRENCES
    }
}

/// Insight mining and pattern feedback over execution history.
#[derive(Debug, Default)]
pub struct LearningSystem {
    insights: VecDeque<LearningInsight>,
    patterns: HashMap<PatternKey, PatternStats>,
}

impl LearningSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one terminal task and return the insights it produced.
    ///
    /// `dependencies` are the task's resolved dependency tasks, used for
    /// the dependency-health dimension. Emitted insights are also
    /// appended to the internal bounded log, and the task's raw metrics
    /// feed its pattern bucket.
    pub fn process_task_completion(
        &mut self,
        task: &Task,
        dependencies: &[Task],
    ) -> Vec<LearningInsight> {
        let mut produced = Vec::new();

        if let Some(insight) = Self::analyze_efficiency(task) {
            produced.push(insight);
        }
        if let Some(insight) = Self::analyze_complexity_mismatch(task) {
            produced.push(insight);
        }
        if let Some(insight) = Self::analyze_timing_variance(task) {
            produced.push(insight);
        }
        if let Some(insight) = Self::analyze_dependency_health(task, dependencies) {
            produced.push(insight);
        }

        self.patterns
            .entry(PatternKey::for_task(task))
            .or_default()
            .record(task);

        for insight in &produced {
            self.remember(insight.clone());
        }
        produced
    }

    /// Nudge a blueprint toward its bucket's observed history.
    ///
    /// Estimates move to the bucket's average duration plus a safety
    /// buffer; complexity moves halfway toward the rolling average,
    /// clamped to [1, 10]. Blueprints without a trusted bucket pass
    /// through unchanged.
    pub fn apply_feedback(&self, blueprint: &mut TaskBlueprint) -> bool {
        let key = PatternKey::for_blueprint(blueprint);
        let Some(stats) = self.patterns.get(&key).filter(|s| s.is_trusted()) else {
            return false;
        };

        let target = (stats.avg_duration_ms() as f64 * ESTIMATE_SAFETY_BUFFER).round() as u64;
        if target > 0 {
            let current = blueprint.estimated_duration_ms;
            blueprint.estimated_duration_ms = (current + target) / 2;
        }

        let adjusted =
            (f64::from(blueprint.complexity) + stats.avg_complexity) / 2.0;
        blueprint.complexity = (adjusted.round() as u8).clamp(1, 10);
        true
    }

    /// Recent unapplied insights, most recent first.
    pub fn recent_insights(&self, limit: usize) -> Vec<LearningInsight> {
        self.insights
            .iter()
            .rev()
            .filter(|i| !i.applied)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Mark a logged insight as folded into task generation.
    pub fn mark_applied(&mut self, insight_id: uuid::Uuid) {
        if let Some(insight) = self.insights.iter_mut().find(|i| i.id == insight_id) {
            insight.mark_applied();
        }
    }

    pub fn pattern_stats(&self, key: &PatternKey) -> Option<&PatternStats> {
        self.patterns.get(key)
    }

    pub fn insight_count(&self) -> usize {
        self.insights.len()
    }

    /// Append to the log, evicting expired and overflow entries.
    fn remember(&mut self, insight: LearningInsight) {
        let cutoff = Utc::now() - ChronoDuration::minutes(INSIGHT_TTL_MINUTES);
        self.insights.retain(|i| i.created_at > cutoff);
        if self.insights.len() >= MAX_INSIGHTS {
            self.insights.pop_front();
        }
        self.insights.push_back(insight);
    }

    /// Overall efficiency: weighted blend of duration, progress, and
    /// attempt efficiency. Low scores suggest the execution strategy
    /// needs rethinking.
    fn analyze_efficiency(task: &Task) -> Option<LearningInsight> {
        let duration_ratio = match task.actual_duration_ms {
            Some(actual) if actual > 0 => {
                (task.estimated_duration_ms as f64 / actual as f64).min(1.0)
            }
            _ => 1.0,
        };
        let progress_ratio = f64::from(task.progress) / 100.0;
        let attempt_efficiency =
            (1.0 - 0.2 * f64::from(task.attempts.saturating_sub(1))).max(0.3);

        let overall = 0.4 * duration_ratio + 0.3 * progress_ratio + 0.3 * attempt_efficiency;
        if overall >= LOW_EFFICIENCY_THRESHOLD {
            return None;
        }

        Some(
            LearningInsight::new(
                InsightCategory::Strategy,
                format!(
                    "'{}' ran at {:.0}% efficiency ({} attempts); consider smaller task scope",
                    task.title,
                    overall * 100.0,
                    task.attempts
                ),
                0.75,
            )
            .with_source_task(task.id),
        )
    }

    /// Effective complexity recomputed from execution signals. A gap
    /// greater than 2 from the stated complexity means the estimate was
    /// off in a way worth recording.
    fn analyze_complexity_mismatch(task: &Task) -> Option<LearningInsight> {
        let effective = Self::effective_complexity(task);
        let stated = i16::from(task.complexity);
        if (i16::from(effective) - stated).abs() <= 2 {
            return None;
        }

        Some(
            LearningInsight::new(
                InsightCategory::Strategy,
                format!(
                    "'{}' behaved like complexity {} but was rated {}; re-estimate similar work",
                    task.title, effective, task.complexity
                ),
                0.8,
            )
            .with_source_task(task.id),
        )
    }

    /// Relative deviation of actual from estimated duration.
    fn analyze_timing_variance(task: &Task) -> Option<LearningInsight> {
        let actual = task.actual_duration_ms?;
        if task.estimated_duration_ms == 0 {
            return None;
        }
        let variance = (actual as f64 - task.estimated_duration_ms as f64).abs()
            / task.estimated_duration_ms as f64;
        if variance <= TIMING_VARIANCE_THRESHOLD {
            return None;
        }

        let direction = if actual > task.estimated_duration_ms {
            "over"
        } else {
            "under"
        };
        Some(
            LearningInsight::new(
                InsightCategory::Timing,
                format!(
                    "'{}' ran {:.0}% {} its estimate ({} ms vs {} ms)",
                    task.title,
                    variance * 100.0,
                    direction,
                    actual,
                    task.estimated_duration_ms
                ),
                0.9,
            )
            .with_source_task(task.id),
        )
    }

    /// Dependencies whose completion time exceeded 30% of this task's
    /// own estimate are critical; any on a failed task produce an
    /// insight.
    fn analyze_dependency_health(task: &Task, dependencies: &[Task]) -> Option<LearningInsight> {
        if task.status != TaskStatus::Failed {
            return None;
        }
        let threshold = (task.estimated_duration_ms as f64 * 0.3) as u64;
        let critical = dependencies
            .iter()
            .filter(|dep| dep.actual_duration_ms.is_some_and(|d| d > threshold))
            .count();
        if critical == 0 {
            return None;
        }

        Some(
            LearningInsight::new(
                InsightCategory::Dependencies,
                format!(
                    "'{}' failed with {critical} slow dependencies; restructure the chain",
                    task.title
                ),
                0.7,
            )
            .with_source_task(task.id),
        )
    }

    fn effective_complexity(task: &Task) -> u8 {
        let lower = task.title.to_lowercase();
        let keyword_hits = TECHNICAL_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count();

        let mut score = 2.0;
        score += task.depends_on.len() as f64 * 0.8;
        score += f64::from(task.attempts.saturating_sub(1)) * 1.5;
        score += keyword_hits as f64 * 0.7;
        if let Some(actual) = task.actual_duration_ms {
            if actual > task.estimated_duration_ms.saturating_mul(2) {
                score += 1.0;
            }
        }

        (score.round() as u8).clamp(1, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn completed_task(estimate: u64, actual: u64, attempts: u32) -> Task {
        let mut task = Task::new(Uuid::new_v4(), "Routine step", "desc")
            .with_complexity(4)
            .with_estimated_duration_ms(estimate);
        for _ in 0..attempts {
            task.transition_to(TaskStatus::InProgress).unwrap();
            if task.attempts < attempts {
                task.transition_to(TaskStatus::Pending).unwrap();
            }
        }
        task.actual_duration_ms = Some(actual);
        task.transition_to(TaskStatus::Completed).unwrap();
        task
    }

    #[test]
    fn test_on_estimate_first_try_produces_no_insights() {
        let mut learning = LearningSystem::new();
        let task = completed_task(5_000, 5_000, 1);
        let insights = learning.process_task_completion(&task, &[]);
        assert!(insights.is_empty(), "unexpected insights: {insights:?}");
    }

    #[test]
    fn test_fifty_percent_overrun_emits_timing_insight() {
        let mut learning = LearningSystem::new();
        let task = completed_task(10_000, 15_000, 1);
        let insights = learning.process_task_completion(&task, &[]);

        let timing = insights
            .iter()
            .find(|i| i.category == InsightCategory::Timing)
            .expect("timing insight");
        assert!(timing.confidence >= 0.85);
        assert!(timing.insight.contains("50%"));
    }

    #[test]
    fn test_low_efficiency_emits_strategy_insight() {
        // Three attempts and a 4x overrun push the blend under 0.6.
        let mut learning = LearningSystem::new();
        let task = completed_task(5_000, 20_000, 3);
        let insights = learning.process_task_completion(&task, &[]);

        assert!(insights
            .iter()
            .any(|i| i.category == InsightCategory::Strategy
                && i.insight.contains("efficiency")));
    }

    #[test]
    fn test_failed_task_with_slow_dependency_emits_dependency_insight() {
        let mut learning = LearningSystem::new();

        let mut slow_dep = completed_task(4_000, 4_000, 1);
        slow_dep.actual_duration_ms = Some(4_000);

        let mut failed = Task::new(Uuid::new_v4(), "Dependent work", "desc")
            .with_estimated_duration_ms(10_000)
            .with_dependency(slow_dep.id);
        failed.transition_to(TaskStatus::InProgress).unwrap();
        failed.transition_to(TaskStatus::Failed).unwrap();

        let insights = learning.process_task_completion(&failed, &[slow_dep]);
        let dep = insights
            .iter()
            .find(|i| i.category == InsightCategory::Dependencies)
            .expect("dependencies insight");
        assert!((dep.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completed_task_never_emits_dependency_insight() {
        let mut learning = LearningSystem::new();
        let slow_dep = completed_task(4_000, 9_000, 1);
        let mut task = completed_task(10_000, 10_000, 1);
        task.depends_on = vec![slow_dep.id];

        let insights = learning.process_task_completion(&task, &[slow_dep]);
        assert!(!insights
            .iter()
            .any(|i| i.category == InsightCategory::Dependencies));
    }

    #[test]
    fn test_bucket_untrusted_below_three_occurrences() {
        let mut learning = LearningSystem::new();
        for _ in 0..2 {
            let task = completed_task(5_000, 9_000, 1);
            learning.process_task_completion(&task, &[]);
        }

        let mut blueprint = TaskBlueprint::new("Routine step", "desc")
            .with_complexity(4)
            .with_estimated_duration_ms(5_000);
        assert!(!learning.apply_feedback(&mut blueprint));
        assert_eq!(blueprint.estimated_duration_ms, 5_000);
    }

    #[test]
    fn test_feedback_nudges_estimate_with_safety_buffer() {
        let mut learning = LearningSystem::new();
        for _ in 0..3 {
            let task = completed_task(5_000, 9_000, 1);
            learning.process_task_completion(&task, &[]);
        }

        let mut blueprint = TaskBlueprint::new("Routine step", "desc")
            .with_complexity(4)
            .with_estimated_duration_ms(5_000);
        assert!(learning.apply_feedback(&mut blueprint));

        // Bucket avg 9000 ms, buffered to 9900, averaged with 5000.
        assert_eq!(blueprint.estimated_duration_ms, 7_450);
        assert!((1..=10).contains(&blueprint.complexity));
    }

    #[test]
    fn test_insight_log_bounded() {
        let mut learning = LearningSystem::new();
        for _ in 0..(MAX_INSIGHTS + 40) {
            let task = completed_task(10_000, 20_000, 1);
            learning.process_task_completion(&task, &[]);
        }
        assert!(learning.insight_count() <= MAX_INSIGHTS);
    }

    #[test]
    fn test_recent_insights_skips_applied() {
        let mut learning = LearningSystem::new();
        let task = completed_task(10_000, 20_000, 1);
        let produced = learning.process_task_completion(&task, &[]);
        let id = produced[0].id;

        learning.mark_applied(id);
        assert!(learning
            .recent_insights(10)
            .iter()
            .all(|i| i.id != id));
    }

    #[test]
    fn test_task_type_classification() {
        assert_eq!(TaskType::classify("Design the schema"), TaskType::Planning);
        assert_eq!(
            TaskType::classify("Implement the parser"),
            TaskType::Implementation
        );
        assert_eq!(TaskType::classify("Verify output"), TaskType::Testing);
        assert_eq!(TaskType::classify("Review results"), TaskType::Review);
        assert_eq!(TaskType::classify("Miscellaneous"), TaskType::General);
    }
}
