//! Event bus for simulation event streaming.
//!
//! Broadcast-based fan-out with sequence numbering. Every subscriber
//! registered at emission time receives each event at least once;
//! lagging receivers observe `Lagged` per broadcast-channel semantics.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::InsightCategory;

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event emitted by the simulation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    ObjectiveStarted {
        objective_id: Uuid,
        title: String,
    },
    IterationStarted {
        objective_id: Uuid,
        iteration: u32,
        max_iterations: u32,
    },
    IterationCompleted {
        objective_id: Uuid,
        iteration: u32,
        tasks_completed: usize,
        tasks_total: usize,
    },
    TasksGenerated {
        objective_id: Uuid,
        count: usize,
        source: String,
    },
    TaskStarted {
        task_id: Uuid,
        title: String,
        attempt: u32,
    },
    TaskProgress {
        task_id: Uuid,
        progress: u8,
        current_step: String,
    },
    TaskRetrying {
        task_id: Uuid,
        attempt: u32,
        max_attempts: u32,
        backoff_ms: u64,
    },
    TaskCompleted {
        task_id: Uuid,
        actual_duration_ms: u64,
        efficiency: f64,
    },
    TaskFailed {
        task_id: Uuid,
        reason: String,
        attempts: u32,
    },
    TaskBlocked {
        task_id: Uuid,
        missing_dependency: Uuid,
    },
    ExecutionLog {
        task_id: Option<Uuid>,
        level: EventSeverity,
        message: String,
    },
    InsightGenerated {
        category: InsightCategory,
        confidence: f64,
        insight: String,
    },
    ObjectiveCompleted {
        objective_id: Uuid,
        result: String,
    },
    ObjectiveFailed {
        objective_id: Uuid,
        reason: String,
    },
    SimulationStopped,
}

impl SimEvent {
    /// Severity used for log routing and display.
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::TaskProgress { .. } => EventSeverity::Debug,
            Self::TaskRetrying { .. } | Self::TaskBlocked { .. } => EventSeverity::Warning,
            Self::TaskFailed { .. } | Self::ObjectiveFailed { .. } => EventSeverity::Error,
            Self::ExecutionLog { level, .. } => *level,
            _ => EventSeverity::Info,
        }
    }
}

/// Envelope carrying bus-assigned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub event: SimEvent,
}

/// Central event bus broadcasting to all current subscribers.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: SimEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            severity: event.severity(),
            event,
        };
        // Send errors mean no subscribers, which is fine.
        let _ = self.sender.send(envelope);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_assignment() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SimEvent::SimulationStopped);
        bus.publish(SimEvent::SimulationStopped);

        assert_eq!(rx.recv().await.unwrap().sequence.0, 0);
        assert_eq!(rx.recv().await.unwrap().sequence.0, 1);
        assert_eq!(bus.current_sequence().0, 2);
    }

    #[tokio::test]
    async fn test_severity_mapping() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(SimEvent::TaskFailed {
            task_id: Uuid::new_v4(),
            reason: "boom".to_string(),
            attempts: 3,
        });
        assert_eq!(rx.recv().await.unwrap().severity, EventSeverity::Error);

        bus.publish(SimEvent::TaskProgress {
            task_id: Uuid::new_v4(),
            progress: 10,
            current_step: "Initialization".to_string(),
        });
        assert_eq!(rx.recv().await.unwrap().severity, EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(SimEvent::SimulationStopped);

        assert!(matches!(
            rx1.recv().await.unwrap().event,
            SimEvent::SimulationStopped
        ));
        assert!(matches!(
            rx2.recv().await.unwrap().event,
            SimEvent::SimulationStopped
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.publish(SimEvent::SimulationStopped);
        assert_eq!(bus.current_sequence().0, 1);
    }
}
