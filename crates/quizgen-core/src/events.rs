//! Orchestrator events and the broadcast event bus.
//!
//! Hosts subscribe to follow request progress (status changes, generation
//! results, review and deployment outcomes). Emitting never blocks; with no
//! subscribers the event is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::RequestStatus;

/// Domain event payloads.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"RequestStatusChanged","request_id":"...","from":"configured","to":"generating"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OrchestratorEvent {
    /// A request moved between lifecycle states.
    RequestStatusChanged {
        request_id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Topics were persisted, either analyzed or cloned from a prior request.
    TopicsReady {
        request_id: Uuid,
        topic_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        reused_from: Option<Uuid>,
    },
    /// Inline generation finished.
    GenerationFinished {
        request_id: Uuid,
        generated: usize,
        failed_slots: usize,
        duration_ms: i64,
    },
    /// A review action changed question statuses.
    QuestionsReviewed {
        request_id: Uuid,
        action: String,
        count: u64,
    },
    /// A question was regenerated.
    QuestionRegenerated {
        request_id: Uuid,
        question_id: Uuid,
        regeneration_count: u32,
    },
    /// A deployment finished (possibly partially).
    DeploymentFinished {
        request_id: Uuid,
        deployed: usize,
        failed: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        container_id: Option<i64>,
    },
    /// A repair pass finished.
    RepairFinished { collection_id: i64, writes: u64 },
}

impl OrchestratorEvent {
    /// Namespaced event type, e.g. `"request.status_changed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrchestratorEvent::RequestStatusChanged { .. } => "request.status_changed",
            OrchestratorEvent::TopicsReady { .. } => "request.topics_ready",
            OrchestratorEvent::GenerationFinished { .. } => "request.generation_finished",
            OrchestratorEvent::QuestionsReviewed { .. } => "question.reviewed",
            OrchestratorEvent::QuestionRegenerated { .. } => "question.regenerated",
            OrchestratorEvent::DeploymentFinished { .. } => "request.deployed",
            OrchestratorEvent::RepairFinished { .. } => "store.repaired",
        }
    }
}

/// Envelope carrying event metadata around the payload.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// UUIDv7 for temporal ordering.
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    /// Host user that caused the event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<i64>,
    pub payload: OrchestratorEvent,
}

impl EventEnvelope {
    pub fn new(payload: OrchestratorEvent, actor_id: Option<i64>) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: payload.event_type().to_string(),
            occurred_at: Utc::now(),
            actor_id,
            payload,
        }
    }
}

/// Broadcast-based event bus.
///
/// Slow receivers that fall behind get a `Lagged` error and miss events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event attributed to an actor.
    pub fn emit(&self, event: OrchestratorEvent, actor_id: Option<i64>) {
        let envelope = EventEnvelope::new(event, actor_id);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let request_id = Uuid::new_v4();

        bus.emit(
            OrchestratorEvent::RequestStatusChanged {
                request_id,
                from: RequestStatus::Configured,
                to: RequestStatus::Generating,
                error: None,
            },
            Some(7),
        );

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "request.status_changed");
        assert_eq!(envelope.actor_id, Some(7));
        assert!(matches!(
            envelope.payload,
            OrchestratorEvent::RequestStatusChanged { to: RequestStatus::Generating, .. }
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(
            OrchestratorEvent::RepairFinished {
                collection_id: 1,
                writes: 0,
            },
            None,
        );
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = OrchestratorEvent::TopicsReady {
            request_id: Uuid::nil(),
            topic_count: 3,
            reused_from: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TopicsReady");
        assert_eq!(json["topic_count"], 3);
        assert!(json.get("reused_from").is_none());
    }
}
