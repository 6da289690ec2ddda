// src/core/events.rs

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::EVENT_CHANNEL_CAPACITY;

/// Observability events emitted by the engine, one per terminal pipeline state.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Executed {
        invocation_id: Uuid,
        command: String,
        user_id: String,
        elapsed_ms: u64,
    },
    Rejected {
        invocation_id: Uuid,
        command: String,
        user_id: String,
        reason: String,
    },
    Errored {
        invocation_id: Uuid,
        command: String,
        user_id: String,
        error: String,
    },
}

impl EngineEvent {
    pub fn command(&self) -> &str {
        match self {
            EngineEvent::Executed { command, .. }
            | EngineEvent::Rejected { command, .. }
            | EngineEvent::Errored { command, .. } => command,
        }
    }
}

/// Fan-out of [`EngineEvent`]s. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        log::trace!("Emitting event: {:?}", event);
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        let event = EngineEvent::Rejected {
            invocation_id: Uuid::new_v4(),
            command: "ping".into(),
            user_id: "1".into(),
            reason: "cooldown".into(),
        };

        bus.emit(event.clone());

        assert_eq!(receiver.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(EngineEvent::Errored {
            invocation_id: Uuid::nil(),
            command: "x".into(),
            user_id: "1".into(),
            error: "boom".into(),
        });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(EngineEvent::Executed {
            invocation_id: Uuid::nil(),
            command: "ping".into(),
            user_id: "1".into(),
            elapsed_ms: 3,
        })
        .unwrap();
        assert_eq!(json["event"], "executed");
        assert_eq!(json["command"], "ping");
    }
}
