//! Internal event broadcast: a tokio::broadcast channel for action lifecycle notifications.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::actions::types::Action;

/// Observer notifications. Fire-and-forget; each carries the current action snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "action", rename_all = "lowercase")]
pub enum ActionEvent {
    /// A signal matched and a new action was persisted.
    Queued(Action),
    /// Content generation started.
    Generating(Action),
    /// The post is being published.
    Posting(Action),
    /// The post was published.
    Completed(Action),
    /// Terminal failure, needs an operator.
    Failed(Action),
}

impl ActionEvent {
    pub fn action(&self) -> &Action {
        match self {
            ActionEvent::Queued(a)
            | ActionEvent::Generating(a)
            | ActionEvent::Posting(a)
            | ActionEvent::Completed(a)
            | ActionEvent::Failed(a) => a,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ActionEvent::Queued(_) => "queued",
            ActionEvent::Generating(_) => "generating",
            ActionEvent::Posting(_) => "posting",
            ActionEvent::Completed(_) => "completed",
            ActionEvent::Failed(_) => "failed",
        }
    }
}

/// Central event bus for broadcasting events to all subscribers.
pub struct EventBus {
    tx: broadcast::Sender<ActionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ActionEvent) {
        // Ignore error if no subscribers
        let _ = self.tx.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.tx.subscribe()
    }
}
