//! Event bus
//!
//! Process-wide single-producer-multi-consumer fan-out. Injected as an
//! explicit collaborator at construction; nothing in the crate reaches for
//! ambient globals.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// EVENTS
// ============================================================================

/// Lifecycle events observable on the bus
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A watched file changed
    FileModified {
        /// Workspace-relative path
        path: String,
    },
    /// Indexing work began
    IndexingStarted {
        /// What is being indexed (`bootstrap`, `incremental`, `cascade`)
        scope: String,
    },
    /// Indexing work finished
    IndexingComplete {
        /// Wall-clock duration
        duration_ms: u64,
        /// Entities touched
        counts: u64,
    },
    /// A new entity was persisted
    EntityCreated {
        /// Entity id
        entity_id: String,
        /// `module`, `function`, `pack`, ...
        entity_type: String,
    },
    /// An existing entity changed
    EntityUpdated {
        /// Entity id
        entity_id: String,
        /// Field that changed
        field: String,
    },
    /// A health check was triggered
    HealthCheckTriggered {
        /// `scheduled`, `file_change`, or `query_failure`
        source: String,
    },
    /// A recovery cycle finished
    RecoveryComplete {
        /// Fitness before the actions ran
        fitness_before: f64,
        /// Fitness after
        fitness_after: f64,
        /// Actions that executed
        actions: Vec<String>,
    },
    /// Bootstrap phase progress
    BootstrapProgress {
        /// Phase name
        phase: String,
        /// Progress in [0, 1]
        progress: f64,
        /// Current file when per-file work is running
        #[serde(skip_serializing_if = "Option::is_none")]
        current_file: Option<String>,
    },
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Fan-out bus backed by a tokio broadcast channel.
///
/// Slow subscribers drop the oldest events rather than blocking producers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the given buffered capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; a bus with no subscribers swallows it
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================================
// TESTS
// ============================================================================
