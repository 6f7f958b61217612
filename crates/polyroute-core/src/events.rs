//! Router event bus.
//!
//! A publish/subscribe channel built on [`tokio::sync::broadcast`] that lets
//! monitoring collaborators observe decisions and feedback without polling
//! the registry.  Events are wrapped in [`Arc`] so broadcasting to several
//! subscribers does not clone the payload.
//!
//! Publishing never blocks and never fails: with no subscribers the event is
//! dropped, and a subscriber that falls more than `capacity` events behind
//! receives [`broadcast::error::RecvError::Lagged`].
//!
//! # Usage
//!
//! ```rust,no_run
//! # use polyroute_core::events::{EventBus, RouterEvent};
//! # async fn example() {
//! let bus = EventBus::new(256);
//! let mut rx = bus.subscribe();
//! // ... route some tasks ...
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Something observable happened inside the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouterEvent {
    /// A task was routed.
    DecisionMade {
        decision_id: Uuid,
        provider_id: String,
        score: f64,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Feedback was accepted and folded into the provider's statistics.
    OutcomeRecorded {
        decision_id: Option<Uuid>,
        provider_id: String,
        success: bool,
        success_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Feedback was rejected; the registry was left untouched.
    FeedbackRejected {
        provider_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A decision received no feedback in time and was recorded as a failure.
    DecisionExpired {
        decision_id: Uuid,
        provider_id: String,
        age_ms: f64,
        timestamp: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Broadcast bus for [`RouterEvent`]s.  Cheaply cloneable.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<RouterEvent>>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber backlog.  A capacity of `0`
    /// is raised to `1`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber.  Returns the number of receivers.
    pub fn publish(&self, event: RouterEvent) -> usize {
        match self.sender.send(Arc::new(event)) {
            Ok(n) => {
                tracing::trace!(receivers = n, "router event published");
                n
            }
            // No receivers; routing does not depend on anyone listening.
            Err(_) => 0,
        }
    }

    /// Subscribe to future events.  Earlier events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RouterEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
