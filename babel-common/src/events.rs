//! Event types for the babel event system
//!
//! The UI collaborator subscribes to the [`EventBus`] and receives
//! [`QueryEvent`]s. Every [`QueryEvent::Updated`] carries the complete ordered
//! section list: consumers replace what they show, they never patch it.

use crate::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Monotonically increasing query generation
///
/// A newer id supersedes every older one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a single query
///
/// `Created → Detecting → Dispatching → PartialResults* → Settled`;
/// `Cancelled` is reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPhase {
    Created,
    Detecting,
    Dispatching,
    PartialResults,
    Settled,
    Cancelled,
}

impl RequestPhase {
    /// Settled or Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Settled | RequestPhase::Cancelled)
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPhase::Created => write!(f, "Created"),
            RequestPhase::Detecting => write!(f, "Detecting"),
            RequestPhase::Dispatching => write!(f, "Dispatching"),
            RequestPhase::PartialResults => write!(f, "PartialResults"),
            RequestPhase::Settled => write!(f, "Settled"),
            RequestPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Kind of a display row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// Main translation line
    Headline,
    /// Pronunciation
    Phonetic,
    /// Dictionary explanation (part of speech + meanings)
    Explanation,
    /// Usage example
    Example,
    /// Provider error shown in place of a result
    Error,
}

/// One row group inside a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub kind: ItemKind,
    /// Label shown above the group (at most one "Details" label per section)
    pub label: Option<String>,
    pub lines: Vec<String>,
}

impl DisplayItem {
    pub fn new(kind: ItemKind, lines: Vec<String>) -> Self {
        Self {
            kind,
            label: None,
            lines,
        }
    }
}

/// Per-provider block of the result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySection {
    pub provider_id: String,
    pub title: String,
    pub items: Vec<DisplayItem>,
}

/// Complete visible state for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub request_id: RequestId,
    pub phase: RequestPhase,
    /// Ordered by the configured sort order, never by arrival
    pub sections: Vec<DisplaySection>,
    /// Loading indicator: on exactly while providers are in flight
    pub loading: bool,
    /// Expanded "detail" presentation requested
    pub detail_mode: bool,
}

/// Babel event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueryEvent {
    /// Source and target languages resolved for a request
    DetectionResolved {
        request_id: RequestId,
        source: Language,
        target: Language,
        confirmed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Full replacement of the visible result list
    Updated(DisplayUpdate),

    /// Non-blocking, user-visible provider failure notification
    ProviderFailed {
        request_id: RequestId,
        provider_id: String,
        code: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Configuration prevents querying (e.g. no providers enabled)
    ConfigurationError {
        request_id: RequestId,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Input cleared: visible list and loading indicator are empty
    Cleared {
        request_id: RequestId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QueryEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            QueryEvent::DetectionResolved { request_id, .. }
            | QueryEvent::ProviderFailed { request_id, .. }
            | QueryEvent::ConfigurationError { request_id, .. }
            | QueryEvent::Cleared { request_id, .. } => *request_id,
            QueryEvent::Updated(update) => update.request_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block the orchestrator)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use babel_common::events::EventBus;
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueryEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: QueryEvent,
    ) -> Result<usize, broadcast::error::SendError<QueryEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: QueryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleared(id: u64) -> QueryEvent {
        QueryEvent::Cleared {
            request_id: RequestId(id),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(cleared(1)).is_err());
        // Lossy never panics
        bus.emit_lossy(cleared(1));
        assert_eq!(bus.capacity(), 10);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(cleared(7)).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), RequestId(7));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = QueryEvent::ProviderFailed {
            request_id: RequestId(3),
            provider_id: "deepl".to_string(),
            code: "500".to_string(),
            message: "boom".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ProviderFailed");
        assert_eq!(json["request_id"], 3);
    }

    #[test]
    fn test_phase_terminal() {
        assert!(RequestPhase::Settled.is_terminal());
        assert!(RequestPhase::Cancelled.is_terminal());
        assert!(!RequestPhase::PartialResults.is_terminal());
        assert_eq!(RequestId(5).to_string(), "#5");
    }
}
