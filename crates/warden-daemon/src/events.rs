//! Event bus.
//!
//! Program events are numbered, kept in a bounded buffer for `get_events`,
//! and pushed to connections that called `subscribe_events` as JSON-RPC
//! notifications. A subscriber that falls more than the buffer size behind
//! is told how many events it missed and can catch up with `get_events`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use tokio::sync::broadcast;
use warden_program::EventSink;
use warden_types::events::Event;
use warden_types::PublicKey;

/// An event with its position in the daemon's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Starts at 1 and increases by one per event.
    pub sequence: u64,
    pub event: Event,
}

/// Filter for `get_events` and `subscribe_events`.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events about this account.
    #[serde_as(as = "Option<Hex>")]
    #[serde(default)]
    pub owner: Option<PublicKey>,
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        match &self.owner {
            Some(owner) => event.kind.owner() == owner,
            None => true,
        }
    }
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SequencedEvent>,
    sequence: Arc<AtomicU64>,
    recent: Arc<Mutex<VecDeque<SequencedEvent>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn recent(&self) -> MutexGuard<'_, VecDeque<SequencedEvent>> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number and deliver an event. Returns its sequence number.
    pub fn emit(&self, event: Event) -> u64 {
        // Holding the buffer lock keeps sequence, buffer and channel order aligned.
        let mut recent = self.recent();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = SequencedEvent { sequence, event };

        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(entry.clone());

        // No subscribers is fine.
        let _ = self.sender.send(entry);
        sequence
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.sender.subscribe()
    }

    /// Sequence number of the latest event, 0 before the first.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Buffered events after `after` that match `filter`, oldest first.
    pub fn since(&self, after: u64, filter: &EventFilter) -> Vec<SequencedEvent> {
        self.recent()
            .iter()
            .filter(|e| e.sequence > after && filter.matches(&e.event))
            .cloned()
            .collect()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: Event) {
        let sequence = self.emit(event);
        tracing::trace!(sequence, "event buffered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::events::EventKind;

    fn cancelled(owner: u8, timestamp: u64) -> Event {
        Event {
            timestamp,
            kind: EventKind::EmergencyCountdownCancelled {
                owner: [owner; 32],
            },
        }
    }

    #[test]
    fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(cancelled(1, 1000)), 1);

        let received = rx.try_recv().expect("receive event");
        assert_eq!(received.sequence, 1);
        assert_eq!(received.event, cancelled(1, 1000));
        assert_eq!(bus.sequence(), 1);
    }

    #[test]
    fn test_buffer_keeps_most_recent() {
        let bus = EventBus::new(3);
        for t in 1..=5 {
            bus.emit(cancelled(1, t));
        }

        let all = bus.since(0, &EventFilter::default());
        assert_eq!(
            all.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        assert_eq!(bus.since(4, &EventFilter::default()).len(), 1);
        assert!(bus.since(5, &EventFilter::default()).is_empty());
    }

    #[test]
    fn test_event_filter_owner() {
        let bus = EventBus::new(16);
        bus.emit(cancelled(1, 10));
        bus.emit(cancelled(2, 11));
        bus.emit(cancelled(1, 12));

        let filter = EventFilter {
            owner: Some([1; 32]),
        };
        let mine = bus.since(0, &filter);
        assert_eq!(
            mine.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(EventFilter::default().matches(&cancelled(9, 0)));
    }

    #[test]
    fn test_filter_from_params() {
        let filter: EventFilter =
            serde_json::from_value(serde_json::json!({"owner": "02".repeat(32)}))
                .expect("parse");
        assert_eq!(filter.owner, Some([2; 32]));

        let filter: EventFilter = serde_json::from_value(serde_json::json!({})).expect("parse");
        assert_eq!(filter.owner, None);
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for t in 1..=4 {
            bus.emit(cancelled(1, t));
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(2))
        ));
        assert_eq!(rx.try_recv().expect("next").sequence, 3);
    }
}
