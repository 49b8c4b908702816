//! Event delivery.
//!
//! [`Program`](crate::Program) publishes an [`Event`] for every committed
//! state change to the [`EventSink`] it was built with. Events are published
//! after the ledger transaction commits, never for a rolled-back operation.

use std::sync::Mutex;

use warden_types::events::Event;

/// Receiver of program events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct Discard;

impl EventSink for Discard {
    fn publish(&self, _event: Event) {}
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything published so far.
    pub fn drain(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
