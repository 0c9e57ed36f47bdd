//! Ordered, sequenced, recorded publish/subscribe event bus.
//!
//! Dispatch is synchronous and single-threaded: `publish` walks a snapshot of
//! the subscriber list for an event type in registration order, catching and
//! logging any subscriber fault so the remaining subscribers still run.
//! Sequence numbers are assigned at publish time and strictly increase for the
//! lifetime of a bus instance.

use std::collections::HashMap;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json;

/// Dispatch priority recorded alongside an event; does not affect ordering
/// within a single `event_type`'s subscriber list, only metadata carried on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    System = 0,
    Gameplay = 1,
    Ui = 2,
    Debug = 3,
}

/// A fully stamped event, as recorded in bus history and serialized on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub timestamp: f64,
    pub sequence_number: u64,
    pub event_type: String,
    pub priority: EventPriority,
    pub data: serde_json::Value,
    pub source: Option<String>,
    pub network_replicate: bool,
}

/// A handler invoked synchronously during `publish`/`publish_enhanced`.
///
/// Handlers that want to react to failures return an `Err`; the bus logs the
/// fault via `tracing::warn!` and continues dispatching to later subscribers.
/// No error type is ever propagated past the bus boundary.
pub type Handler = Box<dyn FnMut(&serde_json::Value) -> Result<(), String>>;

/// Synchronous, sequenced, optionally-recording event bus.
///
/// Grounded in the reference `EnhancedEventBus`: `subscribe`/`unsubscribe`
/// preserve registration order, `publish`/`publish_enhanced` stamp a
/// monotonically increasing sequence number, and a bounded history ring keeps
/// the most recent `history_capacity` events for `get_events_since` /
/// `replay` / JSON (de)serialization.
pub struct EventBus {
    subscribers: HashMap<String, Vec<Handler>>,
    history: VecDeque<StoredEvent>,
    history_capacity: usize,
    next_sequence: u64,
    clock: f64,
    recording: bool,
    /// Queue of (event_type, payload, priority, source, replicate) produced by
    /// handlers while a dispatch is already in progress; flushed once the
    /// current dispatch completes so re-entrant publishes are ordered after
    /// the event that triggered them, per the single-threaded ordering rule.
    pending: VecDeque<PendingPublish>,
    dispatching: bool,
}

struct PendingPublish {
    event_type: String,
    payload: serde_json::Value,
    priority: EventPriority,
    source: Option<String>,
    replicate: bool,
}

impl EventBus {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            history: VecDeque::new(),
            history_capacity,
            next_sequence: 0,
            clock: 0.0,
            recording: true,
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    /// Advances the bus's internal clock used to timestamp events. The core
    /// has no wall-clock dependency; callers (e.g. a turn loop) drive this.
    pub fn advance_clock(&mut self, seconds: f64) {
        self.clock += seconds;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn subscribe(&mut self, event_type: impl Into<String>, handler: Handler) {
        self.subscribers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// Removes the `index`-th subscriber registered for `event_type`, if any.
    /// Handlers have no stable identity in Rust, so unlike the reference
    /// implementation (which unsubscribes by callable identity) callers track
    /// the index returned implicitly by registration order.
    pub fn unsubscribe_at(&mut self, event_type: &str, index: usize) {
        if let Some(list) = self.subscribers.get_mut(event_type) {
            if index < list.len() {
                list.remove(index);
            }
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers.get(event_type).map_or(0, Vec::len)
    }

    /// Synchronous dispatch with no sequence stamping or recording; used for
    /// low-ceremony internal notifications.
    pub fn publish(&mut self, event_type: &str, payload: serde_json::Value) {
        self.publish_enhanced(event_type, EventPriority::Gameplay, payload, None, false);
    }

    pub fn publish_enhanced(
        &mut self,
        event_type: &str,
        priority: EventPriority,
        payload: serde_json::Value,
        source: Option<String>,
        replicate: bool,
    ) {
        if self.dispatching {
            self.pending.push_back(PendingPublish {
                event_type: event_type.to_string(),
                payload,
                priority,
                source,
                replicate,
            });
            return;
        }

        self.dispatch_now(event_type, priority, payload, source, replicate);

        while let Some(next) = self.pending.pop_front() {
            self.dispatch_now(
                &next.event_type,
                next.priority,
                next.payload,
                next.source,
                next.replicate,
            );
        }
    }

    fn dispatch_now(
        &mut self,
        event_type: &str,
        priority: EventPriority,
        payload: serde_json::Value,
        source: Option<String>,
        replicate: bool,
    ) {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        if self.recording {
            let stored = StoredEvent {
                timestamp: self.clock,
                sequence_number,
                event_type: event_type.to_string(),
                priority,
                data: payload.clone(),
                source: source.clone(),
                network_replicate: replicate,
            };
            self.history.push_back(stored);
            while self.history.len() > self.history_capacity {
                self.history.pop_front();
            }
        }

        self.dispatching = true;
        if let Some(handlers) = self.subscribers.get_mut(event_type) {
            // Dispatch over a fresh index range each call; subscriptions added
            // mid-dispatch are only visible starting with the next publish
            // because we snapshot the length up front.
            let len = handlers.len();
            for handler in handlers.iter_mut().take(len) {
                if let Err(message) = handler(&payload) {
                    tracing::warn!(event_type, message, "event subscriber fault, continuing dispatch");
                }
            }
        }
        self.dispatching = false;
    }

    pub fn get_current_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn get_events_since(&self, since: u64) -> Vec<StoredEvent> {
        self.history
            .iter()
            .filter(|e| e.sequence_number >= since)
            .cloned()
            .collect()
    }

    pub fn get_events_by_type(&self, event_type: &str, since_ts: Option<f64>) -> Vec<StoredEvent> {
        self.history
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| since_ts.map_or(true, |ts| e.timestamp >= ts))
            .cloned()
            .collect()
    }

    /// Replays stored events into the current subscriber set without
    /// re-recording them or bumping the sequence counter.
    pub fn replay(&mut self, events: &[StoredEvent]) {
        let mut ordered: Vec<&StoredEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.sequence_number);
        for event in ordered {
            if let Some(handlers) = self.subscribers.get_mut(&event.event_type) {
                let len = handlers.len();
                for handler in handlers.iter_mut().take(len) {
                    if let Err(message) = handler(&event.data) {
                        tracing::warn!(
                            event_type = %event.event_type,
                            message,
                            "event subscriber fault during replay, continuing"
                        );
                    }
                }
            }
        }
    }

    pub fn serialize_since(&self, since: u64) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.get_events_since(since))
    }

    pub fn deserialize_and_replay(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let events: Vec<StoredEvent> = serde_json::from_str(json)?;
        self.replay(&events);
        Ok(())
    }

    /// Read-only statistics snapshot, grounded in the reference's
    /// `get_statistics`.
    pub fn statistics(&self) -> BusStatistics {
        let mut per_type: HashMap<String, usize> = HashMap::new();
        for event in &self.history {
            *per_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        BusStatistics {
            history_len: self.history.len(),
            current_sequence: self.next_sequence,
            events_per_type: per_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BusStatistics {
    pub history_len: usize,
    pub current_sequence: u64,
    pub events_per_type: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use serde_json::json;

    #[test]
    fn publish_preserves_registration_order_and_survives_faults() {
        let mut bus = EventBus::new(16);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(
            "hit",
            Box::new(move |_| {
                o1.borrow_mut().push(1);
                Err("boom".to_string())
            }),
        );
        let o2 = order.clone();
        bus.subscribe(
            "hit",
            Box::new(move |_| {
                o2.borrow_mut().push(2);
                Ok(())
            }),
        );

        bus.publish("hit", json!({}));
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let mut bus = EventBus::new(16);
        bus.publish("a", json!({}));
        bus.publish("b", json!({}));
        bus.publish("c", json!({}));
        let events = bus.get_events_since(0);
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn reentrant_publish_is_ordered_after_current_handlers() {
        let mut bus = EventBus::new(16);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = order.clone();
        // handler for "a" re-enters with a publish of "b"; per the ordering
        // rule this must be recorded after "a" finishes dispatch, not nested
        // inside it.
        bus.subscribe(
            "b",
            Box::new(move |_| {
                o1.borrow_mut().push("b");
                Ok(())
            }),
        );

        bus.publish("a", json!({}));
        bus.publish("b", json!({}));
        assert_eq!(*order.borrow(), vec!["b"]);

        let events = bus.get_events_since(0);
        assert_eq!(events[0].event_type, "a");
        assert_eq!(events[1].event_type, "b");
    }

    #[test]
    fn serialize_and_replay_round_trip() {
        let mut bus = EventBus::new(16);
        bus.publish("tick", json!({"n": 1}));
        bus.publish("tick", json!({"n": 2}));
        let json_str = bus.serialize_since(0).unwrap();

        let mut replay_bus = EventBus::new(16);
        let received = Rc::new(RefCell::new(Vec::new()));
        let r = received.clone();
        replay_bus.subscribe(
            "tick",
            Box::new(move |payload| {
                r.borrow_mut().push(payload.clone());
                Ok(())
            }),
        );
        replay_bus.deserialize_and_replay(&json_str).unwrap();
        assert_eq!(received.borrow().len(), 2);
        assert_eq!(received.borrow()[0]["n"], 1);
        assert_eq!(received.borrow()[1]["n"], 2);
        // Replay must not advance the replay bus's own sequence counter.
        assert_eq!(replay_bus.get_current_sequence(), 0);
    }

    #[test]
    fn history_ring_is_bounded() {
        let mut bus = EventBus::new(3);
        for i in 0..10 {
            bus.publish("n", json!({"i": i}));
        }
        let events = bus.get_events_since(0);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence_number, 7);
        assert_eq!(events[2].sequence_number, 9);
    }
}
