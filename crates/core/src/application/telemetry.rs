// Telemetry Bus: in-process pub/sub for lifecycle events.
// Subscriber invocation is panic-isolated via `panic_guard::execute_guarded`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::panic_guard::execute_guarded;

/// `job:start`, `job:complete`, `job:fail`, `job:discard`, and friends. Kept
/// as a plain string rather than an enum so new call sites never need a core
/// change to emit a new event name; the event name strings are the contract,
/// not a closed Rust type.
#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub fields: Value,
}

impl TelemetryEvent {
    pub fn new(event: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            timestamp,
            fields: Value::Object(Default::default()),
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

enum EventPattern {
    Exact(String),
    Wildcard,
}

impl EventPattern {
    fn matches(&self, event: &str) -> bool {
        match self {
            EventPattern::Exact(name) => name == event,
            EventPattern::Wildcard => true,
        }
    }
}

struct Subscription {
    pattern: EventPattern,
    once: bool,
    handler: Box<dyn Fn(&TelemetryEvent) + Send + Sync>,
}

/// `RwLock<HashMap<..>>` rather than a global/static: the Orchestrator owns
/// one instance so tests can create and tear down independent buses without
/// interfering with each other.
#[derive(Default)]
pub struct TelemetryBus {
    next_id: AtomicU64,
    subscriptions: RwLock<HashMap<u64, Subscription>>,
}

impl TelemetryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a specific event name. Returns an id; pass it to
    /// `unsubscribe` to stop receiving events.
    pub fn on(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&TelemetryEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(EventPattern::Exact(event.into()), false, handler)
    }

    /// Subscribe to every event.
    pub fn on_all(&self, handler: impl Fn(&TelemetryEvent) + Send + Sync + 'static) -> SubscriptionId {
        self.subscribe(EventPattern::Wildcard, false, handler)
    }

    /// Auto-unsubscribing variant of `on`: the handler fires at most once.
    pub fn once(
        &self,
        event: impl Into<String>,
        handler: impl Fn(&TelemetryEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe(EventPattern::Exact(event.into()), true, handler)
    }

    fn subscribe(
        &self,
        pattern: EventPattern,
        once: bool,
        handler: impl Fn(&TelemetryEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.write().expect("telemetry lock poisoned").insert(
            id,
            Subscription {
                pattern,
                once,
                handler: Box::new(handler),
            },
        );
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions
            .write()
            .expect("telemetry lock poisoned")
            .remove(&id.0);
    }

    /// Invokes every matching handler with `event`, in subscription order.
    /// A panicking handler is caught and logged; it never reaches the
    /// caller, and it never prevents other subscribers from running.
    pub fn emit(&self, event: TelemetryEvent) {
        tracing::debug!(event = %event.event, "telemetry event emitted");
        let once_ids: Vec<u64> = {
            let guard = self.subscriptions.read().expect("telemetry lock poisoned");
            let mut fired_once = Vec::new();
            for (id, sub) in guard.iter() {
                if sub.pattern.matches(&event.event) {
                    let handler = &sub.handler;
                    let event_ref = &event;
                    let _ = execute_guarded(std::panic::AssertUnwindSafe(|| handler(event_ref)));
                    if sub.once {
                        fired_once.push(*id);
                    }
                }
            }
            fired_once
        };
        if !once_ids.is_empty() {
            let mut guard = self.subscriptions.write().expect("telemetry lock poisoned");
            for id in once_ids {
                guard.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn wildcard_receives_every_event() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.on_all(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(TelemetryEvent::new("job:start", Utc::now()));
        bus.emit(TelemetryEvent::new("job:complete", Utc::now()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_auto_unsubscribes() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.once("job:start", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(TelemetryEvent::new("job:start", Utc::now()));
        bus.emit(TelemetryEvent::new("job:start", Utc::now()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_other_subscribers() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        bus.on("job:start", |_| panic!("boom"));
        bus.on("job:start", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(TelemetryEvent::new("job:start", Utc::now()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = TelemetryBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let id = bus.on("job:start", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.unsubscribe(id);
        bus.emit(TelemetryEvent::new("job:start", Utc::now()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
