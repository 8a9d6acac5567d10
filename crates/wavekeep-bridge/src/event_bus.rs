use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;
use wavekeep_core::types::{Event, EventType};

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventBus::on`] / [`EventBus::once`] / [`EventBus::on_wildcard`],
/// used to cancel a subscription via [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Topic {
    Type(EventType),
    Wildcard,
}

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    once: bool,
    handler: Handler,
}

/// Single-process typed publish/subscribe event bus (§4.11).
///
/// `emit` delivers synchronously, in FIFO registration order, to every
/// matching handler. A handler that panics is isolated: the panic is caught
/// and logged, and sibling handlers still run.
#[derive(Clone)]
pub struct EventBus {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn register(&self, topic: Topic, once: bool, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self.subscriptions.lock().expect("EventBus lock poisoned");
        subs.push(Subscription {
            id,
            topic,
            once,
            handler: Arc::new(handler),
        });
        id
    }

    /// Subscribe to a single event type.
    pub fn on(&self, event_type: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.register(Topic::Type(event_type), false, handler)
    }

    /// Subscribe to every event type.
    pub fn on_wildcard(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.register(Topic::Wildcard, false, handler)
    }

    /// Subscribe to a single event type; the handler fires at most once.
    pub fn once(&self, event_type: EventType, handler: impl Fn(&Event) + Send + Sync + 'static) -> SubscriptionId {
        self.register(Topic::Type(event_type), true, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.lock().expect("EventBus lock poisoned");
        subs.retain(|s| s.id != id);
    }

    /// Deliver `event` synchronously, in FIFO order, to every subscriber
    /// whose topic matches. Handler panics are caught and logged; they never
    /// abort delivery to the remaining subscribers.
    pub fn emit(&self, event: Event) {
        let matching: Vec<Handler> = {
            let mut subs = self.subscriptions.lock().expect("EventBus lock poisoned");
            let matching = subs
                .iter()
                .filter(|s| match s.topic {
                    Topic::Wildcard => true,
                    Topic::Type(t) => t == event.event_type,
                })
                .map(|s| s.handler.clone())
                .collect();
            subs.retain(|s| {
                let matched = match s.topic {
                    Topic::Wildcard => true,
                    Topic::Type(t) => t == event.event_type,
                };
                !(s.once && matched)
            });
            matching
        };

        for handler in matching {
            let event_ref = &event;
            let result = catch_unwind(AssertUnwindSafe(|| (handler)(event_ref)));
            if result.is_err() {
                error!(event_type = ?event.event_type, "event handler panicked, isolating and continuing");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().expect("EventBus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn event(event_type: EventType) -> Event {
        Event::new(event_type, json!({}))
    }

    #[test]
    fn delivers_to_matching_subscriber_only() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.on(EventType::TaskCompleted, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(event(EventType::TaskFailed));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        bus.emit(event(EventType::TaskCompleted));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_sees_every_event() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.on_wildcard(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(event(EventType::TaskCompleted));
        bus.emit(event(EventType::AgentIdle));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_fires_a_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        bus.once(EventType::WaveCompleted, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(event(EventType::WaveCompleted));
        bus.emit(event(EventType::WaveCompleted));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        let id = bus.on(EventType::AgentError, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        bus.unsubscribe(id);
        bus.emit(event(EventType::AgentError));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handler_does_not_block_siblings() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();

        bus.on(EventType::SystemError, |_| panic!("boom"));
        bus.on(EventType::SystemError, move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(event(EventType::SystemError));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delivery_is_fifo_per_emission() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on(EventType::TaskQueued, move |_| {
                order.lock().unwrap().push(i);
            });
        }
        bus.emit(event(EventType::TaskQueued));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
