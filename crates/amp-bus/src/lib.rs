//! # amp-bus
//!
//! A process-wide publish/subscribe bus for [`amp_protocol::Event`]s,
//! orthogonal to the command/event correlation protocol. Used for
//! observability and for the HTTP transport's wildcard `/event` SSE feed.
//!
//! A single lock guards the subscription map; callbacks run outside the
//! lock against a cloned snapshot so a callback that (un)subscribes
//! re-entrantly, or panics, cannot deadlock or poison other subscribers.
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use amp_protocol::Event;
use parking_lot::Mutex;

const WILDCARD: &str = "*";

type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: u64,
    callback: Callback,
}

/// A process-wide event bus.
///
/// Cloning shares the same underlying subscription map (it is internally
/// `Arc`-backed); construct one instance per runtime and inject it as an
/// explicit dependency rather than reaching for a global singleton.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    subscriptions: Mutex<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscriptions: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Publish an event. Type-specific subscribers run first, then wildcard
    /// subscribers. A panicking or erroring callback is isolated: this
    /// function never fails, and logs the failure with `tracing::error!`.
    pub fn publish(&self, event: &Event) {
        let snapshot = {
            let subs = self.inner.subscriptions.lock();
            let mut list: Vec<Callback> = Vec::new();
            if let Some(typed) = subs.get(event.event_type.as_str()) {
                list.extend(typed.iter().map(|s| s.callback.clone()));
            }
            if let Some(wild) = subs.get(WILDCARD) {
                list.extend(wild.iter().map(|s| s.callback.clone()));
            }
            list
        };
        for callback in snapshot {
            let event_id = event.id.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(event)));
            if result.is_err() {
                tracing::error!(event_id, "event bus subscriber panicked");
            }
        }
    }

    /// Subscribe to events of one type. Returns a handle whose
    /// [`Subscription::unsubscribe`] removes the callback.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_key(event_type.into(), callback)
    }

    /// Subscribe to every event published on the bus.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_key(WILDCARD.to_string(), callback)
    }

    fn subscribe_key<F>(&self, key: String, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscriptions
            .lock()
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        Subscription {
            bus: self.inner.clone(),
            key,
            id,
            active: true,
        }
    }

    /// A lazily-pulled stream of every published event. The underlying
    /// subscription is removed when the returned [`BusStream`] is dropped.
    #[must_use]
    pub fn stream(&self) -> BusStream {
        let (tx, rx) = tokio::sync::mpsc::channel(256);
        let sub = self.subscribe_all(move |ev| {
            let _ = tx.try_send(ev.clone());
        });
        BusStream {
            inner: tokio_stream::wrappers::ReceiverStream::new(rx),
            _subscription: sub,
        }
    }

    fn unsubscribe(&self, key: &str, id: u64) {
        let mut subs = self.inner.subscriptions.lock();
        if let Some(list) = subs.get_mut(key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subs.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(key)
            .map_or(0, Vec::len)
    }
}

/// An active subscription. Dropping it unsubscribes; [`Subscription::unsubscribe`]
/// is the same action spelled out explicitly for callers that want to
/// retire a subscription before the handle would otherwise go out of scope.
pub struct Subscription {
    bus: Arc<Inner>,
    key: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.active = false;
        EventBus {
            inner: self.bus.clone(),
        }
        .unsubscribe(&self.key, self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active {
            EventBus {
                inner: self.bus.clone(),
            }
            .unsubscribe(&self.key, self.id);
        }
    }
}

/// A stream of every event published on a bus, paired with the subscription
/// that feeds it so the subscription is torn down automatically on drop.
pub struct BusStream {
    inner: tokio_stream::wrappers::ReceiverStream<Event>,
    _subscription: Subscription,
}

impl futures::Stream for BusStream {
    type Item = Event;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn publish_invokes_type_specific_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = bus.subscribe("content.delta", move |ev| {
            seen2.lock().unwrap().push(ev.event_type.clone());
        });
        bus.publish(&Event::uncorrelated("content.delta", json!({})));
        bus.publish(&Event::uncorrelated("other", json!({})));
        assert_eq!(*seen.lock().unwrap(), vec!["content.delta".to_string()]);
    }

    #[test]
    fn subscribe_all_receives_everything() {
        let bus = EventBus::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        let _sub = bus.subscribe_all(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&Event::uncorrelated("a", json!({})));
        bus.publish(&Event::uncorrelated("b", json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        let sub = bus.subscribe("x", move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&Event::uncorrelated("x", json!({})));
        sub.unsubscribe();
        bus.publish(&Event::uncorrelated("x", json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_subscriber_does_not_prevent_others() {
        let bus = EventBus::new();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = ran.clone();
        let _panicker = bus.subscribe_all(|_| panic!("boom"));
        let _ok = bus.subscribe_all(move |_| {
            ran2.store(true, Ordering::SeqCst);
        });
        bus.publish(&Event::uncorrelated("x", json!({})));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_key_is_pruned_after_last_unsubscribe() {
        let bus = EventBus::new();
        let sub = bus.subscribe("x", |_| {});
        assert_eq!(bus.subscriber_count("x"), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("x"), 0);
    }
}
