/// Subscription list notified on every published snapshot field.
///
/// Handlers run on the publishing worker's thread, outside the registry
/// lock, so subscribing from inside a handler cannot deadlock. A handler
/// that panics is logged and skipped; the others still run and the worker
/// carries on.
use crate::snapshot::InfoUpdate;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capacity of a [`ObserverRegistry::subscribe_channel`] queue.
pub const CHANNEL_CAPACITY: usize = 1024;

pub type Handler = Arc<dyn Fn(&InfoUpdate) + Send + Sync>;

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscription {
    token: SubscriptionToken,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    subscriptions: RwLock<Vec<Subscription>>,
    next_token: AtomicU64,
}

/// Thread-safe observer registry. Clones share the same subscription list.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. Registering the same `Arc` again returns the
    /// existing token and does not add a second invocation.
    pub fn subscribe(&self, handler: Handler) -> SubscriptionToken {
        let mut subs = self.inner.subscriptions.write();
        if let Some(existing) = subs.iter().find(|s| Arc::ptr_eq(&s.handler, &handler)) {
            return existing.token;
        }
        let token = SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscription { token, handler });
        debug!("Observer {:?} subscribed ({} total)", token, subs.len());
        token
    }

    /// Remove `handler` if registered.
    pub fn unsubscribe(&self, handler: &Handler) {
        self.inner
            .subscriptions
            .write()
            .retain(|s| !Arc::ptr_eq(&s.handler, handler));
    }

    pub fn unsubscribe_token(&self, token: SubscriptionToken) {
        self.inner.subscriptions.write().retain(|s| s.token != token);
    }

    /// Deliver updates into a bounded channel instead of a callback. When
    /// the receiver falls behind, updates are dropped rather than blocking
    /// the publishing worker. The subscription ends once the receiver is
    /// dropped and the next publish notices it.
    pub fn subscribe_channel(&self) -> (SubscriptionToken, Receiver<InfoUpdate>) {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let registry = Arc::downgrade(&self.inner);
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionToken>>> = Arc::default();
        let own_token = Arc::clone(&slot);

        let handler: Handler = Arc::new(move |update: &InfoUpdate| {
            if forward(&tx, update) {
                return;
            }
            // Receiver gone: unregister.
            if let (Some(inner), Some(token)) = (registry.upgrade(), *own_token.lock()) {
                inner.subscriptions.write().retain(|s| s.token != token);
            }
        });

        let token = self.subscribe(handler);
        *slot.lock() = Some(token);
        (token, rx)
    }

    pub fn len(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler with `update`.
    pub fn publish(&self, update: &InfoUpdate) {
        let handlers: Vec<(SubscriptionToken, Handler)> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .map(|s| (s.token, Arc::clone(&s.handler)))
            .collect();

        for (token, handler) in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(update)));
            if outcome.is_err() {
                warn!(
                    "Observer {:?} panicked handling {}; continuing",
                    token,
                    update.key.as_str()
                );
            }
        }
    }
}

/// `false` once the receiving side is gone.
fn forward(tx: &Sender<InfoUpdate>, update: &InfoUpdate) -> bool {
    match tx.try_send(update.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("Observer channel full, dropping {}", update.key.as_str());
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{InfoKey, InfoValue};
    use std::sync::atomic::AtomicUsize;

    fn update() -> InfoUpdate {
        InfoUpdate {
            generation: 1,
            key: InfoKey::Cpu,
            value: InfoValue::Text("Intel(R) Core(TM) i5-8250U".into()),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: Handler = Arc::new(move |_: &InfoUpdate| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn double_subscribe_invokes_once() {
        let registry = ObserverRegistry::new();
        let (count, handler) = counter();
        let a = registry.subscribe(Arc::clone(&handler));
        let b = registry.subscribe(Arc::clone(&handler));
        assert_eq!(a, b);
        registry.publish(&update());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_unknown_is_noop() {
        let registry = ObserverRegistry::new();
        let (_, handler) = counter();
        registry.unsubscribe(&handler);
        registry.unsubscribe_token(SubscriptionToken(42));
        assert!(registry.is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = ObserverRegistry::new();
        let (count, handler) = counter();
        registry.subscribe(Arc::clone(&handler));
        registry.unsubscribe(&handler);
        registry.publish(&update());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let registry = ObserverRegistry::new();
        registry.subscribe(Arc::new(|_: &InfoUpdate| panic!("handler bug")));
        let (count, handler) = counter();
        registry.subscribe(handler);
        registry.publish(&update());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn channel_receives_updates_and_unsubscribes_when_dropped() {
        let registry = ObserverRegistry::new();
        let (_, rx) = registry.subscribe_channel();
        registry.publish(&update());
        assert_eq!(rx.try_recv().map(|u| u.key), Ok(InfoKey::Cpu));

        drop(rx);
        registry.publish(&update());
        assert!(registry.is_empty());
    }

    #[test]
    fn subscribing_from_a_handler_does_not_deadlock() {
        let registry = ObserverRegistry::new();
        let inner = registry.clone();
        registry.subscribe(Arc::new(move |_: &InfoUpdate| {
            inner.subscribe(Arc::new(|_: &InfoUpdate| {}));
        }));
        registry.publish(&update());
        assert_eq!(registry.len(), 2);
    }
}
