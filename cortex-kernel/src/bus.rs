//! Typed publish/subscribe signal bus.
//!
//! Fan-out is isolated per subscription: every subscriber owns a
//! dedicated delivery worker fed by an unbounded channel, so a slow or
//! failing handler never blocks the publisher or its peers, and
//! delivery order per (signal, subscriber) is FIFO. Handler errors are
//! logged and swallowed. There are no cross-signal ordering guarantees.

use cortex_core::{Signal, SignalEvent};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What a handler returns. Errors are logged by the delivery worker and
/// never reach the publisher or sibling subscriptions.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type Handler = Arc<dyn Fn(SignalEvent) -> HandlerFuture + Send + Sync>;

/// Identifies one subscription for [`SignalBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct SubEntry {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<SignalEvent>,
    /// Cleared on unsubscribe; the worker checks it before each handler
    /// invocation so no new delivery starts after unsubscribe returns.
    active: Arc<AtomicBool>,
    throttle: Option<Duration>,
    last_delivered: Mutex<Option<Instant>>,
}

/// The process-wide signal bus. Cheap to clone; all clones share the
/// same subscription table.
#[derive(Clone)]
pub struct SignalBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    subs: RwLock<HashMap<Signal, Vec<Arc<SubEntry>>>>,
    next_id: AtomicU64,
}

impl SignalBus {
    /// Create an empty bus. Requires a tokio runtime for delivery
    /// workers spawned by `subscribe`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subs: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to a signal. The handler runs on its own delivery
    /// worker; invocations for this subscription are serialized FIFO.
    pub fn subscribe<F, Fut>(&self, signal: Signal, handler: F) -> SubscriptionId
    where
        F: Fn(SignalEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_inner(signal, None, handler)
    }

    /// Subscribe with a throttle window: publications within `window` of
    /// the last delivered one are dropped for this subscription only.
    pub fn subscribe_throttled<F, Fut>(
        &self,
        signal: Signal,
        window: Duration,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(SignalEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_inner(signal, Some(window), handler)
    }

    fn subscribe_inner<F, Fut>(
        &self,
        signal: Signal,
        throttle: Option<Duration>,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(SignalEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = mpsc::unbounded_channel::<SignalEvent>();
        let active = Arc::new(AtomicBool::new(true));
        let handler: Handler = Arc::new(move |ev| Box::pin(handler(ev)));

        let worker_active = Arc::clone(&active);
        let worker_handler = Arc::clone(&handler);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !worker_active.load(Ordering::Acquire) {
                    break;
                }
                let signal = event.signal;
                if let Err(e) = (worker_handler)(event).await {
                    tracing::warn!(signal = %signal, error = %e, "signal handler failed");
                }
            }
        });

        let entry = Arc::new(SubEntry {
            id,
            tx,
            active,
            throttle,
            last_delivered: Mutex::new(None),
        });
        self.inner
            .subs
            .write()
            .unwrap()
            .entry(signal)
            .or_default()
            .push(entry);
        id
    }

    /// Remove a subscription. Takes effect immediately: an in-flight
    /// handler finishes, but no new delivery for this subscription
    /// starts after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.inner.subs.write().unwrap();
        for entries in subs.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                let entry = entries.remove(pos);
                entry.active.store(false, Ordering::Release);
                return;
            }
        }
    }

    /// Publish a payload under a signal name. Synchronous: enqueues to
    /// every live, non-throttled subscription and returns.
    pub fn publish(&self, signal: Signal, payload: serde_json::Value) {
        self.publish_event(SignalEvent::new(signal, payload));
    }

    /// Publish a pre-built event (for callers threading a correlation id).
    pub fn publish_event(&self, event: SignalEvent) {
        let subs = self.inner.subs.read().unwrap();
        let Some(entries) = subs.get(&event.signal) else {
            return;
        };
        let now = Instant::now();
        for entry in entries {
            if let Some(window) = entry.throttle {
                let mut last = entry.last_delivered.lock().unwrap();
                if let Some(at) = *last
                    && now.duration_since(at) < window
                {
                    continue;
                }
                *last = Some(now);
            }
            // Worker gone (runtime shutdown) — nothing to deliver to.
            let _ = entry.tx.send(event.clone());
        }
    }

    /// Number of live subscriptions for a signal.
    #[must_use]
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        self.inner
            .subs
            .read()
            .unwrap()
            .get(&signal)
            .map_or(0, Vec::len)
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
