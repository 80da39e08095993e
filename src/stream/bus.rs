//! Typed publish/subscribe for stream events.
//!
//! `publish` never runs listener code on the caller. Inline handlers are run
//! by the bus's own dispatcher thread, in registration order, fed through a
//! bounded queue: an `Err` or a panic is logged and delivery continues with
//! the next handler, and a slow handler only delays other handlers. Queue
//! subscribers get events through their own bounded channel. Either way a
//! full queue loses the event instead of stalling ingestion.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Events waiting for the inline dispatcher.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type InlineHandler<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

enum Handler<T> {
    Inline(InlineHandler<T>),
    Queue(mpsc::Sender<T>),
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::Inline(f) => Handler::Inline(Arc::clone(f)),
            Handler::Queue(tx) => Handler::Queue(tx.clone()),
        }
    }
}

type Registry<T> = Arc<RwLock<Vec<(SubscriptionId, Handler<T>)>>>;

/// Outcome of one `publish` call: how many subscribers the event was handed
/// to, and how many lost it to a full queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct EventBus<T> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: Registry<T>,
    dispatch: OnceLock<mpsc::Sender<T>>,
    failures: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            handlers: Arc::new(RwLock::new(Vec::new())),
            dispatch: OnceLock::new(),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher();
        self.register(Handler::Inline(Arc::new(handler)))
    }

    /// Subscribe through a bounded queue; events are dropped for this
    /// subscriber while its queue is full.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (self.register(Handler::Queue(tx)), rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inline handler invocations that returned `Err` or panicked.
    pub fn listener_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn publish(&self, event: &T) -> Delivery {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers = snapshot(&self.handlers);

        let mut delivery = Delivery::default();
        let mut closed = Vec::new();
        let mut inline = 0;

        for (id, handler) in handlers {
            match handler {
                Handler::Inline(_) => inline += 1,
                Handler::Queue(tx) => match tx.try_send(event.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        delivery.dropped += 1;
                        debug!(bus = self.name, listener = id.0, "Listener queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
                },
            }
        }

        if inline > 0 {
            match self.dispatcher().try_send(event.clone()) {
                Ok(()) => delivery.delivered += inline,
                Err(_) => {
                    delivery.dropped += inline;
                    debug!(bus = self.name, "Dispatch queue unavailable, event dropped");
                }
            }
        }

        for id in closed {
            self.unsubscribe(id);
        }

        delivery
    }

    fn register(&self, handler: Handler<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    /// Starts the dispatcher thread on first use. It exits once the bus is
    /// dropped and the queue drains.
    fn dispatcher(&self) -> &mpsc::Sender<T> {
        self.dispatch.get_or_init(|| {
            let (tx, mut rx) = mpsc::channel::<T>(DISPATCH_QUEUE_CAPACITY);
            let name = self.name;
            let handlers = Arc::clone(&self.handlers);
            let failures = Arc::clone(&self.failures);

            let spawned = std::thread::Builder::new()
                .name(format!("{name}-listeners"))
                .spawn(move || {
                    while let Some(event) = rx.blocking_recv() {
                        dispatch(name, &handlers, &failures, &event);
                    }
                });
            // A dead dispatcher closes the queue; publish then counts drops.
            if let Err(e) = spawned {
                error!(bus = name, error = %e, "Failed to start listener dispatcher");
            }
            tx
        })
    }
}

fn snapshot<T>(handlers: &Registry<T>) -> Vec<(SubscriptionId, Handler<T>)> {
    handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn dispatch<T>(name: &'static str, handlers: &Registry<T>, failures: &AtomicU64, event: &T) {
    for (id, handler) in snapshot(handlers) {
        let Handler::Inline(f) = handler else { continue };
        match catch_unwind(AssertUnwindSafe(|| f(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(bus = name, listener = id.0, error = %e, "Listener failed");
            }
            Err(_) => {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!(bus = name, listener = id.0, "Listener panicked");
            }
        }
    }
}
