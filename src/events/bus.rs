// src/events/bus.rs

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::{DevloopError, Result};

/// A named event with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    pub name: String,
    pub payload: P,
}

/// Callback invoked from a worker task for every matching event.
///
/// Handlers must not block; hand work off (e.g. `try_send`) instead.
pub type Handler<P> = Arc<dyn Fn(&Event<P>) + Send + Sync>;

/// What `emit` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    /// Wait for space.
    #[default]
    Block,
    /// Discard the event and return [`DevloopError::EventDropped`].
    Drop,
}

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub workers: usize,
    pub queue: usize,
    pub backpressure: Backpressure,
    /// How long `stop` waits for workers before aborting them.
    pub stop_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue: 100,
            backpressure: Backpressure::Block,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

struct Registry<P> {
    handlers: RwLock<HashMap<String, Vec<(u64, Handler<P>)>>>,
    next_id: AtomicU64,
}

impl<P> Registry<P> {
    fn remove(&self, name: &str, id: u64) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(name);
        }
        removed
    }

    fn snapshot(&self, name: &str) -> Vec<Handler<P>> {
        self.handlers
            .read()
            .get(name)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

/// Handle to a registered handler. Dropping it unregisters the handler.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription<P> {
    registry: Weak<Registry<P>>,
    name: String,
    id: u64,
}

impl<P> Subscription<P> {
    pub fn event(&self) -> &str {
        &self.name
    }

    /// Remove the handler now instead of on drop.
    pub fn unregister(self) {
        drop(self);
    }
}

impl<P> Drop for Subscription<P> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.name, self.id) {
                debug!(event = %self.name, id = self.id, "handler unregistered");
            }
        }
    }
}

/// In-process pub-sub: a bounded queue drained by a fixed pool of workers.
///
/// Must be created inside a tokio runtime; workers are spawned immediately.
pub struct EventBus<P> {
    registry: Arc<Registry<P>>,
    tx: Mutex<Option<mpsc::Sender<Event<P>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    config: EventBusConfig,
}

impl<P> EventBus<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(config: EventBusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let registry = Arc::new(Registry {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });
        let shutdown = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    Arc::clone(&rx),
                    Arc::clone(&registry),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self {
            registry,
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            shutdown,
            config,
        }
    }

    /// Register `handler` for events named `name`.
    pub fn on<F>(&self, name: &str, handler: F) -> Subscription<P>
    where
        F: Fn(&Event<P>) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .write()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(event = name, id, "handler registered");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            name: name.to_string(),
            id,
        }
    }

    /// Queue an event for dispatch.
    pub async fn emit(&self, name: &str, payload: P) -> Result<()> {
        let tx = self.tx.lock().clone().ok_or(DevloopError::EventBusStopped)?;
        let event = Event {
            name: name.to_string(),
            payload,
        };

        match self.config.backpressure {
            Backpressure::Block => tx
                .send(event)
                .await
                .map_err(|_| DevloopError::EventBusStopped),
            Backpressure::Drop => match tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(event)) => {
                    warn!(event = %event.name, "event queue full; dropping event");
                    Err(DevloopError::EventDropped(event.name))
                }
                Err(TrySendError::Closed(_)) => Err(DevloopError::EventBusStopped),
            },
        }
    }

    /// Number of handlers currently registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.registry
            .handlers
            .read()
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Halt the workers and discard pending events.
    ///
    /// Waits up to the configured stop timeout, then aborts any worker that
    /// is still busy. Later calls to `emit` fail.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tx.lock().take();

        let workers = std::mem::take(&mut *self.workers.lock());
        let deadline = tokio::time::Instant::now() + self.config.stop_timeout;
        for mut handle in workers {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("event worker did not stop in time; aborting");
                handle.abort();
            }
        }
        debug!("event bus stopped");
    }
}

impl<P> Drop for EventBus<P> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop<P>(
    index: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Event<P>>>>,
    registry: Arc<Registry<P>>,
    shutdown: CancellationToken,
) where
    P: Send + Sync + 'static,
{
    loop {
        let next = {
            let mut queue = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                guard = rx.lock() => guard,
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                event = queue.recv() => event,
            }
        };

        let Some(event) = next else { break };

        for handler in registry.snapshot(&event.name) {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(worker = index, event = %event.name, "event handler panicked");
            }
        }
    }
    debug!(worker = index, "event worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn handlers_receive_matching_events() {
        let bus = EventBus::<String>::new(EventBusConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.on("reload", move |ev| {
            let _ = tx.send(ev.payload.clone());
        });

        bus.emit("other", "ignored".to_string()).await.unwrap();
        bus.emit("reload", "reload".to_string()).await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("reload"));
        bus.stop().await;
    }

    #[tokio::test]
    async fn every_handler_sees_the_event() {
        let bus = EventBus::<u32>::new(EventBusConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let subs: Vec<_> = (0..3)
            .map(|_| {
                let hits = Arc::clone(&hits);
                let done_tx = done_tx.clone();
                bus.on("tick", move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let _ = done_tx.send(());
                })
            })
            .collect();

        bus.emit("tick", 1).await.unwrap();
        for _ in 0..3 {
            done_rx.recv().await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        drop(subs);
        bus.stop().await;
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let bus = EventBus::<()>::new(EventBusConfig::default());
        let sub = bus.on("reload", |_| {});
        let other = bus.on("reload", |_| {});
        assert_eq!(bus.handler_count("reload"), 2);

        sub.unregister();
        assert_eq!(bus.handler_count("reload"), 1);
        drop(other);
        assert_eq!(bus.handler_count("reload"), 0);
        bus.stop().await;
    }

    #[tokio::test]
    async fn emit_after_stop_fails() {
        let bus = EventBus::<()>::new(EventBusConfig::default());
        bus.stop().await;
        assert!(matches!(
            bus.emit("reload", ()).await,
            Err(DevloopError::EventBusStopped)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drop_policy_reports_full_queue() {
        let bus = EventBus::<u32>::new(EventBusConfig {
            workers: 1,
            queue: 1,
            backpressure: Backpressure::Drop,
            stop_timeout: Duration::from_millis(200),
        });

        let (entered_tx, entered_rx) = std::sync::mpsc::channel::<()>();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = std::sync::Mutex::new(gate_rx);
        let _sub = bus.on("slow", move |_| {
            let _ = entered_tx.send(());
            let _ = gate_rx.lock().unwrap().recv();
        });

        bus.emit("slow", 1).await.unwrap();
        tokio::task::spawn_blocking(move || entered_rx.recv().unwrap())
            .await
            .unwrap();

        bus.emit("slow", 2).await.unwrap();
        let err = bus.emit("slow", 3).await.unwrap_err();
        assert!(matches!(err, DevloopError::EventDropped(name) if name == "slow"));

        let _ = gate_tx.send(());
        let _ = gate_tx.send(());
        bus.stop().await;
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_the_worker() {
        let bus = EventBus::<()>::new(EventBusConfig {
            workers: 1,
            ..EventBusConfig::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _bad = bus.on("boom", |_| panic!("handler failure"));
        let _good = bus.on("ok", move |_| {
            let _ = tx.send(());
        });

        bus.emit("boom", ()).await.unwrap();
        bus.emit("ok", ()).await.unwrap();
        rx.recv().await.unwrap();
        bus.stop().await;
    }
}
