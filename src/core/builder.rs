use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::keepalive::keep_alive;
use super::pool::{Background, Shared, WorkerPool};
use crate::{
    core::PoolConfig,
    error::PoolError,
    events::{Bus, Event, EventKind},
    executor::Executor,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`WorkerPool`] with optional features.
pub struct PoolBuilder<P: Send + 'static, O: Send + 'static> {
    cfg: PoolConfig,
    executor: Arc<dyn Executor<P, O>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<P, O> PoolBuilder<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    /// Creates a builder with default configuration around `executor`.
    pub fn new(executor: impl Executor<P, O>) -> Self {
        Self {
            cfg: PoolConfig::default(),
            executor: Arc::new(executor),
            subscribers: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, cfg: PoolConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the initial worker count.
    pub fn with_size(mut self, size: usize) -> Self {
        self.cfg.size = size;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive pool events (spawns, exits, failures, resizes)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the pool and starts its background tasks.
    ///
    /// This consumes the builder and initializes:
    /// - the event bus and, when subscribers were given, the listener feeding them
    /// - the queue, result store and worker roster
    /// - the keep-alive loop, which launches the initial workers
    ///
    /// Returns immediately; workers come up in the background.
    ///
    /// ### Errors
    /// - [`PoolError::InvalidConfig`] when [`PoolConfig::validate`] rejects the config
    /// - [`PoolError::NoRuntime`] outside of a tokio runtime
    pub fn build(self) -> Result<WorkerPool<P, O>, PoolError> {
        self.cfg.validate()?;
        let rt = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let lifetime = CancellationToken::new();
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let rx = bus.subscribe();
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            Some(rt.spawn(listen(set, rx, lifetime.clone())))
        };

        let shared = Arc::new(Shared::new(self.cfg, self.executor, bus));
        let keepalive = rt.spawn(keep_alive(Arc::clone(&shared)));

        Ok(WorkerPool::from_parts(
            shared,
            Background {
                keepalive: Some(keepalive),
                listener,
            },
            lifetime,
        ))
    }
}

/// Forwards bus events to the subscriber set until the pool closes or is dropped.
async fn listen(set: SubscriberSet, mut rx: broadcast::Receiver<Event>, lifetime: CancellationToken) {
    loop {
        tokio::select! {
            _ = lifetime.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(ev) => {
                    let last = ev.kind == EventKind::PoolClosed;
                    set.emit(ev);
                    if last {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => set.emit(Event::subscriber_overflow("pool-listener", "lagged")),
                Err(RecvError::Closed) => break,
            }
        }
    }
    set.shutdown().await;
}
