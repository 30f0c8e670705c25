//! # WorkerPool: submit work, fetch results, resize, close.
//!
//! The pool hands tasks to a set of supervised workers through a shared
//! queue and collects their results in a shared store. The same API serves
//! thread- and process-backed pools.
//!
//! ## Architecture
//! ```text
//! submit(payload) ──► TaskQueue ──► supervisor 1 ──► Worker ──┐
//!        │                     ├──► supervisor 2 ──► Worker ──┼──► ResultStore ──► get(handle, wait)
//!        ▼                     └──► supervisor N ──► Worker ──┘
//!   TaskHandle
//!
//! keep-alive loop: live < target ──► Executor::launch ──► spawn supervisor
//!                  live > target ──► push poison sentinels
//!                  wakes on: worker death | target change | heal_interval
//!
//! close(): target = 0 ──► poison every live worker ──► wait live == 0
//!          ──► cancel ──► leftover tasks fail with WorkerLost ──► PoolClosed
//! ```
//!
//! ## Example
//! ```rust
//! use workvisor::{Fetch, TaskError, Wait, WorkerPool};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), workvisor::PoolError> {
//! let pool: WorkerPool<u64, u64> = WorkerPool::threads(2, || |n: u64| -> Result<Option<u64>, TaskError> {
//!     Ok(Some((1..=n).product()))
//! })?;
//!
//! let handles = pool.submit_many([5, 10, 3])?;
//! let results = pool.get_many(&handles, Wait::Forever).await;
//! assert_eq!(results, vec![Fetch::Ready(120), Fetch::Ready(3_628_800), Fetch::Ready(6)]);
//!
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::builder::PoolBuilder;
use crate::core::config::PoolConfig;
use crate::core::queue::TaskQueue;
use crate::core::store::{Fetch, ResultStore, Wait};
use crate::core::workers::WorkerSet;
use crate::error::{PoolError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::executor::{ConcurrencyKind, Executor, ThreadExecutor};
use crate::tasks::{Call, Invoke, Routine, Task, TaskHandle, TaskId};

/// State shared by the pool handle, the keep-alive loop and every supervisor.
pub(crate) struct Shared<P: Send + 'static, O: Send + 'static> {
    pub(crate) cfg: PoolConfig,
    pub(crate) executor: Arc<dyn Executor<P, O>>,
    pub(crate) queue: TaskQueue<P>,
    pub(crate) store: ResultStore<O>,
    pub(crate) workers: Arc<WorkerSet>,
    pub(crate) target: watch::Sender<usize>,
    pub(crate) bus: Bus,
    /// Stops the keep-alive loop and idle supervisors.
    pub(crate) token: CancellationToken,
    pub(crate) next_worker: AtomicU64,
    /// Serializes surplus retirement between the keep-alive loop and `close()`.
    pub(crate) retire: Mutex<()>,
}

impl<P, O> Shared<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    pub(crate) fn new(cfg: PoolConfig, executor: Arc<dyn Executor<P, O>>, bus: Bus) -> Self {
        let target = watch::Sender::new(cfg.size);
        Self {
            cfg,
            executor,
            queue: TaskQueue::new(),
            store: ResultStore::new(),
            workers: WorkerSet::new(),
            target,
            bus,
            token: CancellationToken::new(),
            next_worker: AtomicU64::new(1),
            retire: Mutex::new(()),
        }
    }

    pub(crate) fn target(&self) -> usize {
        *self.target.borrow()
    }

    /// Pushes one sentinel per live worker above target, minus those already queued.
    pub(crate) fn retire_surplus(&self) {
        let _serial = self.retire.lock().unwrap_or_else(PoisonError::into_inner);
        let target = self.target();
        let surplus = self
            .workers
            .live()
            .saturating_sub(target)
            .saturating_sub(self.queue.poison_pending());
        for _ in 0..surplus {
            self.queue.push_poison();
            self.bus
                .publish(Event::new(EventKind::WorkerRetiring).with_size(target));
        }
    }
}

/// Background tasks owned by the pool handle.
#[derive(Default)]
pub(crate) struct Background {
    pub(crate) keepalive: Option<JoinHandle<()>>,
    pub(crate) listener: Option<JoinHandle<()>>,
}

/// A self-healing pool of thread- or process-backed workers.
///
/// Build one with [`PoolBuilder`], or with the [`WorkerPool::threads`] /
/// [`WorkerPool::callables`] shorthands. Construction spawns the keep-alive
/// loop and returns immediately; workers come up in the background.
///
/// ### Rules
/// - Every submitted task gets a fresh identity; results are keyed by it.
/// - A routine error is stored as that task's result and surfaces only from `get`.
/// - Dropping the pool without [`WorkerPool::close`] cancels idle workers
///   but does not wait for them.
pub struct WorkerPool<P: Send + 'static, O: Send + 'static> {
    shared: Arc<Shared<P, O>>,
    background: tokio::sync::Mutex<Background>,
    closing: AtomicBool,
    closed: watch::Sender<bool>,
    /// Stops the event listener; cancelled on drop.
    lifetime: CancellationToken,
}

impl<P, O> WorkerPool<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    pub(crate) fn from_parts(
        shared: Arc<Shared<P, O>>,
        background: Background,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            shared,
            background: tokio::sync::Mutex::new(background),
            closing: AtomicBool::new(false),
            closed: watch::Sender::new(false),
            lifetime,
        }
    }

    /// Starts building a pool around `executor`.
    pub fn builder(executor: impl Executor<P, O>) -> PoolBuilder<P, O> {
        PoolBuilder::new(executor)
    }

    /// Thread-backed pool of `size` workers, one routine from `factory` per worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn threads<F, R>(size: usize, factory: F) -> Result<Self, PoolError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Routine<P, O>,
    {
        PoolBuilder::new(ThreadExecutor::new(factory))
            .with_size(size)
            .build()
    }

    /// Backend of this pool's workers.
    pub fn kind(&self) -> ConcurrencyKind {
        self.shared.executor.kind()
    }

    /// Active configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.cfg
    }

    /// Target worker count.
    pub fn size(&self) -> usize {
        self.shared.target()
    }

    /// Number of workers currently running.
    pub fn alive(&self) -> usize {
        self.shared.workers.live()
    }

    /// Number of submitted tasks not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of submitted tasks not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.shared.queue.unfinished()
    }

    /// Number of results stored and not yet fetched.
    pub fn stored(&self) -> usize {
        self.shared.store.len()
    }

    /// Returns `true` once [`WorkerPool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Changes the target worker count.
    ///
    /// Growing spawns workers right away; shrinking retires surplus workers
    /// after the tasks already queued ahead of their sentinels.
    pub fn set_size(&self, size: usize) -> Result<(), PoolError> {
        self.ensure_open()?;
        self.shared.target.send_replace(size);
        self.shared
            .bus
            .publish(Event::new(EventKind::PoolResized).with_size(size));
        Ok(())
    }

    /// Enqueues a payload as a new task.
    pub fn submit(&self, payload: P) -> Result<TaskHandle, PoolError> {
        self.submit_task(Task::new(payload))
    }

    /// Enqueues a pre-built task.
    pub fn submit_task(&self, task: Task<P>) -> Result<TaskHandle, PoolError> {
        self.ensure_open()?;
        let handle = task.handle();
        self.shared.queue.push(task);
        Ok(handle)
    }

    /// Enqueues every payload, returning handles in input order.
    pub fn submit_many(&self, payloads: impl IntoIterator<Item = P>) -> Result<Vec<TaskHandle>, PoolError> {
        self.ensure_open()?;
        Ok(payloads
            .into_iter()
            .map(|payload| {
                let task = Task::new(payload);
                let handle = task.handle();
                self.shared.queue.push(task);
                handle
            })
            .collect())
    }

    /// Fetches a result without waiting: [`Fetch::Pending`] if not computed yet.
    pub fn try_get(&self, handle: TaskHandle) -> Fetch<O> {
        self.shared
            .store
            .take(handle.id())
            .map_or(Fetch::Pending, Fetch::from)
    }

    /// Fetches a result, waiting as `wait` allows. The result is removed.
    ///
    /// Waits wake on every stored result and re-check every `poll` interval.
    pub async fn get(&self, handle: TaskHandle, wait: Wait) -> Fetch<O> {
        self.shared
            .store
            .wait(handle.id(), wait, self.shared.cfg.poll)
            .await
    }

    /// Fetches several results in input order; a timeout covers the whole call.
    pub async fn get_many(&self, handles: &[TaskHandle], wait: Wait) -> Vec<Fetch<O>> {
        let ids: Vec<TaskId> = handles.iter().map(TaskHandle::id).collect();
        self.shared
            .store
            .wait_many(&ids, wait, self.shared.cfg.poll)
            .await
    }

    /// Returns a copy of a stored result without removing it.
    pub fn peek(&self, handle: TaskHandle) -> Option<Result<O, TaskError>>
    where
        O: Clone,
    {
        self.shared.store.peek(handle.id())
    }

    /// Drops every stored result, returning how many were dropped.
    pub fn clear_results(&self) -> usize {
        self.shared.store.clear()
    }

    /// Waits until every submitted task has been processed and its result stored.
    ///
    /// Does not wait for results to be fetched. With no live workers and
    /// queued tasks, this waits until workers come back.
    pub async fn join(&self) {
        self.shared.queue.join().await;
    }

    /// Shuts the pool down; idempotent.
    ///
    /// Queued tasks are processed first: one sentinel is queued per live
    /// worker (re-checked after every exit, since a crashing worker frees its
    /// slot mid-drain) and close waits for all of them to exit. Tasks still
    /// queued afterwards, which only happens when no worker was alive to
    /// take them, are stored as [`TaskError::WorkerLost`]. A running task is
    /// never interrupted.
    ///
    /// After close, `submit*` and `set_size` return [`PoolError::Closed`];
    /// stored results remain fetchable.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            let mut closed = self.closed.subscribe();
            let _ = closed.wait_for(|done| *done).await;
            return;
        }
        let shared = &self.shared;
        shared.bus.publish(Event::new(EventKind::PoolClosing));
        shared.target.send_replace(0);

        let mut live = shared.workers.watch();
        loop {
            shared.retire_surplus();
            let remaining = *live.borrow_and_update();
            if remaining == 0 {
                break;
            }
            tokio::select! {
                _ = live.changed() => {}
                _ = tokio::time::sleep(shared.cfg.poll) => {}
            }
        }

        shared.token.cancel();
        let mut background = self.background.lock().await;
        if let Some(keepalive) = background.keepalive.take() {
            let _ = keepalive.await;
        }
        for handle in shared.workers.take_handles() {
            let _ = handle.await;
        }

        for task in shared.queue.drain().await {
            shared.store.insert(
                task.id(),
                Err(TaskError::WorkerLost {
                    reason: "pool closed before the task ran".into(),
                }),
            );
            shared.queue.task_done();
        }

        shared.bus.publish(Event::new(EventKind::PoolClosed));
        if let Some(listener) = background.listener.take() {
            let _ = listener.await;
        }
        self.closed.send_replace(true);
    }

    fn ensure_open(&self) -> Result<(), PoolError> {
        if self.is_closed() {
            Err(PoolError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<O: Send + 'static> WorkerPool<Call<O>, O> {
    /// Thread-backed pool whose tasks are closures.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// ## Example
    /// ```rust
    /// use workvisor::{Fetch, Wait, WorkerPool};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), workvisor::PoolError> {
    /// let pool = WorkerPool::<_, u32>::callables(4)?;
    /// let handles = pool.map(|x: u32| Ok(x * 2), 0..4)?;
    /// let doubled: Vec<u32> = pool
    ///     .get_many(&handles, Wait::Forever)
    ///     .await
    ///     .into_iter()
    ///     .filter_map(Fetch::ready)
    ///     .collect();
    /// assert_eq!(doubled, vec![0, 2, 4, 6]);
    /// # pool.close().await;
    /// # Ok(())
    /// # }
    /// ```
    pub fn callables(size: usize) -> Result<Self, PoolError> {
        Self::threads(size, || Invoke)
    }

    /// Enqueues one closure call.
    pub fn submit_call<F>(&self, f: F) -> Result<TaskHandle, PoolError>
    where
        F: FnOnce() -> Result<O, TaskError> + Send + 'static,
    {
        self.submit(Box::new(f))
    }

    /// Enqueues `f(item)` for every item, returning handles in input order.
    pub fn map<T, F, I>(&self, f: F, items: I) -> Result<Vec<TaskHandle>, PoolError>
    where
        T: Send + 'static,
        F: Fn(T) -> Result<O, TaskError> + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        let f = Arc::new(f);
        self.submit_many(items.into_iter().map(|item| {
            let f = Arc::clone(&f);
            Box::new(move || f(item)) as Call<O>
        }))
    }
}

impl<P, O> Drop for WorkerPool<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    fn drop(&mut self) {
        self.shared.token.cancel();
        self.lifetime.cancel();
    }
}
