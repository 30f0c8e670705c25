//! # Keep-alive loop: holds the live worker count at target.
//!
//! One background task per pool. Each pass:
//!
//! ```text
//! loop {
//!   while live < target:
//!       launch worker ──┬─ Ok  ──► spawn supervisor, failures = 0
//!                       └─ Err ──► WorkerSpawnFailed, RespawnBackoff, sleep(delay(failures++))
//!   retire_surplus()            (live > target ──► poison sentinels)
//!   wait for: worker death | target change | heal_interval | cancel
//! }
//! ```
//!
//! ## Rules
//! - A crashed worker is replaced immediately: its guard's drop wakes this loop.
//! - Only failed *launches* back off; a worker dying mid-task does not.
//! - Launch runs outside any lock; a worker launched after cancellation is
//!   shut down instead of supervised.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::core::pool::Shared;
use crate::core::supervisor::WorkerSupervisor;
use crate::error::PoolError;
use crate::events::{Event, EventKind};
use crate::tasks::WorkerId;

impl<P, O> Shared<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    /// Launches one worker and starts its supervisor.
    pub(crate) async fn spawn_worker(self: &Arc<Self>) -> Result<(), PoolError> {
        let id = WorkerId(self.next_worker.fetch_add(1, Ordering::Relaxed));
        let mut worker = self.executor.launch(id, &self.cfg).await?;
        if self.token.is_cancelled() {
            worker.shutdown().await;
            return Ok(());
        }

        let alive = self.workers.enlist();
        self.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_worker(id)
                .with_size(self.workers.live()),
        );
        let supervisor = WorkerSupervisor::new(id, worker, Arc::clone(self), alive);
        self.workers.track(tokio::spawn(async move {
            supervisor.run().await;
        }));
        Ok(())
    }
}

/// Runs until the pool's token is cancelled.
pub(crate) async fn keep_alive<P, O>(shared: Arc<Shared<P, O>>)
where
    P: Send + 'static,
    O: Send + 'static,
{
    let token = shared.token.clone();
    let mut target = shared.target.subscribe();
    let mut failures: u32 = 0;

    while !token.is_cancelled() {
        loop {
            let want = *target.borrow_and_update();
            if shared.workers.live() >= want {
                break;
            }
            if token.is_cancelled() {
                return;
            }
            match shared.spawn_worker().await {
                Ok(()) => failures = 0,
                Err(e) => {
                    let worker = match &e {
                        PoolError::Spawn { worker, .. } => Some(*worker),
                        _ => None,
                    };
                    let mut failed = Event::new(EventKind::WorkerSpawnFailed).with_reason(e.to_string());
                    if let Some(worker) = worker {
                        failed = failed.with_worker(worker);
                    }
                    shared.bus.publish(failed);

                    let delay = shared.cfg.respawn.delay(failures);
                    failures = failures.saturating_add(1);
                    shared.bus.publish(
                        Event::new(EventKind::RespawnBackoff)
                            .with_delay(delay)
                            .with_attempt(failures),
                    );
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        shared.retire_surplus();

        tokio::select! {
            _ = token.cancelled() => break,
            _ = shared.workers.died() => {}
            _ = target.changed() => {}
            _ = tokio::time::sleep(shared.cfg.heal_interval) => {}
        }
    }
}
