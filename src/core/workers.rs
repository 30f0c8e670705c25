//! # Live worker roster.
//!
//! Counts running supervisors and signals the keep-alive loop whenever one
//! goes away. A supervisor holds an [`AliveGuard`] for its whole life; the
//! guard's `Drop` is the death signal, so it fires on every exit path,
//! unwinding included.
//!
//! ```text
//! spawn ──► enlist() ──► live += 1 ──► AliveGuard
//!                                           │ drop
//!                         live -= 1 ◄───────┤
//!                         died.notify_one() ◄┘ ──► keep-alive wakes
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

pub(crate) struct WorkerSet {
    live: watch::Sender<usize>,
    died: Notify,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerSet {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            live: watch::Sender::new(0),
            died: Notify::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Counts one more live worker until the returned guard is dropped.
    pub(crate) fn enlist(self: &Arc<Self>) -> AliveGuard {
        self.live.send_modify(|n| *n += 1);
        AliveGuard {
            set: Arc::clone(self),
        }
    }

    /// Keeps a supervisor's join handle, forgetting finished ones.
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Takes every tracked handle.
    pub(crate) fn take_handles(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn live(&self) -> usize {
        *self.live.borrow()
    }

    /// Observes the live count.
    pub(crate) fn watch(&self) -> watch::Receiver<usize> {
        self.live.subscribe()
    }

    /// Resolves after a worker exits. A death with nobody waiting is remembered.
    pub(crate) async fn died(&self) {
        self.died.notified().await;
    }
}

/// Liveness token of one supervisor.
pub(crate) struct AliveGuard {
    set: Arc<WorkerSet>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.set.live.send_modify(|n| *n = n.saturating_sub(1));
        self.set.died.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn guard_drop_decrements_and_signals() {
        let set = WorkerSet::new();
        let a = set.enlist();
        let b = set.enlist();
        assert_eq!(set.live(), 2);

        drop(a);
        assert_eq!(set.live(), 1);
        // Permit stored before anyone waited.
        tokio::time::timeout(Duration::from_secs(1), set.died())
            .await
            .unwrap();

        let mut live = set.watch();
        drop(b);
        live.wait_for(|n| *n == 0).await.unwrap();
    }

    #[tokio::test]
    async fn guard_survives_a_panicking_holder() {
        let set = WorkerSet::new();
        let guard = set.enlist();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("supervisor blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert_eq!(set.live(), 0);
    }
}
