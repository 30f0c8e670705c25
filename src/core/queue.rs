//! # Task queue shared by producers and worker supervisors.
//!
//! Multi-producer multi-consumer FIFO built on an unbounded `mpsc` channel
//! whose receiver is shared behind an async mutex: whichever supervisor holds
//! the lock is the next one to receive.
//!
//! ```text
//! submit ──► push(Task) ──┐
//! retire ──► push_poison ─┼──► [ Task | Task | Poison | Task ] ──► pop() ──► supervisor
//! ```
//!
//! ## Accounting
//! - `unfinished`: tasks pushed and not yet marked done; [`TaskQueue::join`] waits for zero.
//! - `queued`: tasks waiting in the channel (not yet popped).
//! - `poison_pending`: sentinels pushed and not yet consumed; surplus
//!   retirement subtracts them so a shrink is never requested twice.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::tasks::Task;

/// One queue entry.
pub(crate) enum Message<P> {
    /// Work to process.
    Task(Task<P>),
    /// Sentinel telling the receiving worker to exit.
    Poison,
}

pub(crate) struct TaskQueue<P> {
    tx: mpsc::UnboundedSender<Message<P>>,
    rx: Mutex<mpsc::UnboundedReceiver<Message<P>>>,
    unfinished: watch::Sender<usize>,
    queued: AtomicUsize,
    poison_pending: AtomicUsize,
}

impl<P> TaskQueue<P> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            unfinished: watch::Sender::new(0),
            queued: AtomicUsize::new(0),
            poison_pending: AtomicUsize::new(0),
        }
    }

    /// Enqueues a task; it counts as unfinished until [`TaskQueue::task_done`].
    pub(crate) fn push(&self, task: Task<P>) {
        self.unfinished.send_modify(|n| *n += 1);
        self.queued.fetch_add(1, Ordering::SeqCst);
        // The receiver lives in `self`, so the channel cannot be closed here.
        let _ = self.tx.send(Message::Task(task));
    }

    /// Enqueues one exit sentinel behind everything already queued.
    pub(crate) fn push_poison(&self) {
        self.poison_pending.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(Message::Poison);
    }

    /// Waits for the next message, or `None` once `token` is cancelled.
    pub(crate) async fn pop(&self, token: &CancellationToken) -> Option<Message<P>> {
        let mut rx = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };
        let msg = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            msg = rx.recv() => msg?,
        };
        match &msg {
            Message::Task(_) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
            }
            Message::Poison => {
                self.poison_pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Some(msg)
    }

    /// Marks one popped task as fully handled (result stored or discarded).
    pub(crate) fn task_done(&self) {
        self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Waits until every pushed task has been marked done.
    pub(crate) async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Number of tasks waiting to be popped.
    pub(crate) fn len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Number of tasks pushed and not yet marked done.
    pub(crate) fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Number of sentinels queued and not yet consumed.
    pub(crate) fn poison_pending(&self) -> usize {
        self.poison_pending.load(Ordering::SeqCst)
    }

    /// Empties the channel, returning the tasks nobody popped.
    ///
    /// Sentinels are discarded. Returned tasks still count as unfinished;
    /// the caller marks them done once their fate is recorded.
    pub(crate) async fn drain(&self) -> Vec<Task<P>> {
        let mut rx = self.rx.lock().await;
        let mut left = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Task(task) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    left.push(task);
                }
                Message::Poison => {
                    self.poison_pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn unwrap_task<P>(msg: Option<Message<P>>) -> Task<P> {
        match msg {
            Some(Message::Task(task)) => task,
            Some(Message::Poison) => panic!("unexpected poison"),
            None => panic!("queue cancelled"),
        }
    }

    #[tokio::test]
    async fn fifo_with_poison_behind_tasks() {
        let q = TaskQueue::new();
        let token = CancellationToken::new();
        q.push(Task::new(1));
        q.push(Task::new(2));
        q.push_poison();
        assert_eq!((q.len(), q.poison_pending()), (2, 1));

        assert_eq!(*unwrap_task(q.pop(&token).await).payload(), 1);
        assert_eq!(*unwrap_task(q.pop(&token).await).payload(), 2);
        assert!(matches!(q.pop(&token).await, Some(Message::Poison)));
        assert_eq!((q.len(), q.poison_pending()), (0, 0));
    }

    #[tokio::test]
    async fn pop_returns_none_when_cancelled() {
        let q = TaskQueue::<u8>::new();
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            async move { q.pop(&token).await.is_none() }
        };
        token.cancel();
        assert!(waiter.await);
    }

    #[tokio::test]
    async fn join_waits_for_task_done_not_for_pop() {
        let q = Arc::new(TaskQueue::new());
        let token = CancellationToken::new();
        q.push(Task::new("a"));
        let _task = unwrap_task(q.pop(&token).await);
        assert_eq!(q.unfinished(), 1);

        let joiner = tokio::spawn({
            let q = Arc::clone(&q);
            async move { q.join().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joiner.is_finished());

        q.task_done();
        tokio::time::timeout(Duration::from_secs(1), joiner)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn drain_returns_leftovers_and_drops_sentinels() {
        let q = TaskQueue::new();
        q.push(Task::new(7));
        q.push_poison();
        q.push(Task::new(8));

        let left: Vec<i32> = q.drain().await.into_iter().map(Task::into_payload).collect();
        assert_eq!(left, vec![7, 8]);
        assert_eq!((q.len(), q.poison_pending(), q.unfinished()), (0, 0, 2));
    }
}
