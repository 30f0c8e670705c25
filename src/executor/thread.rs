//! # Thread backend.
//!
//! Each worker owns one routine built by the executor's factory. The routine
//! is moved onto tokio's blocking pool for every task and moved back when the
//! task completes, so its state lives as long as the worker:
//!
//! ```text
//! launch:   spawn_blocking(factory() → on_start()) ──► ThreadWorker { routine }
//! process:  routine ──► spawn_blocking(routine.process(payload)) ──► routine
//!                                     └── panic ──► TaskError::Panicked, routine lost
//! ```
//!
//! A panicking routine is treated like one that returned an error: the panic
//! is stored as the task's result and the worker exits.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinError;

use super::{ConcurrencyKind, Executor, Worker};
use crate::core::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::tasks::{Routine, Task, WorkerId};

/// Executor running routines on OS threads.
///
/// ## Example
/// ```rust
/// use workvisor::{TaskError, ThreadExecutor};
///
/// // One fresh routine per worker.
/// let executor = ThreadExecutor::new(|| |x: u64| -> Result<Option<u64>, TaskError> { Ok(Some(x * x)) });
/// # let _ = executor;
/// ```
pub struct ThreadExecutor<F> {
    factory: Arc<F>,
}

impl<F> ThreadExecutor<F> {
    /// Creates an executor calling `factory` once per launched worker.
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

#[async_trait]
impl<P, O, F, R> Executor<P, O> for ThreadExecutor<F>
where
    P: Send + 'static,
    O: Send + 'static,
    F: Fn() -> R + Send + Sync + 'static,
    R: Routine<P, O>,
{
    fn kind(&self) -> ConcurrencyKind {
        ConcurrencyKind::Thread
    }

    async fn launch(&self, id: WorkerId, _cfg: &PoolConfig) -> Result<Box<dyn Worker<P, O>>, PoolError> {
        let factory = Arc::clone(&self.factory);
        let started = tokio::task::spawn_blocking(move || {
            let mut routine = factory();
            routine.on_start().map(|()| routine)
        })
        .await;

        let spawn_error = |reason: String| PoolError::Spawn { worker: id, reason };
        match started {
            Ok(Ok(routine)) => Ok(Box::new(ThreadWorker {
                routine: Some(routine),
                _io: PhantomData,
            })),
            Ok(Err(e)) => Err(spawn_error(e.to_string())),
            Err(join) => Err(spawn_error(join_failure(join).to_string())),
        }
    }
}

struct ThreadWorker<R, P, O> {
    routine: Option<R>,
    _io: PhantomData<fn(P) -> O>,
}

#[async_trait]
impl<P, O, R> Worker<P, O> for ThreadWorker<R, P, O>
where
    P: Send + 'static,
    O: Send + 'static,
    R: Routine<P, O>,
{
    async fn process(&mut self, task: Task<P>) -> Result<Option<O>, TaskError> {
        let Some(mut routine) = self.routine.take() else {
            return Err(TaskError::WorkerLost {
                reason: "routine was lost to an earlier panic".into(),
            });
        };
        let payload = task.into_payload();

        match tokio::task::spawn_blocking(move || {
            let out = routine.process(payload);
            (routine, out)
        })
        .await
        {
            Ok((routine, out)) => {
                self.routine = Some(routine);
                out
            }
            Err(join) => Err(join_failure(join)),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(routine) = self.routine.take() {
            // Routine destructors may block (closing files, joining threads).
            let _ = tokio::task::spawn_blocking(move || drop(routine)).await;
        }
    }
}

fn join_failure(join: JoinError) -> TaskError {
    match join.try_into_panic() {
        Ok(payload) => TaskError::from_panic(payload.as_ref()),
        Err(_) => TaskError::WorkerLost {
            reason: "blocking task was cancelled".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        started: bool,
        seen: u32,
    }

    impl Routine<u32, u32> for Counter {
        fn on_start(&mut self) -> Result<(), TaskError> {
            self.started = true;
            Ok(())
        }

        fn process(&mut self, x: u32) -> Result<Option<u32>, TaskError> {
            assert!(self.started);
            self.seen += 1;
            match x {
                0 => panic!("zero is not allowed"),
                1 => Ok(None),
                _ => Ok(Some(x + self.seen)),
            }
        }
    }

    fn executor() -> ThreadExecutor<impl Fn() -> Counter + Send + Sync + 'static> {
        ThreadExecutor::new(|| Counter {
            started: false,
            seen: 0,
        })
    }

    #[tokio::test]
    async fn routine_state_survives_between_tasks() {
        let exec = executor();
        let mut worker: Box<dyn Worker<u32, u32>> = exec.launch(WorkerId(1), &PoolConfig::default()).await.unwrap();

        assert_eq!(worker.process(Task::new(10)).await, Ok(Some(11)));
        assert_eq!(worker.process(Task::new(1)).await, Ok(None));
        assert_eq!(worker.process(Task::new(10)).await, Ok(Some(13)));
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn panic_is_captured_and_ends_the_routine() {
        let exec = executor();
        let mut worker: Box<dyn Worker<u32, u32>> = exec.launch(WorkerId(1), &PoolConfig::default()).await.unwrap();

        let err = worker.process(Task::new(0)).await.unwrap_err();
        assert_eq!(
            err,
            TaskError::Panicked {
                info: "zero is not allowed".into()
            }
        );
        let err = worker.process(Task::new(5)).await.unwrap_err();
        assert_eq!(err.as_label(), "task_worker_lost");
    }

    #[tokio::test]
    async fn failing_on_start_is_a_spawn_error() {
        struct Broken;
        impl Routine<u32, u32> for Broken {
            fn on_start(&mut self) -> Result<(), TaskError> {
                Err(TaskError::failed("no model"))
            }
            fn process(&mut self, _x: u32) -> Result<Option<u32>, TaskError> {
                Ok(None)
            }
        }

        let exec = ThreadExecutor::new(|| Broken);
        let err = Executor::<u32, u32>::launch(&exec, WorkerId(7), &PoolConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            PoolError::Spawn {
                worker: WorkerId(7),
                reason: "task failed: no model".into()
            }
        );
    }
}
