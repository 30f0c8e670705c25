//! # Worker routines.
//!
//! A [`Routine`] is the long-lived processing loop of one worker. Each worker
//! owns its own routine instance for its whole life, so expensive state (a
//! loaded model, an open file, a warm cache) is set up once in
//! [`Routine::on_start`] and reused for every task the worker consumes.
//!
//! For every payload the routine returns:
//! - `Ok(Some(output))` → the output is stored as the task's result;
//! - `Ok(None)` → nothing is stored for this task;
//! - `Err(error)` → the error is stored as the task's result and the worker
//!   exits; the pool's keep-alive loop launches a replacement.
//!
//! Plain closures `FnMut(P) -> Result<Option<O>, TaskError>` are routines.
//!
//! ## Example
//! ```rust
//! use workvisor::{Routine, TaskError};
//!
//! struct Upscaler {
//!     model: Option<Vec<f32>>,
//! }
//!
//! impl Routine<Vec<u8>, usize> for Upscaler {
//!     fn on_start(&mut self) -> Result<(), TaskError> {
//!         self.model = Some(vec![0.5; 16]);
//!         Ok(())
//!     }
//!
//!     fn process(&mut self, frame: Vec<u8>) -> Result<Option<usize>, TaskError> {
//!         let model = self.model.as_ref().ok_or_else(|| TaskError::failed("no model"))?;
//!         Ok(Some(frame.len() * model.len()))
//!     }
//! }
//! ```

use crate::error::TaskError;

/// Boxed callable payload run by [`Invoke`].
pub type Call<O> = Box<dyn FnOnce() -> Result<O, TaskError> + Send + 'static>;

/// A stateful routine that turns payloads into results, one task at a time.
pub trait Routine<P, O>: Send + 'static {
    /// Runs once per worker before its first task.
    ///
    /// An error here counts as a failed launch: the worker never starts and
    /// the keep-alive loop retries after the respawn backoff.
    fn on_start(&mut self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Processes one payload.
    fn process(&mut self, payload: P) -> Result<Option<O>, TaskError>;
}

impl<P, O, F> Routine<P, O> for F
where
    F: FnMut(P) -> Result<Option<O>, TaskError> + Send + 'static,
{
    fn process(&mut self, payload: P) -> Result<Option<O>, TaskError> {
        self(payload)
    }
}

/// Routine that calls each [`Call`] payload and stores what it returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct Invoke;

impl<O: Send + 'static> Routine<Call<O>, O> for Invoke {
    fn process(&mut self, call: Call<O>) -> Result<Option<O>, TaskError> {
        call().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_keep_state_between_tasks() {
        let mut seen = 0_u32;
        let mut routine = move |x: u32| -> Result<Option<u32>, TaskError> {
            seen += 1;
            Ok(Some(x + seen))
        };
        assert_eq!(Routine::process(&mut routine, 10), Ok(Some(11)));
        assert_eq!(Routine::process(&mut routine, 10), Ok(Some(12)));
    }

    #[test]
    fn invoke_runs_the_call() {
        let call: Call<String> = Box::new(|| Ok("done".to_string()));
        assert_eq!(Invoke.process(call), Ok(Some("done".to_string())));

        let call: Call<String> = Box::new(|| Err(TaskError::failed("nope")));
        assert_eq!(Invoke.process(call), Err(TaskError::failed("nope")));
    }
}
