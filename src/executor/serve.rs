//! # Child side of the process backend.
//!
//! A worker binary hands its routine to [`serve`], which speaks the protocol
//! described in the wire module over stdin/stdout and returns when the
//! worker should exit.

use std::io::{self, BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::wire::{Handshake, Reply, Request};
use crate::error::TaskError;
use crate::tasks::{Routine, TaskId};

/// Runs `routine` as a process worker until its parent stops feeding it.
///
/// ### Flow
/// 1. `on_start()`, then the handshake line (carrying the error if it failed)
/// 2. one reply line per request line, in order
/// 3. return after the first error reply, or at EOF on stdin
///
/// Panics inside the routine are caught and reported as
/// [`TaskError::Panicked`]. Stdout belongs to the protocol: the routine must
/// not print to it (stderr is inherited from the parent and free to use).
///
/// Returns `Err` only for I/O failures on the protocol pipes or an
/// undecodable request envelope.
///
/// ## Example
/// ```rust,no_run
/// use workvisor::TaskError;
///
/// fn main() -> std::io::Result<()> {
///     workvisor::serve(|frame: Vec<u8>| -> Result<Option<usize>, TaskError> {
///         Ok(Some(frame.len()))
///     })
/// }
/// ```
pub fn serve<P, O, R>(mut routine: R) -> io::Result<()>
where
    P: DeserializeOwned,
    O: Serialize,
    R: Routine<P, O>,
{
    let stdin = io::stdin();
    let mut out = io::stdout().lock();

    let started = catch_unwind(AssertUnwindSafe(|| routine.on_start()))
        .unwrap_or_else(|panic| Err(TaskError::from_panic(panic.as_ref())));
    let handshake = Handshake {
        pid: std::process::id(),
        error: started.err(),
    };
    write_line(&mut out, &handshake)?;
    if handshake.error.is_some() {
        return Ok(());
    }

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (id, result) = match decode::<P>(&line)? {
            (id, Ok(payload)) => {
                let result = catch_unwind(AssertUnwindSafe(|| routine.process(payload)))
                    .unwrap_or_else(|panic| Err(TaskError::from_panic(panic.as_ref())));
                (id, result)
            }
            (id, Err(e)) => (id, Err(e)),
        };

        let failed = result.is_err();
        write_line(
            &mut out,
            &Reply {
                id,
                result: result.transpose(),
            },
        )?;
        if failed {
            break;
        }
    }
    Ok(())
}

/// Splits decoding so a bad payload still gets a reply addressed to its task.
fn decode<P: DeserializeOwned>(line: &str) -> io::Result<(TaskId, Result<P, TaskError>)> {
    #[derive(Deserialize)]
    struct Envelope {
        id: TaskId,
        payload: serde_json::Value,
    }

    let envelope: Envelope = serde_json::from_str(line)?;
    let payload = serde_json::from_value::<P>(envelope.payload).map_err(|e| TaskError::Protocol {
        error: format!("payload decoding: {e}"),
    });
    Ok((envelope.id, payload))
}

fn write_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    out.flush()
}
