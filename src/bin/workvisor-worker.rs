//! Reference process worker.
//!
//! Reads [`Job`] requests from stdin and answers with `i64` results. The
//! integration tests drive it through `ProcessExecutor`; it also doubles as
//! a template for real worker binaries.
//!
//! `WORKVISOR_FAIL_START=1` makes the startup hook fail, for exercising the
//! respawn backoff.

use std::process;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use workvisor::{Routine, TaskError};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Job {
    Square { x: i64 },
    Sum { xs: Vec<i64> },
    Sleep { ms: u64 },
    Count,
    Skip,
    Fail { reason: String },
    Crash { code: i32 },
    Panic,
}

#[derive(Default)]
struct Jobs {
    seen: i64,
}

impl Routine<Job, i64> for Jobs {
    fn on_start(&mut self) -> Result<(), TaskError> {
        if std::env::var_os("WORKVISOR_FAIL_START").is_some() {
            return Err(TaskError::failed("startup disabled by WORKVISOR_FAIL_START"));
        }
        Ok(())
    }

    fn process(&mut self, job: Job) -> Result<Option<i64>, TaskError> {
        self.seen += 1;
        match job {
            Job::Square { x } => x
                .checked_mul(x)
                .map(Some)
                .ok_or_else(|| TaskError::failed(format!("{x}² overflows"))),
            Job::Sum { xs } => Ok(Some(xs.iter().sum())),
            Job::Sleep { ms } => {
                thread::sleep(Duration::from_millis(ms));
                Ok(Some(ms as i64))
            }
            Job::Count => Ok(Some(self.seen)),
            Job::Skip => Ok(None),
            Job::Fail { reason } => Err(TaskError::failed(reason)),
            Job::Crash { code } => process::exit(code),
            Job::Panic => panic!("job asked to panic"),
        }
    }
}

fn main() {
    if let Err(e) = workvisor::serve(Jobs::default()) {
        eprintln!("workvisor-worker: {e}");
        process::exit(1);
    }
}
