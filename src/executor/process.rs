//! # Process backend.
//!
//! Each worker is a child process running a program that calls
//! [`serve`](crate::serve). The routine lives in the child; the parent only
//! ships payloads and collects results.
//!
//! ```text
//! launch:
//!   Command::spawn (stdin/stdout piped, kill_on_drop)
//!     └─► read handshake line (≤ handshake_timeout)
//!           ├─ error set / EOF / timeout ──► PoolError::Spawn (child killed)
//!           └─ ready ──► ProcessWorker
//!
//! process(task):
//!   write Request line ──► read Reply line
//!     ├─ EOF / broken pipe ──► TaskError::WorkerLost (exit status in reason)
//!     ├─ id mismatch / bad JSON ──► TaskError::Protocol
//!     └─ result ──► Ok(Some) | Ok(None) | Err
//!
//! shutdown:
//!   close stdin ──► wait ≤ stop_timeout ──► kill
//! ```

use std::ffi::{OsStr, OsString};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::wire::{Handshake, Reply, Request};
use super::{ConcurrencyKind, Executor, Worker};
use crate::core::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::tasks::{Task, WorkerId};

/// How long a dead child gets to report its exit status for error messages.
const EXIT_STATUS_GRACE: Duration = Duration::from_millis(200);

/// Executor running each worker as a child process.
///
/// The payload type must serialize and the output type deserialize; the
/// child program decodes and encodes the same types.
///
/// ## Example
/// ```rust,no_run
/// use workvisor::ProcessExecutor;
///
/// let executor: ProcessExecutor<Vec<u8>, usize> = ProcessExecutor::new("frame-encoder")
///     .arg("--quality")
///     .arg("high")
///     .env("RUST_LOG", "warn");
/// # let _ = executor;
/// ```
pub struct ProcessExecutor<P, O> {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
    _io: PhantomData<fn(P) -> O>,
}

impl<P, O> ProcessExecutor<P, O> {
    /// Creates an executor launching `program` for every worker.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            _io: PhantomData,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets one environment variable for the child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Sets the child's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl<P, O> Executor<P, O> for ProcessExecutor<P, O>
where
    P: Serialize + Send + 'static,
    O: DeserializeOwned + Send + 'static,
{
    fn kind(&self) -> ConcurrencyKind {
        ConcurrencyKind::Process
    }

    async fn launch(&self, id: WorkerId, cfg: &PoolConfig) -> Result<Box<dyn Worker<P, O>>, PoolError> {
        let spawn_error = |reason: String| PoolError::Spawn { worker: id, reason };

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| spawn_error(format!("{}: {e}", self.program.to_string_lossy())))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(spawn_error("child stdio was not captured".into()));
        };
        let mut lines = BufReader::new(stdout).lines();

        let line = match tokio::time::timeout(cfg.handshake_timeout, lines.next_line()).await {
            Err(_elapsed) => return Err(spawn_error("handshake timed out".into())),
            Ok(Err(e)) => return Err(spawn_error(format!("handshake read failed: {e}"))),
            Ok(Ok(None)) => {
                let status = exit_status(&mut child).await;
                return Err(spawn_error(format!("exited before handshake ({status})")));
            }
            Ok(Ok(Some(line))) => line,
        };
        let handshake: Handshake = serde_json::from_str(&line)
            .map_err(|e| spawn_error(format!("malformed handshake: {e}")))?;
        if let Some(err) = handshake.error {
            return Err(spawn_error(err.to_string()));
        }

        Ok(Box::new(ProcessWorker {
            child,
            stdin: Some(stdin),
            lines,
            pid: handshake.pid,
            stop_timeout: cfg.stop_timeout,
            _io: PhantomData,
        }))
    }
}

struct ProcessWorker<P, O> {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    pid: u32,
    stop_timeout: Duration,
    _io: PhantomData<fn(P) -> O>,
}

impl<P, O> ProcessWorker<P, O> {
    async fn lost(&mut self, what: &str) -> TaskError {
        self.stdin = None;
        let status = exit_status(&mut self.child).await;
        TaskError::WorkerLost {
            reason: format!("pid {} {what} ({status})", self.pid),
        }
    }
}

#[async_trait]
impl<P, O> Worker<P, O> for ProcessWorker<P, O>
where
    P: Serialize + Send + 'static,
    O: DeserializeOwned + Send + 'static,
{
    async fn process(&mut self, task: Task<P>) -> Result<Option<O>, TaskError> {
        let id = task.id();
        let mut line = serde_json::to_string(&Request {
            id,
            payload: task.payload(),
        })
        .map_err(|e| TaskError::Protocol {
            error: format!("payload encoding: {e}"),
        })?;
        line.push('\n');

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.lost("stdin already closed").await);
        };
        if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
            return Err(self.lost("stopped reading").await);
        }

        let reply = match self.lines.next_line().await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(self.lost("closed stdout").await),
            Err(e) => return Err(self.lost(&format!("stdout read failed: {e}")).await),
        };
        let reply: Reply<O> = serde_json::from_str(&reply).map_err(|e| TaskError::Protocol {
            error: format!("reply decoding: {e}"),
        })?;
        if reply.id != id {
            return Err(TaskError::Protocol {
                error: format!("reply for {} while {id} was in flight", reply.id),
            });
        }
        reply.result.transpose()
    }

    async fn shutdown(&mut self) {
        self.stdin = None;
        if tokio::time::timeout(self.stop_timeout, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
        }
    }
}

async fn exit_status(child: &mut Child) -> String {
    match tokio::time::timeout(EXIT_STATUS_GRACE, child.wait()).await {
        Ok(Ok(status)) => status.to_string(),
        Ok(Err(e)) => format!("wait failed: {e}"),
        Err(_) => "still running".to_string(),
    }
}
