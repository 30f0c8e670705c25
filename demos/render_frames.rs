//! # Example: render_frames
//!
//! Offline rendering: a free-running scheduler produces frame timestamps at
//! exactly `n / fps`, and a thread pool renders each frame.
//!
//! Shows how to:
//! - Drive a [`Scheduler`] with a [`TimingMode::FreeRunning`] task.
//! - Keep per-worker state in a [`Routine`] (a lookup table built once).
//! - Observe the pool through [`LogWriter`] and a `tracing` subscriber.
//! - Recover from a failing frame: the error is stored, the worker replaced.
//!
//! ## Flow
//! ```text
//! Scheduler::next() ──► tick.time = n / fps ──► pool.submit(Frame)
//!                                                   │
//!                         Renderer::process ◄───────┘  (one per worker)
//!                                │
//!                    get_many(handles, Forever) ──► checksums
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example render_frames
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use workvisor::{
    Fetch, LogWriter, PeriodicTask, PoolBuilder, Routine, Scheduler, TaskError, ThreadExecutor,
    TimingMode, Wait, WorkerPool,
};

const FPS: f64 = 24.0;
const FRAMES: usize = 48;

#[derive(Debug)]
struct Frame {
    index: u64,
    time: f64,
}

/// Renders a frame into a checksum; frame 13 is corrupt on purpose.
#[derive(Default)]
struct Renderer {
    palette: Vec<u32>,
}

impl Routine<Frame, u64> for Renderer {
    fn on_start(&mut self) -> Result<(), TaskError> {
        self.palette = (0..256_u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        Ok(())
    }

    fn process(&mut self, frame: Frame) -> Result<Option<u64>, TaskError> {
        if frame.index == 13 {
            return Err(TaskError::failed(format!("frame {} is corrupt", frame.index)));
        }
        let seed = (frame.time * 1_000.0) as usize;
        let sum = (0..64)
            .map(|px| u64::from(self.palette[(seed + px) % self.palette.len()]))
            .sum();
        Ok(Some(sum))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pool: Arc<WorkerPool<Frame, u64>> = Arc::new(
        PoolBuilder::new(ThreadExecutor::new(Renderer::default))
            .with_size(4)
            .with_subscriber(Arc::new(LogWriter::new()))
            .build()?,
    );

    let mut sched: Scheduler<()> = Scheduler::new();
    let handles = Arc::new(std::sync::Mutex::new(Vec::with_capacity(FRAMES)));
    sched.add(
        PeriodicTask::new({
            let pool = Arc::clone(&pool);
            let handles = Arc::clone(&handles);
            move |tick| {
                let handle = pool.submit(Frame {
                    index: tick.frame,
                    time: tick.time,
                })?;
                handles.lock().map_err(|e| e.to_string())?.push(handle);
                Ok(())
            }
        })
        .named("frames")
        .with_frequency(FPS)
        .with_mode(TimingMode::FreeRunning),
    )?;

    for _ in 0..FRAMES {
        sched.next()?;
    }

    let handles = handles.lock().map_err(|e| e.to_string())?.clone();
    let mut rendered = 0;
    for (n, fetch) in pool.get_many(&handles, Wait::Forever).await.into_iter().enumerate() {
        match fetch {
            Fetch::Ready(sum) => {
                rendered += 1;
                tracing::debug!(frame = n, checksum = sum, "frame rendered");
            }
            Fetch::Failed(e) => tracing::warn!(frame = n, error = %e, "frame lost"),
            Fetch::Pending | Fetch::TimedOut => unreachable!("waited forever"),
        }
    }
    println!("rendered {rendered}/{FRAMES} frames at {FPS} fps");

    pool.close().await;
    Ok(())
}
