use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use workvisor::{
    ConcurrencyKind, Event, EventKind, Fetch, Jitter, PoolBuilder, PoolConfig, ProcessExecutor,
    RespawnPolicy, Subscribe, TaskError, Wait, WorkerPool,
};

fn worker() -> ProcessExecutor<Value, i64> {
    ProcessExecutor::new(env!("CARGO_BIN_EXE_workvisor-worker"))
}

fn pool(size: usize) -> WorkerPool<Value, i64> {
    PoolBuilder::new(worker()).with_size(size).build().unwrap()
}

async fn wait_alive(pool: &WorkerPool<Value, i64>, n: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while pool.alive() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("pool never reached {n} live workers (now {})", pool.alive()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_processes_compute_results() {
    let pool = pool(2);
    assert_eq!(pool.kind(), ConcurrencyKind::Process);

    let handles = pool
        .submit_many([
            json!({ "op": "square", "x": 12 }),
            json!({ "op": "sum", "xs": [1, 2, 3, 4] }),
            json!({ "op": "sleep", "ms": 30 }),
        ])
        .unwrap();
    assert_eq!(
        pool.get_many(&handles, Wait::Timeout(Duration::from_secs(10))).await,
        vec![Fetch::Ready(144), Fetch::Ready(10), Fetch::Ready(30)]
    );
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_errors_are_stored_per_task() {
    let pool = pool(1);

    let failed = pool
        .submit(json!({ "op": "fail", "reason": "corrupt frame" }))
        .unwrap();
    let panicked = pool.submit(json!({ "op": "panic" })).unwrap();
    let bogus = pool.submit(json!({ "op": "transcode" })).unwrap();
    let fine = pool.submit(json!({ "op": "square", "x": 3 })).unwrap();

    let wait = Wait::Timeout(Duration::from_secs(10));
    assert_eq!(
        pool.get(failed, wait).await,
        Fetch::Failed(TaskError::failed("corrupt frame"))
    );
    assert_eq!(
        pool.get(panicked, wait).await,
        Fetch::Failed(TaskError::Panicked {
            info: "job asked to panic".into()
        })
    );
    assert!(matches!(
        pool.get(bogus, wait).await,
        Fetch::Failed(TaskError::Protocol { .. })
    ));
    assert_eq!(pool.get(fine, wait).await, Fetch::Ready(9));
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crashed_child_is_reported_and_replaced() {
    let pool = pool(2);
    wait_alive(&pool, 2).await;

    let crash = pool.submit(json!({ "op": "crash", "code": 3 })).unwrap();
    match pool.get(crash, Wait::Timeout(Duration::from_secs(10))).await {
        Fetch::Failed(TaskError::WorkerLost { reason }) => {
            assert!(reason.contains('3'), "exit code missing from {reason:?}");
        }
        other => panic!("unexpected {other:?}"),
    }

    wait_alive(&pool, 2).await;
    let h = pool.submit(json!({ "op": "square", "x": 7 })).unwrap();
    assert_eq!(
        pool.get(h, Wait::Timeout(Duration::from_secs(10))).await,
        Fetch::Ready(49)
    );
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn routine_state_lives_as_long_as_the_child() {
    let pool = pool(1);

    let counts = pool
        .submit_many([
            json!({ "op": "count" }),
            json!({ "op": "skip" }),
            json!({ "op": "count" }),
        ])
        .unwrap();
    pool.join().await;
    assert_eq!(
        pool.get_many(&counts, Wait::NonBlocking).await,
        vec![Fetch::Ready(1), Fetch::Pending, Fetch::Ready(3)]
    );
    pool.close().await;
    assert_eq!(pool.alive(), 0);
}

#[derive(Default)]
struct Failures(Mutex<Vec<Event>>);

#[async_trait]
impl Subscribe for Failures {
    async fn on_event(&self, ev: &Event) {
        if matches!(ev.kind, EventKind::WorkerSpawnFailed | EventKind::RespawnBackoff) {
            self.0.lock().unwrap().push(ev.clone());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_startup_backs_off_and_keeps_tasks_queued() {
    let failures = Arc::new(Failures::default());
    let cfg = PoolConfig {
        respawn: RespawnPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_millis(40),
            factor: 2.0,
            jitter: Jitter::None,
        },
        ..PoolConfig::with_size(1)
    };
    let pool: WorkerPool<Value, i64> =
        PoolBuilder::new(worker().env("WORKVISOR_FAIL_START", "1"))
            .with_config(cfg)
            .with_subscriber(failures.clone())
            .build()
            .unwrap();

    let h = pool.submit(json!({ "op": "square", "x": 2 })).unwrap();
    assert_eq!(
        pool.get(h, Wait::Timeout(Duration::from_millis(300))).await,
        Fetch::TimedOut
    );
    assert_eq!(pool.alive(), 0);

    pool.close().await;
    assert!(matches!(
        pool.try_get(h),
        Fetch::Failed(TaskError::WorkerLost { .. })
    ));

    let events = failures.0.lock().unwrap();
    let spawn_failures = events
        .iter()
        .filter(|e| e.kind == EventKind::WorkerSpawnFailed)
        .count();
    assert!(spawn_failures >= 2, "{spawn_failures} launch failures");
    let first = events
        .iter()
        .find(|e| e.kind == EventKind::RespawnBackoff)
        .and_then(|e| e.delay_ms);
    assert_eq!(first, Some(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_program_fails_to_launch() {
    let pool: WorkerPool<Value, i64> = PoolBuilder::new(ProcessExecutor::new(
        "/nonexistent/workvisor-worker",
    ))
    .build()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.alive(), 0);
    pool.close().await;
}
