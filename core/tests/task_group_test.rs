use async_trait::async_trait;
use metronome::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

struct CountingTask {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskFunc for CountingTask {
    async fn call(&self, _cancel: CancellationToken) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Signals the harness on entry, then ignores cancellation and blocks until released.
struct BlockingTask {
    started: mpsc::UnboundedSender<()>,
    release: Arc<Notify>,
}

#[async_trait]
impl TaskFunc for BlockingTask {
    async fn call(&self, _cancel: CancellationToken) {
        let _ = self.started.send(());
        self.release.notified().await;
    }
}

/// Always refuses to decide, with no retry interval.
struct BrokenSchedule;

impl TaskSchedule for BrokenSchedule {
    fn next(&self) -> ScheduleDecision {
        ScheduleDecision::Fail(Duration::ZERO, "backing store unavailable".into())
    }
}

/// Fails the first evaluation with a short retry, decides normally afterwards.
struct FlakySchedule {
    failed: AtomicBool,
}

impl FlakySchedule {
    fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
        }
    }
}

impl TaskSchedule for FlakySchedule {
    fn next(&self) -> ScheduleDecision {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return ScheduleDecision::Fail(Duration::from_millis(1), "not ready yet".into());
        }
        ScheduleDecision::Run(Duration::from_secs(1))
    }
}

fn counting_task() -> (CountingTask, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (
        CountingTask {
            count: count.clone(),
        },
        count,
    )
}

#[tokio::test(start_paused = true)]
async fn test_immediate_execution() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group.add(task, TaskScheduleEvery::from_secs(1)).await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "the first tick should fire immediately"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_execution() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group
        .add(task, TaskScheduleEvery::new(Duration::from_millis(250)))
        .await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(390)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        2,
        "the second tick should land one interval after the first"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_parks() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group.add(task, TaskScheduleEvery::new(Duration::ZERO)).await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        0,
        "a zero interval parks the task, no tick may fire"
    );

    assert!(
        group.stop(Duration::from_secs(1)).await.is_ok(),
        "a parked task must still honor cancellation"
    );
}

#[tokio::test(start_paused = true)]
async fn test_schedule_error_terminates() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group.add(task, BrokenSchedule).await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        0,
        "a schedule failure with no retry interval runs nothing"
    );

    assert!(
        group.stop(Duration::from_secs(1)).await.is_ok(),
        "the terminated worker already returned, stop has nothing to wait for"
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_schedule_error_recovers() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group.add(task, FlakySchedule::new()).await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "after the retry interval the schedule decides and the task runs"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_skip_first() {
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group
        .add(
            task,
            TaskScheduleEvery::new(Duration::from_millis(250)).skip_first(),
        )
        .await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "the immediate first tick is suppressed, only the second fires"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_ungraceful_stop() {
    let group = TaskGroup::new();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    group
        .add(
            BlockingTask {
                started: started_tx,
                release: release.clone(),
            },
            TaskScheduleEvery::from_secs(1),
        )
        .await;
    group.start(&CancellationToken::new()).await;

    started_rx.recv().await.expect("the task should have started");

    let err = group
        .stop(Duration::from_millis(1))
        .await
        .expect_err("a blocked task cannot drain in time");
    assert_eq!(err.to_string(), "Task(s) still running: IDs [0]");

    // The worker was reported, not killed: releasing it lets the group drain.
    release.notify_one();
    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_every_straggler() {
    let group = TaskGroup::new();
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    for _ in 0..2 {
        group
            .add(
                BlockingTask {
                    started: started_tx.clone(),
                    release: release.clone(),
                },
                TaskScheduleEvery::from_secs(1),
            )
            .await;
    }
    let (task, _count) = counting_task();
    group.add(task, TaskScheduleEvery::from_secs(1)).await;
    group.start(&CancellationToken::new()).await;

    started_rx.recv().await.expect("first blocker started");
    started_rx.recv().await.expect("second blocker started");

    let err = group
        .stop(Duration::from_millis(1))
        .await
        .expect_err("both blocked tasks should be reported");
    match err {
        MetronomeErrors::TasksStillRunning(ids) => {
            assert_eq!(ids, vec![0, 1], "only the blocked tasks, in index order");
        }
        other => panic!("unexpected error: {other}"),
    }

    release.notify_waiters();
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start_is_a_noop() {
    let group = TaskGroup::new();
    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_succeeds() {
    let group = TaskGroup::new();
    let (task, _count) = counting_task();
    group.add(task, TaskScheduleEvery::from_secs(1)).await;
    group.start(&CancellationToken::new()).await;

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
    assert!(
        group.stop(Duration::from_secs(1)).await.is_ok(),
        "stopping an already stopped group succeeds"
    );
}

#[tokio::test(start_paused = true)]
async fn test_add_after_start_waits_for_next_start() {
    let group = TaskGroup::new();
    let (first, first_count) = counting_task();
    group.add(first, TaskScheduleEvery::from_secs(1)).await;
    group.start(&CancellationToken::new()).await;

    tokio::time::sleep(Duration::from_millis(10)).await;

    let (second, second_count) = counting_task();
    group.add(second, TaskScheduleEvery::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        second_count.load(Ordering::SeqCst),
        0,
        "a task added after start is not running yet"
    );

    group.start(&CancellationToken::new()).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(second_count.load(Ordering::SeqCst), 1);
    assert_eq!(
        first_count.load(Ordering::SeqCst),
        1,
        "an already running task must not be launched twice"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_host_token_cancels_the_group() {
    let host = CancellationToken::new();
    let group = TaskGroup::new();
    let (task, count) = counting_task();
    group
        .add(task, TaskScheduleEvery::new(Duration::from_millis(50)))
        .await;
    group.start(&host).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    host.cancel();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        1,
        "no tick may fire after the host context is cancelled"
    );

    assert!(group.stop(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_single_task_starter() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let (stop, handle) = start(
        FnTaskFunc::new(move |_cancel| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
        TaskScheduleEvery::new(Duration::from_millis(100)),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(handle.index(), 0);

    handle.reset();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        count.load(Ordering::SeqCst),
        2,
        "a reset runs the single task again right away"
    );

    assert!(stop.stop(Duration::from_secs(1)).await.is_ok());
}
