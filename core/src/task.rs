use crate::schedule::{ScheduleDecision, TaskSchedule};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

#[allow(unused_imports)]
use crate::group::TaskGroup;

/// The [`TaskFunc`] trait is the unit of work a [`Task`] carries, it is invoked by the task
/// loop on every tick that the schedule lets through. The function runs synchronously on the
/// task's own worker, the loop does not advance until it returns
///
/// # Required Method(s)
/// If one wants to implement this trait, they must provide an implementation for the
/// [`TaskFunc::call`] method. The supplied [`CancellationToken`] is the group's shared
/// cancellation signal, implementations that intend to stop promptly on shutdown should poll
/// it, the loop never cancels a running function from the outside
///
/// # Trait Implementation(s)
/// For plain closures there is the [`FnTaskFunc`] adapter which wraps any
/// ``Fn(CancellationToken) -> impl Future<Output = ()>``. This trait is also implemented for
/// any type implementing ``Deref`` where the target itself implements [`TaskFunc`], making it
/// relatively easy to store both owned and non-owned values
///
/// # Object Safety
/// This trait is object safe to use, as seen in the source code of the [`Task`] struct
///
/// # See Also
/// - [`FnTaskFunc`]
/// - [`Task`]
/// - [`TaskGroup`]
#[async_trait]
pub trait TaskFunc: Send + Sync {
    /// Runs the unit of work. Fires on every tick the schedule allows, ``cancel`` is the
    /// group's shared cancellation signal
    async fn call(&self, cancel: CancellationToken);
}

#[async_trait]
impl<T> TaskFunc for T
where
    T: Deref + Send + Sync,
    T::Target: TaskFunc,
{
    async fn call(&self, cancel: CancellationToken) {
        self.deref().call(cancel).await
    }
}

/// Represents a **function task** that directly hosts and executes a closure. It is the
/// closure-friendly counterpart of implementing [`TaskFunc`] by hand, wrapping any function
/// from a [`CancellationToken`] to a future
///
/// # Example
/// ```ignore
/// use metronome::schedule::TaskScheduleEvery;
/// use metronome::task::FnTaskFunc;
/// use metronome::group::TaskGroup;
///
/// let func = FnTaskFunc::new(|_cancel| async {
///     println!("Hello from a periodic task!");
/// });
///
/// let group = TaskGroup::new();
/// group.add(func, TaskScheduleEvery::from_secs(2)).await;
/// ```
pub struct FnTaskFunc<F: Send + Sync>(F);

impl<F, Fut> FnTaskFunc<F>
where
    Fut: Future<Output = ()> + Send,
    F: Fn(CancellationToken) -> Fut + Send + Sync,
{
    pub fn new(func: F) -> Self {
        FnTaskFunc(func)
    }
}

#[async_trait]
impl<F, Fut> TaskFunc for FnTaskFunc<F>
where
    Fut: Future<Output = ()> + Send,
    F: Fn(CancellationToken) -> Fut + Send + Sync,
{
    async fn call(&self, cancel: CancellationToken) {
        self.0(cancel).await
    }
}

/// [`TaskHandle`] is the stable handle returned by [`TaskGroup::add`], it carries the task's
/// insertion index and the reset capability. Handles are cheap to clone and remain valid for
/// the life of the group, whether or not the task is currently running
///
/// # See Also
/// - [`TaskGroup::add`]
/// - [`Task`]
#[derive(Debug, Clone)]
pub struct TaskHandle {
    index: usize,
    reset: mpsc::Sender<()>,
}

impl TaskHandle {
    /// Posts a reset to the task: the loop abandons its current wait and re-evaluates the
    /// schedule immediately, as if a fresh start just occurred
    ///
    /// # Blocking Behavior
    /// This method never blocks. The reset queue is bounded and a post to a full queue is
    /// silently dropped, a pending reset already subsumes it. Resets that accumulate while
    /// the task function is running are delivered on the next wait phase
    pub fn reset(&self) {
        let _ = self.reset.try_send(());
    }

    /// The task's insertion index inside its group, this is the identifier
    /// [`TaskGroup::stop`] surfaces for tasks that outlive the stop deadline
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A [`Task`] is one registered ``(function, schedule)`` pair, owned by its [`TaskGroup`]
/// together with the task's reset queue. Hosts never construct tasks directly, they go
/// through [`TaskGroup::add`] and hold on to the returned [`TaskHandle`]
///
/// # See Also
/// - [`TaskGroup`]
/// - [`TaskHandle`]
/// - [`TaskFunc`]
/// - [`TaskSchedule`]
pub struct Task {
    index: usize,
    func: Arc<dyn TaskFunc>,
    schedule: Arc<dyn TaskSchedule>,
    reset_tx: mpsc::Sender<()>,
    reset_rx: Mutex<mpsc::Receiver<()>>,
}

impl Task {
    pub(crate) fn new(
        index: usize,
        func: Arc<dyn TaskFunc>,
        schedule: Arc<dyn TaskSchedule>,
        reset_capacity: usize,
    ) -> Self {
        let (reset_tx, reset_rx) = mpsc::channel(reset_capacity);
        Self {
            index,
            func,
            schedule,
            reset_tx,
            reset_rx: Mutex::new(reset_rx),
        }
    }

    pub(crate) fn handle(&self) -> TaskHandle {
        TaskHandle {
            index: self.index,
            reset: self.reset_tx.clone(),
        }
    }

    /// The task's insertion index inside its group
    pub fn index(&self) -> usize {
        self.index
    }

    /// Drives this task until cancellation or until the schedule gives up. One logical
    /// worker per task runs this loop, the group's launch bookkeeping guarantees it is
    /// never entered twice concurrently (so the reset receiver lock below is uncontended)
    #[tracing::instrument(name = "task_loop", skip(self, cancel), fields(index = self.index))]
    pub(crate) async fn drive(&self, cancel: CancellationToken) {
        let mut reset = self.reset_rx.lock().await;

        // Zero delay on entry and after every reset: the first tick is due immediately.
        let mut delay = Duration::ZERO;
        loop {
            let (tick, runs_func, after_tick) = match self.schedule.next() {
                ScheduleDecision::Run(interval) | ScheduleDecision::Skip(interval)
                    if interval.is_zero() =>
                {
                    tracing::debug!("schedule yielded a zero interval, parking");
                    (None, false, Duration::ZERO)
                }
                ScheduleDecision::Run(interval) => (Some(delay), true, interval),
                ScheduleDecision::Skip(interval) => (Some(delay), false, interval),
                ScheduleDecision::Fail(interval, reason) => {
                    if interval.is_zero() {
                        tracing::warn!(%reason, "schedule failed with no retry interval, terminating");
                        return;
                    }
                    tracing::warn!(%reason, retry_in = ?interval, "schedule failed, deferring evaluation");
                    // Retry the schedule evaluation, not the task function.
                    (Some(interval), false, Duration::ZERO)
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("task loop cancelled");
                    return;
                }

                Some(_) = reset.recv() => {
                    tracing::debug!("task reset, re-evaluating the schedule");
                    delay = Duration::ZERO;
                }

                _ = tick_after(tick) => {
                    if runs_func {
                        self.func.call(cancel.clone()).await;
                        if cancel.is_cancelled() {
                            return;
                        }
                    }
                    delay = after_tick;
                }
            }
        }
    }
}

/// The tick timer for one loop iteration, ``None`` parks the task until a
/// cancellation or a reset arrives.
async fn tick_after(tick: Option<Duration>) {
    match tick {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}
