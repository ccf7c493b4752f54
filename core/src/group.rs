use crate::errors::MetronomeErrors;
use crate::schedule::TaskSchedule;
use crate::task::{Task, TaskFunc, TaskHandle};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

/// Smaller configured reset capacities are raised to this floor, posting a reset
/// must never block.
const MIN_RESET_CAPACITY: usize = 16;

/// This is the builder configs to use for building a [`TaskGroup`] instance.
/// By itself it should not be used, and it resides in [`TaskGroup::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = TaskGroup))]
pub struct TaskGroupConfig {
    /// The capacity of every task's bounded reset queue. Posting a reset never blocks, a
    /// post to a full queue is dropped since a pending reset already subsumes it
    ///
    /// # Default Value
    /// Every group uses 16 slots per task, values below that are raised back to 16
    #[builder(default = MIN_RESET_CAPACITY)]
    reset_capacity: usize,

    /// This part is mostly for debugging, more specifically to identify groups in trace
    /// output, you can give it your own string (ideally it should be unique)
    ///
    /// # Default Value
    /// By default, every group is labeled ``task-group``
    #[builder(default = String::from("task-group"), setter(into))]
    debug_label: String,
}

impl From<TaskGroupConfig> for TaskGroup {
    fn from(config: TaskGroupConfig) -> Self {
        Self {
            shared: Arc::new(GroupShared {
                state: Mutex::new(GroupState {
                    tasks: Vec::new(),
                    running: HashMap::new(),
                    active: 0,
                    cancel: None,
                }),
                drained: Notify::new(),
            }),
            reset_capacity: config.reset_capacity.max(MIN_RESET_CAPACITY),
            debug_label: Arc::from(config.debug_label),
        }
    }
}

/// [`TaskGroup`] is the owner of a set of periodic tasks sharing one lifecycle: a single
/// cancellation signal, one worker per task, and a stop that waits for every worker with a
/// deadline. The host registers ``(function, schedule)`` pairs with [`TaskGroup::add`],
/// launches them with [`TaskGroup::start`] and tears the whole set down with
/// [`TaskGroup::stop`]
///
/// In a nutshell the lifecycle consists of:
/// 1. Any number of [`TaskGroup::add`] calls, before or after the group is started.
/// 2. [`TaskGroup::start`] with the host's cancellation token, every registered task that is
///    not already running is launched as an independent worker. Calling it again later only
///    launches the tasks added in the meantime.
/// 3. [`TaskGroup::stop`] with a timeout, which fires the shared cancellation signal and
///    waits for the workers to drain, naming the stragglers by index when they don't.
///
/// # Constructor(s)
/// If one wishes to construct their own [`TaskGroup`], they may do so via
/// [`TaskGroup::builder`], alternatively [`TaskGroup::new`] (or [`Default`]) builds one with
/// the default configuration
///
/// # Concurrency Invariant(s)
/// One mutex guards the task list, the running map, the wait counter and the cancellation
/// handle together. [`TaskGroup::start`] holds it for its entire body so a concurrent
/// [`TaskGroup::add`] can never be half-launched, and every worker re-acquires it once on
/// exit so the running map and the counter move in the same critical section. The running
/// map and the counter are two views of the same truth and stay in sync on every worker
/// entry and exit
///
/// # Example
/// ```ignore
/// use std::time::Duration;
/// use metronome::prelude::*;
///
/// let group = TaskGroup::new();
/// let handle = group.add(
///     FnTaskFunc::new(|_cancel| async { /* prune expired leases */ }),
///     TaskScheduleEvery::from_secs(60),
/// ).await;
///
/// group.start(&CancellationToken::new()).await;
/// handle.reset(); // run the pruner right now
/// group.stop(Duration::from_secs(5)).await?;
/// ```
///
/// # See Also
/// - [`Task`]
/// - [`TaskHandle`]
/// - [`TaskFunc`]
/// - [`TaskSchedule`]
pub struct TaskGroup {
    shared: Arc<GroupShared>,
    reset_capacity: usize,
    debug_label: Arc<str>,
}

struct GroupShared {
    state: Mutex<GroupState>,
    drained: Notify,
}

/// Everything the group mutex protects. ``running`` and ``active`` are updated together,
/// in the same critical section, on every worker entry and exit.
struct GroupState {
    tasks: Vec<Arc<Task>>,
    running: HashMap<usize, bool>,
    active: usize,
    cancel: Option<CancellationToken>,
}

impl Debug for TaskGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("debug_label", &self.debug_label)
            .field("reset_capacity", &self.reset_capacity)
            .finish()
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    /// Constructs a group builder. Which is used for supplying the group configuration to
    /// then construct a [`TaskGroup`], for the default configuration it may be preferred to
    /// use [`TaskGroup::new`]
    pub fn builder() -> TaskGroupConfigBuilder {
        TaskGroupConfig::builder()
    }

    /// Constructs / Creates a new [`TaskGroup`] instance with the default configuration
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Appends a new task to the group, made from the supplied function and schedule.
    /// Indices are assigned by insertion order and stay stable for the life of the group,
    /// they are the identifiers [`TaskGroup::stop`] surfaces for stragglers. Duplicate
    /// additions produce distinct tasks
    ///
    /// # Usage Note(s)
    /// May be called before or after [`TaskGroup::start`], a task added after the group was
    /// started is not running until a subsequent [`TaskGroup::start`] launches it
    ///
    /// # Returns
    /// The [`TaskHandle`] for the new task, carrying its index and the non-blocking
    /// [`TaskHandle::reset`] capability
    pub async fn add(
        &self,
        func: impl TaskFunc + 'static,
        schedule: impl TaskSchedule + 'static,
    ) -> TaskHandle {
        let mut state = self.shared.state.lock().await;
        let index = state.tasks.len();
        let task = Arc::new(Task::new(
            index,
            Arc::new(func),
            Arc::new(schedule),
            self.reset_capacity,
        ));
        let handle = task.handle();
        state.tasks.push(task);
        tracing::debug!(group = %self.debug_label, index, "task added");
        handle
    }

    /// Launches every registered task that is not already running, each as an independent
    /// worker driving its own task loop. The group's private cancellation signal is derived
    /// from ``host`` on the first call and reused afterwards, firing the host token (or
    /// calling [`TaskGroup::stop`]) cancels every worker
    ///
    /// # Usage Note(s)
    /// Returns immediately, it never blocks on the workers. Idempotent over tasks that are
    /// already running, so calling it again after further [`TaskGroup::add`]s launches only
    /// the new tasks
    pub async fn start(&self, host: &CancellationToken) {
        let mut state = self.shared.state.lock().await;
        let cancel = state
            .cancel
            .get_or_insert_with(|| host.child_token())
            .clone();

        for index in 0..state.tasks.len() {
            if state.running.get(&index).copied().unwrap_or(false) {
                continue;
            }
            state.running.insert(index, true);
            state.active += 1;

            let task = Arc::clone(&state.tasks[index]);
            let shared = Arc::clone(&self.shared);
            let cancel = cancel.clone();
            let label = Arc::clone(&self.debug_label);
            tokio::spawn(async move {
                tracing::debug!(group = %label, index, "task worker started");
                task.drive(cancel).await;

                let mut state = shared.state.lock().await;
                state.running.insert(index, false);
                state.active -= 1;
                tracing::debug!(
                    group = %label,
                    index,
                    remaining = state.active,
                    "task worker returned"
                );
                if state.active == 0 {
                    shared.drained.notify_waiters();
                }
            });
        }
    }

    /// Fires the group's cancellation signal and waits for every worker to return, up to
    /// ``timeout``. Stopping a group that was never started is a no-op that returns success,
    /// and so is stopping one that has already drained
    ///
    /// # Usage Note(s)
    /// The timeout is a diagnostic, not a kill: a task function that ignores its
    /// cancellation signal keeps running in the background and is merely reported here
    ///
    /// # Returns
    /// ``Ok(())`` once every worker has returned, otherwise
    /// [`MetronomeErrors::TasksStillRunning`] naming the indices of the tasks whose workers
    /// had not returned within the timeout
    pub async fn stop(&self, timeout: Duration) -> Result<(), MetronomeErrors> {
        {
            let state = self.shared.state.lock().await;
            let Some(cancel) = state.cancel.as_ref() else {
                return Ok(());
            };
            cancel.cancel();
        }

        let deadline = Instant::now() + timeout;
        loop {
            let mut drained = pin!(self.shared.drained.notified());
            // Register for the drain notification before re-checking the counter, a worker
            // finishing in between would otherwise be missed.
            drained.as_mut().enable();
            if self.shared.state.lock().await.active == 0 {
                return Ok(());
            }

            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                let state = self.shared.state.lock().await;
                let mut stuck: Vec<usize> = state
                    .running
                    .iter()
                    .filter_map(|(index, running)| running.then_some(*index))
                    .collect();
                if stuck.is_empty() {
                    return Ok(());
                }
                stuck.sort_unstable();
                tracing::warn!(
                    group = %self.debug_label,
                    ids = ?stuck,
                    "stop deadline elapsed with workers still running"
                );
                return Err(MetronomeErrors::TasksStillRunning(stuck));
            }
        }
    }
}

/// [`StopHandle`] is the teardown side of the single-task [`start`] convenience, it wraps
/// the underlying one-task group and delegates to [`TaskGroup::stop`]
///
/// # Usage Note(s)
/// If [`StopHandle::stop`] is never called the underlying worker keeps running, hosts are
/// expected to bind the handle to their own teardown path
///
/// # See Also
/// - [`start`]
/// - [`TaskGroup::stop`]
#[derive(Debug)]
pub struct StopHandle {
    group: TaskGroup,
}

impl StopHandle {
    /// Stops the underlying group, see [`TaskGroup::stop`]
    pub async fn stop(&self, timeout: Duration) -> Result<(), MetronomeErrors> {
        self.group.stop(timeout).await
    }
}

/// Starts a single periodic task on a fresh one-task [`TaskGroup`] with a background
/// cancellation token, shrinking the call site for hosts that only need one housekeeping
/// loop. There are no additional semantics over building the group by hand
///
/// # Returns
/// The pair of capabilities for the running task: a [`StopHandle`] delegating to
/// [`TaskGroup::stop`], and the task's [`TaskHandle`] for posting resets
///
/// # See Also
/// - [`TaskGroup`]
/// - [`StopHandle`]
/// - [`TaskHandle`]
pub async fn start(
    func: impl TaskFunc + 'static,
    schedule: impl TaskSchedule + 'static,
) -> (StopHandle, TaskHandle) {
    let group = TaskGroup::new();
    let handle = group.add(func, schedule).await;
    group.start(&CancellationToken::new()).await;
    (StopHandle { group }, handle)
}
