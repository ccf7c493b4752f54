use crate::schedule::every::TaskScheduleEvery;
use crate::schedule::{ScheduleDecision, TaskSchedule};
use std::time::Duration;

#[allow(unused_imports)]
use crate::task::Task;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// [`TaskScheduleDaily`] is an implementation of the [`TaskSchedule`] trait that runs a
/// [`Task`] once every 24 hours, it is a convenience over
/// [`TaskScheduleEvery`] with a fixed one-day interval
///
/// # Constructor(s)
/// If one wishes to construct a [`TaskScheduleDaily`], they can use [`TaskScheduleDaily::new`]
/// or [`TaskScheduleDaily::default`] via the [`Default`] trait. The
/// [`TaskScheduleDaily::skip_first`] option carries over from [`TaskScheduleEvery`] and
/// suppresses the immediate first run
///
/// # See also
/// - [`Task`]
/// - [`TaskSchedule`]
/// - [`TaskScheduleEvery`]
#[derive(Debug)]
pub struct TaskScheduleDaily(TaskScheduleEvery);

impl TaskScheduleDaily {
    /// Constructs / Creates a new [`TaskScheduleDaily`] instance with a 24 hour interval
    pub fn new() -> Self {
        Self(TaskScheduleEvery::new(DAY))
    }

    /// Suppresses the immediate first run, the first tick fires a day after the task starts
    pub fn skip_first(self) -> Self {
        Self(self.0.skip_first())
    }
}

impl Default for TaskScheduleDaily {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSchedule for TaskScheduleDaily {
    fn next(&self) -> ScheduleDecision {
        self.0.next()
    }
}
