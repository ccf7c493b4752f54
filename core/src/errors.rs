use thiserror::Error;

#[allow(unused_imports)]
use crate::group::TaskGroup;

#[allow(unused_imports)]
use crate::schedule::every::TaskScheduleEvery;

/// [`MetronomeErrors`] is the main enum that contains all the errors which can be thrown by
/// metronome, it uses under the hood [`thiserror`] to make it as smooth sailing to add more
/// errors in the future as possible
#[derive(Error, Debug)]
pub enum MetronomeErrors {
    /// This error is meant to happen when [`TaskGroup::stop`] gives up waiting on its workers,
    /// i.e. the stop deadline elapsed while one or more task loops had not yet returned. The
    /// offending tasks are named by their insertion index
    #[error("Task(s) still running: IDs {0:?}")]
    TasksStillRunning(Vec<usize>),

    /// This error is meant to happen when constructing a [`TaskScheduleEvery`] from a chrono
    /// ``TimeDelta`` that cannot be represented as a standard library duration (for example
    /// a negative delta)
    #[error("The supplied timedelta is out of range for an interval duration")]
    IntervalTimedeltaOutOfRange,
}
