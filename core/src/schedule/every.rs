use crate::errors::MetronomeErrors;
use crate::schedule::{ScheduleDecision, TaskSchedule};
use chrono::TimeDelta;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[allow(unused_imports)]
use crate::task::Task;

/// [`TaskScheduleEvery`] is a straightforward implementation of the [`TaskSchedule`] trait
/// that runs [`Task`] instances at a fixed interval. The interval is defined using either a
/// [`TimeDelta`] or a [`Duration`], making it flexible for different time representations.
/// This makes it well-suited for recurring jobs such as periodic cleanup tasks, heartbeat
/// signals, polling operations... etc.
///
/// # Constructor(s)
/// When one wants to create a new [`TaskScheduleEvery`] instance, they can use a variety
/// of constructors, those being:
/// - [`TaskScheduleEvery::new`] Creates a [`TaskScheduleEvery`] with a [`Duration`]
/// - [`TaskScheduleEvery::timedelta`] Creates a [`TaskScheduleEvery`] with a [`TimeDelta`]
/// - [`TaskScheduleEvery::from_secs`] Creates a [`TaskScheduleEvery`] with an
///   interval number of seconds
/// - [`TaskScheduleEvery::from_secs_f64`] Similar to [`TaskScheduleEvery::from_secs`] but for
///   floating-point numbers for seconds
///
/// One can also construct via ``From`` trait implementations for various integer and float
/// types, those being ``u8``, ``u16``, ``u32``, ``u64``, ``f32`` and ``f64`` (all read as
/// a number of seconds)
///
/// # Skip-First Behavior
/// By default the first tick fires immediately once the task is started. Chaining
/// [`TaskScheduleEvery::skip_first`] suppresses that immediate first run: the first
/// evaluation yields [`ScheduleDecision::Skip`] and every one after it yields
/// [`ScheduleDecision::Run`]. The flag is consumed on the first evaluation, which makes this
/// schedule a stateful capability rather than a plain value
///
/// # Examples
/// ```ignore
/// use std::time::Duration;
/// use metronome::schedule::TaskScheduleEvery;
///
/// // Run every 5 seconds, but not right away
/// let schedule = TaskScheduleEvery::new(Duration::from_secs(5)).skip_first();
/// ```
///
/// # See also
/// - [`Task`]
/// - [`TaskSchedule`]
/// - [`TaskScheduleDaily`](crate::schedule::TaskScheduleDaily)
#[derive(Debug)]
pub struct TaskScheduleEvery {
    interval: Duration,
    skip_first: bool,
    first: AtomicBool,
}

impl TaskScheduleEvery {
    /// Constructs / Creates a new [`TaskScheduleEvery`] instance from a [`Duration`]. There
    /// are various other constructors, suited for other types such as
    /// - [`TaskScheduleEvery::timedelta`] for chrono [`TimeDelta`]
    /// - [`TaskScheduleEvery::from_secs`] for seconds represented as u64
    /// - [`TaskScheduleEvery::from_secs_f64`] for seconds represented as f64
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            skip_first: false,
            first: AtomicBool::new(true),
        }
    }

    /// Constructs / Creates a new [`TaskScheduleEvery`] instance from a chrono [`TimeDelta`]
    ///
    /// # Returns
    /// The newly created [`TaskScheduleEvery`], or
    /// [`MetronomeErrors::IntervalTimedeltaOutOfRange`] when the delta cannot be represented
    /// as a standard library duration (for example a negative delta)
    pub fn timedelta(interval: TimeDelta) -> Result<Self, MetronomeErrors> {
        Ok(Self::new(interval.to_std().map_err(|_| {
            MetronomeErrors::IntervalTimedeltaOutOfRange
        })?))
    }

    /// Constructs / Creates a new [`TaskScheduleEvery`] instance from a whole number
    /// of seconds
    pub fn from_secs(interval: u64) -> Self {
        Self::new(Duration::from_secs(interval))
    }

    /// Constructs / Creates a new [`TaskScheduleEvery`] instance from a floating-point
    /// number of seconds
    pub fn from_secs_f64(interval: f64) -> Self {
        Self::new(Duration::from_secs_f64(interval))
    }

    /// Suppresses the immediate first run: the first evaluation yields
    /// [`ScheduleDecision::Skip`] with the configured interval, every later one yields
    /// [`ScheduleDecision::Run`]
    pub fn skip_first(mut self) -> Self {
        self.skip_first = true;
        self
    }

    /// The configured tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TaskSchedule for TaskScheduleEvery {
    fn next(&self) -> ScheduleDecision {
        if self.skip_first && self.first.swap(false, Ordering::Relaxed) {
            return ScheduleDecision::Skip(self.interval);
        }
        ScheduleDecision::Run(self.interval)
    }
}

macro_rules! integer_from_impl {
    ($val: ty) => {
        impl From<$val> for TaskScheduleEvery {
            fn from(value: $val) -> Self {
                TaskScheduleEvery::from_secs(value as u64)
            }
        }
    };
}

integer_from_impl!(u8);
integer_from_impl!(u16);
integer_from_impl!(u32);
integer_from_impl!(u64);

impl From<f64> for TaskScheduleEvery {
    fn from(value: f64) -> Self {
        TaskScheduleEvery::from_secs_f64(value)
    }
}

impl From<f32> for TaskScheduleEvery {
    fn from(value: f32) -> Self {
        TaskScheduleEvery::from_secs_f64(value as f64)
    }
}

impl From<Duration> for TaskScheduleEvery {
    fn from(value: Duration) -> Self {
        TaskScheduleEvery::new(value)
    }
}
