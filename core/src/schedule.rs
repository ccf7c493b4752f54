pub mod daily; // skipcq: RS-D1001

pub mod every; // skipcq: RS-D1001

pub use crate::schedule::daily::TaskScheduleDaily;
pub use crate::schedule::every::TaskScheduleEvery;

use std::ops::Deref;
use std::time::Duration;

#[allow(unused_imports)]
use crate::group::TaskGroup;

#[allow(unused_imports)]
use crate::task::Task;

/// [`ScheduleDecision`] is what a [`TaskSchedule`] produces on every evaluation, it tells the
/// task loop whether the upcoming tick should run the task function, silently pass, or whether
/// the schedule itself could not decide
///
/// # Interval Semantics
/// Since a [`Duration`] cannot be negative, [`Duration::ZERO`] stands in for the whole
/// "non-positive" class of intervals:
/// - [`ScheduleDecision::Run`] / [`ScheduleDecision::Skip`] with a zero interval park the task
///   indefinitely, no tick ever fires, yet the task stays cancellable and resettable
/// - [`ScheduleDecision::Fail`] with a zero interval terminates the task loop on the spot,
///   while a positive interval defers the next schedule evaluation by that amount (it retries
///   the evaluation, never the task function)
///
/// # See Also
/// - [`TaskSchedule`]
/// - [`Task`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Run the task function on the upcoming tick, then wait this interval before the
    /// next evaluation
    Run(Duration),

    /// Suppress the upcoming tick (the task function does not run), wait this interval and
    /// evaluate again. Used to defer an otherwise immediate first run
    Skip(Duration),

    /// The schedule could not decide. Carries the retry interval and an opaque reason string
    /// for the host's diagnostics, the task loop never inspects the reason beyond logging it
    Fail(Duration, String),
}

/// The [`TaskSchedule`] trait is the scheduling policy of a single [`Task`], it is a stateful
/// producer of [`ScheduleDecision`] values which the task loop consults once per iteration.
/// All the scheduling smarts live here, the loop itself only needs the three branches
///
/// # Required Method(s)
/// If one wants to implement this trait, they must provide an implementation for the
/// [`TaskSchedule::next`] method used to produce the decision for the upcoming tick. The
/// method takes ``&self``, implementations that need state (see [`TaskScheduleEvery`] with
/// its skip-first flag) keep it behind interior mutability
///
/// # Trait Implementation(s)
/// Some of the noteworthy trait implementations of this trait include:
/// - [`TaskScheduleEvery`] executes a task at a fixed interval
/// - [`TaskScheduleDaily`] executes a task once every 24 hours
///
/// This trait is also implemented for any type implementing ``Deref`` where the target is ``T``
/// which itself is an implementation of the [`TaskSchedule`] trait, making it relatively easy
/// to store both owned and non-owned values
///
/// # Object Safety
/// This trait is object safe to use, as seen in the source code of the [`Task`] struct
///
/// # See Also
/// - [`ScheduleDecision`]
/// - [`TaskScheduleEvery`]
/// - [`TaskScheduleDaily`]
/// - [`TaskGroup`]
pub trait TaskSchedule: Send + Sync {
    /// Produces the [`ScheduleDecision`] for the upcoming tick. This method is called
    /// automatically by the task loop, once on entry to every iteration
    fn next(&self) -> ScheduleDecision;
}

impl<T> TaskSchedule for T
where
    T: Deref + Send + Sync,
    T::Target: TaskSchedule,
{
    fn next(&self) -> ScheduleDecision {
        self.deref().next()
    }
}
