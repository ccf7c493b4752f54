#[allow(missing_docs)]
pub mod errors;

#[allow(missing_docs)]
pub mod group;

#[allow(missing_docs)]
pub mod schedule;

#[allow(missing_docs)]
pub mod task;

pub mod prelude {
    pub use crate::errors::MetronomeErrors;
    pub use crate::group::{StopHandle, TaskGroup, start};
    pub use crate::schedule::{
        ScheduleDecision, TaskSchedule, TaskScheduleDaily, TaskScheduleEvery,
    };
    pub use crate::task::{FnTaskFunc, TaskFunc, TaskHandle};
    pub use tokio_util::sync::CancellationToken;
}
