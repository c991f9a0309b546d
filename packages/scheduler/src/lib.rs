//! Cooperative scheduling primitives: ordinal priority levels, the
//! deadline handed to deferred work, and a min-heap task queue that hosts
//! pump manually. Nothing in here knows about fibers; the reconciler and
//! the host renderers meet in the middle through these types.

mod heap;
mod priority;
mod task_queue;

pub use priority::{timeout_for_level, PriorityLevel};
pub use task_queue::{
    Continuation, InstantClock, ManualClock, SchedulerClock, TaskId, TaskQueue, TimeBudget,
};

/// Time budget consulted by deferred work loops. `time_remaining` is in
/// milliseconds and may go negative once the budget is blown.
pub trait Deadline {
    fn time_remaining(&self) -> f64;

    fn did_timeout(&self) -> bool {
        self.time_remaining() <= 0.0
    }
}
