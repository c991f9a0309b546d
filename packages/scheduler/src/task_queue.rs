use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use weft_shared::log;

use crate::heap::{peek, pop, push};
use crate::priority::{timeout_for_level, PriorityLevel};
use crate::Deadline;

pub type TaskId = u64;

/// A callback handed back by a task that wants to keep running next pump.
/// The `bool` argument tells the callback whether its task already expired.
pub struct Continuation(pub Box<dyn FnMut(bool) -> Option<Continuation>>);

type TaskFn = Box<dyn FnMut(bool) -> Option<Continuation>>;

/// Monotonic millisecond clock. Hosts that pump the queue from real idle
/// callbacks use [`InstantClock`]; test hosts drive a [`ManualClock`].
pub trait SchedulerClock {
    fn now(&self) -> f64;
}

pub struct InstantClock {
    origin: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerClock for InstantClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Clock advanced explicitly by the embedder. One `Rc<ManualClock>` is
/// shared between the queue and the test driving it.
pub struct ManualClock {
    time: Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { time: Cell::new(0.0) })
    }

    pub fn advance(&self, ms: f64) {
        self.time.set(self.time.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.time.set(ms);
    }
}

impl SchedulerClock for ManualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

/// Deadline measured against the queue's clock.
pub struct TimeBudget {
    clock: Rc<dyn SchedulerClock>,
    deadline_at: f64,
}

impl TimeBudget {
    pub fn new(clock: Rc<dyn SchedulerClock>, budget_ms: f64) -> Self {
        let deadline_at = clock.now() + budget_ms;
        Self { clock, deadline_at }
    }
}

impl Deadline for TimeBudget {
    fn time_remaining(&self) -> f64 {
        self.deadline_at - self.clock.now()
    }
}

struct Task {
    id: TaskId,
    sort_index: f64,
    start_time: f64,
    expiration_time: f64,
    priority_level: PriorityLevel,
    callback: Option<TaskFn>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // sort_index never holds NaN, but total_cmp keeps this honest.
        self.sort_index
            .total_cmp(&other.sort_index)
            .then(self.id.cmp(&other.id))
    }
}

const FRAME_YIELD_MS: f64 = 5.0;

/// Priority-ordered callback queue, pumped manually by the host. Tasks
/// with a delay sit in the timer heap until their start time passes, then
/// migrate to the task heap sorted by expiration.
pub struct TaskQueue {
    clock: Rc<dyn SchedulerClock>,
    task_queue: Vec<Task>,
    timer_queue: Vec<Task>,
    task_id_counter: TaskId,
    current_priority_level: PriorityLevel,
    is_performing_work: bool,
    frame_start: f64,
}

impl TaskQueue {
    pub fn new(clock: Rc<dyn SchedulerClock>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            clock,
            task_queue: vec![],
            timer_queue: vec![],
            task_id_counter: 0,
            current_priority_level: PriorityLevel::NoWork,
            is_performing_work: false,
            frame_start: 0.0,
        }))
    }

    pub fn clock(&self) -> Rc<dyn SchedulerClock> {
        self.clock.clone()
    }

    pub fn schedule_callback(
        &mut self,
        priority_level: PriorityLevel,
        callback: TaskFn,
    ) -> TaskId {
        self.schedule_callback_with_delay(priority_level, callback, 0.0)
    }

    pub fn schedule_callback_with_delay(
        &mut self,
        priority_level: PriorityLevel,
        callback: TaskFn,
        delay: f64,
    ) -> TaskId {
        let current_time = self.clock.now();
        let start_time = current_time + delay.max(0.0);
        let expiration_time = start_time + timeout_for_level(priority_level);

        self.task_id_counter += 1;
        let mut task = Task {
            id: self.task_id_counter,
            sort_index: 0.0,
            start_time,
            expiration_time,
            priority_level,
            callback: Some(callback),
        };

        if start_time > current_time {
            task.sort_index = start_time;
            push(&mut self.timer_queue, task);
        } else {
            task.sort_index = expiration_time;
            push(&mut self.task_queue, task);
        }
        self.task_id_counter
    }

    /// Disarms the task in place; the heap entry drains on a later pump.
    pub fn cancel_callback(&mut self, id: TaskId) {
        for task in self
            .task_queue
            .iter_mut()
            .chain(self.timer_queue.iter_mut())
        {
            if task.id == id {
                task.callback = None;
            }
        }
    }

    pub fn has_pending_work(&self) -> bool {
        self.task_queue.iter().any(|t| t.callback.is_some())
            || self.timer_queue.iter().any(|t| t.callback.is_some())
    }

    pub fn current_priority_level(&self) -> PriorityLevel {
        self.current_priority_level
    }

    pub fn should_yield(&self) -> bool {
        self.clock.now() - self.frame_start >= FRAME_YIELD_MS
    }

    fn advance_timers(&mut self, current_time: f64) {
        while let Some(timer) = peek(&self.timer_queue) {
            if timer.callback.is_none() {
                pop(&mut self.timer_queue);
            } else if timer.start_time <= current_time {
                let mut task = pop(&mut self.timer_queue).unwrap();
                task.sort_index = task.expiration_time;
                push(&mut self.task_queue, task);
            } else {
                return;
            }
        }
    }

    /// Takes the next runnable task off the heap, or reports whether the
    /// head is merely not runnable yet under the frame budget.
    fn take_next_task(&mut self, current_time: f64) -> Option<Task> {
        self.advance_timers(current_time);
        loop {
            let runnable = match peek(&self.task_queue) {
                None => return None,
                Some(head) => {
                    if head.callback.is_none() {
                        false
                    } else if head.expiration_time > current_time && self.should_yield() {
                        return None;
                    } else {
                        true
                    }
                }
            };
            let task = pop(&mut self.task_queue);
            if runnable {
                return task;
            }
        }
    }

    /// Pumps tasks until the queue drains or the frame budget runs out.
    /// Returns true when runnable work remains for a later pump.
    pub fn flush(this: &Rc<RefCell<TaskQueue>>) -> bool {
        {
            let mut queue = this.borrow_mut();
            if queue.is_performing_work {
                panic!("flush called reentrantly from inside a task");
            }
            queue.is_performing_work = true;
            queue.frame_start = queue.clock.now();
        }

        loop {
            let (mut task, current_time) = {
                let mut queue = this.borrow_mut();
                let now = queue.clock.now();
                match queue.take_next_task(now) {
                    None => break,
                    Some(task) => {
                        queue.current_priority_level = task.priority_level;
                        (task, now)
                    }
                }
            };

            let did_timeout = task.expiration_time <= current_time;
            let mut callback = task.callback.take().expect("runnable task lost callback");
            // The queue is unborrowed here: the callback may schedule.
            let continuation = callback(did_timeout);

            if let Some(Continuation(next)) = continuation {
                log!("task {} yielded a continuation", task.id);
                task.callback = Some(next);
                let mut queue = this.borrow_mut();
                push(&mut queue.task_queue, task);
                if queue.should_yield() {
                    break;
                }
            }
        }

        let mut queue = this.borrow_mut();
        queue.is_performing_work = false;
        queue.current_priority_level = PriorityLevel::NoWork;
        queue.has_pending_work()
    }
}
