//! Cooperative timed callbacks.
//!
//! [`Tasks`] is the module that owns the application's [`TaskQueue`]. Every
//! queue mutation happens inside a critical section so interrupt-side code
//! can share the queue with the main loop. Callbacks run, and entries leaving
//! the queue are dropped, only after the section is released: dropping a task
//! may drop a scheduler that touches the queue again.

mod queue;
mod scheduler;

pub use queue::{FIRST_AUTO_ID, QueueFull, Replaced, Task, TaskId, TaskQueue, TimedTask, task};
pub use scheduler::{PeriodicTaskScheduler, TaskIdScheduler, TaskScheduler};

use alloc::rc::Rc;
use core::cell::RefCell;

use critical_section::Mutex;

use crate::logger::Logger;
use crate::system::{Module, NameToModule};
use crate::time::{Clock, Millis};

/// The task service module.
pub struct Tasks {
    queue: Mutex<RefCell<TaskQueue>>,
    clock: Rc<dyn Clock>,
    logger: Rc<dyn Logger>,
}

impl Tasks {
    /// Name the service registers under.
    pub const NAME: &'static str = "tasks";

    pub fn new(capacity: usize, clock: Rc<dyn Clock>, logger: Rc<dyn Logger>) -> Rc<Self> {
        Rc::new(Self {
            queue: Mutex::new(RefCell::new(TaskQueue::new(capacity))),
            clock,
            logger,
        })
    }

    /// Look the service up from a link callback.
    pub fn get(modules: &NameToModule) -> Option<Rc<Self>> {
        modules.get::<Self>(Self::NAME)
    }

    /// Module whose update callback drains due tasks.
    pub fn module(self: &Rc<Self>) -> Module {
        let tasks = self.clone();
        Module::new(Self::NAME)
            .with_handle(self.clone())
            .on_update(move || {
                let _ = tasks.run_due();
            })
    }

    fn with_queue<R>(&self, f: impl FnOnce(&mut TaskQueue) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.queue.borrow_ref_mut(cs)))
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Queue `task` to run at `deadline`. Fails and logs when the queue is
    /// full.
    pub fn run_at(&self, deadline: Millis, task: Task, id: TaskId) -> Result<(), QueueFull> {
        let entry = TimedTask { deadline, task, id };
        let placed = self.with_queue(|queue| {
            queue.try_insert(entry).map_err(|rejected| {
                let full = QueueFull {
                    capacity: queue.capacity(),
                };
                (rejected, full)
            })
        });
        match placed {
            Ok(_previous) => Ok(()),
            Err((_rejected, full)) => {
                self.logger
                    .logf(format_args!("Failed to schedule task callback (full!) id={}", id));
                Err(full)
            }
        }
    }

    /// Queue `task` to run `delay` milliseconds from now.
    pub fn run_in(&self, delay: Millis, task: Task, id: TaskId) -> Result<(), QueueFull> {
        self.run_at(self.now().wrapping_add(delay), task, id)
    }

    /// Queue `task` with replace semantics; see [`TaskQueue::insert_replace`].
    pub fn replace_at(&self, deadline: Millis, task: Task, id: TaskId) -> bool {
        let replaced = self.with_queue(|queue| queue.insert_replace(deadline, task, id));
        replaced.stored
    }

    pub fn replace_in(&self, delay: Millis, task: Task, id: TaskId) -> bool {
        self.replace_at(self.now().wrapping_add(delay), task, id)
    }

    /// Remove the entry queued under `id`.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = self.with_queue(|queue| queue.remove(id));
        removed.is_some()
    }

    pub(crate) fn logger(&self) -> &Rc<dyn Logger> {
        &self.logger
    }

    pub fn is_queued(&self, id: TaskId) -> bool {
        !id.is_anonymous() && self.with_queue(|queue| queue.iter().any(|entry| entry.id == id))
    }

    pub fn next_id(&self) -> TaskId {
        self.with_queue(TaskQueue::next_id)
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.with_queue(|queue| queue.next_deadline())
    }

    pub fn len(&self) -> usize {
        self.with_queue(|queue| queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.with_queue(|queue| queue.capacity())
    }

    /// Pop the earliest task regardless of its deadline and run it.
    pub fn run_next(&self) -> bool {
        match self.with_queue(TaskQueue::pop_first) {
            Some(entry) => {
                entry.run();
                true
            }
            None => false,
        }
    }

    /// Run every task due at the current time. Returns how many ran.
    ///
    /// The clock is sampled once. At most as many tasks run as were queued
    /// on entry, so a callback that requeues itself with no delay waits for
    /// the next pass.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        let budget = self.len();
        let mut ran = 0;
        while ran < budget {
            let Some(entry) = self.with_queue(|queue| queue.pop_due(now)) else {
                break;
            };
            entry.run();
            ran += 1;
        }
        ran
    }
}
