//! Scheduling handles that keep at most one pending entry per identity.

use alloc::rc::{Rc, Weak};
use core::cell::{Cell, RefCell};

use log::warn;

use super::{Task, TaskId, Tasks, task};
use crate::time::{Millis, is_before};

/// A stable task id bound to a [`Tasks`] service.
///
/// Every `run_at`/`run_in` through the same handle replaces whatever the
/// handle still has queued.
#[derive(Default)]
pub struct TaskIdScheduler {
    tasks: Option<Rc<Tasks>>,
    id: TaskId,
}

impl TaskIdScheduler {
    pub fn new(tasks: &Rc<Tasks>) -> Self {
        let mut scheduler = Self::unbound();
        scheduler.set_tasks(tasks);
        scheduler
    }

    /// A handle that schedules nothing until [`set_tasks`](Self::set_tasks).
    pub const fn unbound() -> Self {
        Self {
            tasks: None,
            id: TaskId::ANONYMOUS,
        }
    }

    /// Bind to `tasks` and take an id from it. The first binding wins.
    pub fn set_tasks(&mut self, tasks: &Rc<Tasks>) {
        if self.tasks.is_some() {
            return;
        }
        self.id = tasks.next_id();
        self.tasks = Some(tasks.clone());
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn tasks(&self) -> Option<&Rc<Tasks>> {
        self.tasks.as_ref()
    }

    pub fn run_at(&self, deadline: Millis, task: Task) -> bool {
        match &self.tasks {
            Some(tasks) => tasks.replace_at(deadline, task, self.id),
            None => {
                warn!("Task scheduler used before it was bound to a task service");
                false
            }
        }
    }

    pub fn run_in(&self, delay: Millis, task: Task) -> bool {
        match &self.tasks {
            Some(tasks) => tasks.replace_in(delay, task, self.id),
            None => {
                warn!("Task scheduler used before it was bound to a task service");
                false
            }
        }
    }

    pub fn cancel(&self) -> bool {
        self.tasks
            .as_ref()
            .is_some_and(|tasks| tasks.cancel(self.id))
    }

    pub fn is_pending(&self) -> bool {
        self.tasks
            .as_ref()
            .is_some_and(|tasks| tasks.is_queued(self.id))
    }
}

/// One fixed callback behind a [`TaskIdScheduler`].
pub struct TaskScheduler {
    scheduler: TaskIdScheduler,
    task: Task,
}

impl TaskScheduler {
    pub fn new(tasks: &Rc<Tasks>, task: Task) -> Self {
        Self {
            scheduler: TaskIdScheduler::new(tasks),
            task,
        }
    }

    pub fn unbound(task: Task) -> Self {
        Self {
            scheduler: TaskIdScheduler::unbound(),
            task,
        }
    }

    pub fn set_tasks(&mut self, tasks: &Rc<Tasks>) {
        self.scheduler.set_tasks(tasks);
    }

    pub fn run_at(&self, deadline: Millis) -> bool {
        self.scheduler.run_at(deadline, self.task.clone())
    }

    pub fn run_in(&self, delay: Millis) -> bool {
        self.scheduler.run_in(delay, self.task.clone())
    }

    pub fn cancel(&self) -> bool {
        self.scheduler.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn id(&self) -> TaskId {
        self.scheduler.id()
    }
}

/// Runs a callback after an initial delay and then every `period`
/// milliseconds.
///
/// Missed periods are skipped: after a stall the next deadline is the first
/// multiple of `period` past the previous deadline that is still ahead of
/// now. A `period` of zero runs the callback once. Dropping the scheduler
/// cancels anything it has queued.
pub struct PeriodicTaskScheduler {
    inner: Rc<Periodic>,
}

struct Periodic {
    scheduler: RefCell<TaskIdScheduler>,
    task: Task,
    initial: Millis,
    period: Millis,
    prev: Cell<Millis>,
    active: Cell<bool>,
}

impl PeriodicTaskScheduler {
    pub fn new(tasks: &Rc<Tasks>, initial: Millis, period: Millis, task: Task) -> Self {
        let periodic = Self::unbound(initial, period, task);
        periodic.set_tasks(tasks);
        periodic
    }

    pub fn unbound(initial: Millis, period: Millis, task: Task) -> Self {
        Self {
            inner: Rc::new(Periodic {
                scheduler: RefCell::new(TaskIdScheduler::unbound()),
                task,
                initial,
                period,
                prev: Cell::new(0),
                active: Cell::new(false),
            }),
        }
    }

    pub fn set_tasks(&self, tasks: &Rc<Tasks>) {
        self.inner.scheduler.borrow_mut().set_tasks(tasks);
    }

    /// Queue the first run `initial` milliseconds from now.
    pub fn start(&self) -> bool {
        self.run_in(self.inner.initial)
    }

    /// Move the next run to `deadline`. Later runs keep the period from
    /// there.
    pub fn run_at(&self, deadline: Millis) -> bool {
        if self.inner.now().is_none() {
            warn!("Periodic task started before it was bound to a task service");
            return false;
        }
        self.inner.active.set(true);
        Periodic::schedule(&self.inner, deadline)
    }

    /// Move the next run to `delay` milliseconds from now.
    pub fn run_in(&self, delay: Millis) -> bool {
        let Some(now) = self.inner.now() else {
            warn!("Periodic task started before it was bound to a task service");
            return false;
        };
        self.run_at(now.wrapping_add(delay))
    }

    pub fn stop(&self) -> bool {
        self.inner.active.set(false);
        self.inner.scheduler.borrow().cancel()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.scheduler.borrow().is_pending()
    }

    pub fn period(&self) -> Millis {
        self.inner.period
    }

    pub fn id(&self) -> TaskId {
        self.inner.scheduler.borrow().id()
    }
}

impl Drop for PeriodicTaskScheduler {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Periodic {
    fn now(&self) -> Option<Millis> {
        self.scheduler.borrow().tasks().map(|tasks| tasks.now())
    }

    fn schedule(this: &Rc<Self>, deadline: Millis) -> bool {
        let weak: Weak<Self> = Rc::downgrade(this);
        this.prev.set(deadline);
        this.scheduler.borrow().run_at(
            deadline,
            task(move || {
                if let Some(periodic) = weak.upgrade() {
                    Periodic::cycle(&periodic);
                }
            }),
        )
    }

    fn cycle(this: &Rc<Self>) {
        (this.task)();
        if this.period == 0 || !this.active.get() {
            return;
        }
        let Some(now) = this.now() else {
            return;
        };
        let mut next = this.prev.get().wrapping_add(this.period);
        while is_before(next, now) {
            next = next.wrapping_add(this.period);
        }
        if !Periodic::schedule(this, next) {
            this.active.set(false);
            let scheduler = this.scheduler.borrow();
            if let Some(tasks) = scheduler.tasks() {
                tasks.logger().logf(format_args!(
                    "Failed to reschedule periodic task (full!) id={}",
                    scheduler.id()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::logger::{MemoryLogger, NullLogger};
    use crate::time::ManualClock;

    fn service() -> (Rc<Tasks>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        let tasks = Tasks::new(8, clock.clone(), Rc::new(NullLogger));
        (tasks, clock)
    }

    fn counter() -> (Rc<Cell<u32>>, Task) {
        let count = Rc::new(Cell::new(0));
        let hits = count.clone();
        (count, task(move || hits.set(hits.get() + 1)))
    }

    #[test]
    fn test_id_scheduler_keeps_one_pending() {
        let (tasks, _) = service();
        let scheduler = TaskIdScheduler::new(&tasks);
        assert!(!scheduler.id().is_anonymous());
        for delay in [30, 10, 20] {
            assert!(scheduler.run_in(delay, task(|| {})));
        }
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.next_deadline(), Some(20));
        assert!(scheduler.cancel());
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_unbound_scheduler_refuses_then_binds_once() {
        let (tasks, _) = service();
        let (other, _) = service();
        let mut scheduler = TaskScheduler::unbound(task(|| {}));
        assert!(!scheduler.run_in(5));

        scheduler.set_tasks(&tasks);
        let id = scheduler.id();
        scheduler.set_tasks(&other);
        assert_eq!(scheduler.id(), id);

        assert!(scheduler.run_in(5));
        assert_eq!(tasks.len(), 1);
        assert!(other.is_empty());
    }

    #[test]
    fn test_task_scheduler_reruns_same_callback() {
        let (tasks, clock) = service();
        let (count, callback) = counter();
        let scheduler = TaskScheduler::new(&tasks, callback);
        assert!(scheduler.run_in(5));
        assert!(scheduler.run_in(5));
        clock.set(5);
        assert_eq!(tasks.run_due(), 1);
        assert_eq!(count.get(), 1);
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_periodic_skips_missed_periods() {
        let (tasks, clock) = service();
        let (count, callback) = counter();
        let periodic = PeriodicTaskScheduler::new(&tasks, 1, 1_000, callback);
        assert!(periodic.start());
        assert_eq!(tasks.next_deadline(), Some(1));

        clock.set(1);
        assert_eq!(tasks.run_due(), 1);
        assert_eq!(tasks.next_deadline(), Some(1_001));

        // Stall well past two periods.
        clock.set(2_501);
        assert_eq!(tasks.run_due(), 1);
        assert_eq!(count.get(), 2);
        assert_eq!(tasks.next_deadline(), Some(3_001));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_periodic_cadence_across_wrap() {
        let clock = Rc::new(ManualClock::new(Millis::MAX - 150));
        let tasks = Tasks::new(4, clock.clone(), Rc::new(NullLogger));
        let (_, callback) = counter();
        let periodic = PeriodicTaskScheduler::new(&tasks, 0, 100, callback);
        assert!(periodic.start());

        clock.advance(120);
        assert_eq!(tasks.run_due(), 1);
        // MAX - 150 + 200 wraps.
        assert_eq!(tasks.next_deadline(), Some(49));
    }

    #[test]
    fn test_zero_period_runs_once() {
        let (tasks, clock) = service();
        let (count, callback) = counter();
        let periodic = PeriodicTaskScheduler::new(&tasks, 10, 0, callback);
        assert!(periodic.start());
        clock.set(50);
        assert_eq!(tasks.run_due(), 1);
        assert_eq!(count.get(), 1);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_drop_cancels_pending_run() {
        let (tasks, clock) = service();
        let (count, callback) = counter();
        {
            let periodic = PeriodicTaskScheduler::new(&tasks, 10, 10, callback);
            assert!(periodic.start());
            assert!(periodic.is_pending());
        }
        assert!(tasks.is_empty());
        clock.set(100);
        assert_eq!(tasks.run_due(), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_periodic_run_at_moves_next_run() {
        let (tasks, clock) = service();
        let (count, callback) = counter();
        let periodic = PeriodicTaskScheduler::new(&tasks, 10, 100, callback);
        assert!(periodic.start());
        assert_eq!(tasks.next_deadline(), Some(10));

        assert!(periodic.run_at(250));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.next_deadline(), Some(250));

        clock.set(250);
        assert_eq!(tasks.run_due(), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(tasks.next_deadline(), Some(350));

        assert!(periodic.run_in(5));
        assert_eq!(tasks.next_deadline(), Some(255));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_periodic_run_at_requires_binding() {
        let (_, callback) = counter();
        let periodic = PeriodicTaskScheduler::unbound(0, 10, callback);
        assert!(!periodic.run_at(5));
        assert!(!periodic.run_in(5));
        assert!(!periodic.is_active());
    }

    #[test]
    fn test_periodic_reports_lost_reschedule() {
        let clock = Rc::new(ManualClock::new(0));
        let logger = Rc::new(MemoryLogger::new());
        let tasks = Tasks::new(2, clock.clone(), logger.clone());
        let (count, callback) = counter();
        let periodic = PeriodicTaskScheduler::new(&tasks, 10, 100, callback);

        // Runs just before the periodic callback and takes the free slot
        // with an entry due sooner than the next period.
        let filler = tasks.clone();
        tasks
            .run_at(
                10,
                task(move || {
                    let _ = filler.run_at(50, task(|| {}), TaskId::ANONYMOUS);
                }),
                TaskId::ANONYMOUS,
            )
            .unwrap();
        assert!(periodic.start());
        assert_eq!(tasks.len(), 2);

        clock.set(10);
        assert_eq!(tasks.run_due(), 2);

        assert_eq!(count.get(), 1);
        assert!(!periodic.is_active());
        assert!(!periodic.is_pending());
        assert_eq!(
            logger.lines(),
            [alloc::format!(
                "Failed to reschedule periodic task (full!) id={}",
                periodic.id()
            )]
        );
    }
}
