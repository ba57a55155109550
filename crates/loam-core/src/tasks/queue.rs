//! Deadline-ordered queue of callbacks.

use alloc::rc::Rc;
use core::fmt;

use log::debug;
use thiserror_no_std::Error;

use crate::ring::SortedRing;
use crate::time::{Millis, is_before};

/// A deferred callback. Shared so schedulers can queue the same callback
/// repeatedly.
pub type Task = Rc<dyn Fn()>;

/// Wrap a closure as a [`Task`].
pub fn task<F>(f: F) -> Task
where
    F: Fn() + 'static,
{
    Rc::new(f)
}

/// First id handed out by [`TaskQueue::next_id`]. Ids below this are free for
/// callers to pick by hand.
pub const FIRST_AUTO_ID: u32 = 200;

/// Identity of a queued task.
///
/// At most one entry per non-zero id is queued at a time. Id 0 is
/// [`TaskId::ANONYMOUS`]: never replaced and never removable by id.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    pub const ANONYMOUS: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A queue entry.
#[derive(Clone)]
pub struct TimedTask {
    pub deadline: Millis,
    pub task: Task,
    pub id: TaskId,
}

impl TimedTask {
    pub fn run(&self) {
        (self.task)();
    }
}

impl fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("deadline", &self.deadline)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Returned by [`TaskQueue::insert`] when no slot is free.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Task queue full (capacity: {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Entries taken out of the queue by [`TaskQueue::insert_replace`].
///
/// Dropping a task can run arbitrary code, so the caller decides where these
/// are released.
#[must_use]
#[derive(Debug, Default)]
pub struct Replaced {
    /// Whether the new entry was stored.
    pub stored: bool,
    /// The entry previously queued under the same id.
    pub previous: Option<TimedTask>,
    /// The evicted latest entry, or the new entry itself when not stored.
    pub dropped: Option<TimedTask>,
}
/// Bounded queue of [`TimedTask`]s sorted by wrapping deadline.
///
/// Entries with equal deadlines run in insertion order. The slot table is
/// allocated once in [`TaskQueue::new`] and never grows.
pub struct TaskQueue {
    entries: SortedRing<TimedTask>,
    next_id: u32,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SortedRing::with_capacity(capacity),
            next_id: FIRST_AUTO_ID,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// The entry due soonest.
    pub fn first(&self) -> Option<&TimedTask> {
        self.entries.front()
    }

    pub fn get(&self, idx: usize) -> Option<&TimedTask> {
        self.entries.get(idx)
    }

    /// Entries in run order.
    pub fn iter(&self) -> impl Iterator<Item = &TimedTask> + '_ {
        self.entries.iter()
    }

    /// Deadline of the earliest entry, `None` when empty.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.first().map(|entry| entry.deadline)
    }

    /// Queue `task`, failing without side effects if the queue is full.
    ///
    /// A non-zero `id` replaces any entry already queued under it.
    pub fn insert(&mut self, deadline: Millis, task: Task, id: TaskId) -> Result<(), QueueFull> {
        self.try_insert(TimedTask { deadline, task, id })
            .map(drop)
            .map_err(|_| QueueFull {
                capacity: self.capacity(),
            })
    }

    /// Like [`insert`](Self::insert) but hands back whatever leaves the
    /// queue: `Ok` with the entry it replaced, or `Err` with `entry` itself
    /// when the queue is full.
    pub fn try_insert(&mut self, entry: TimedTask) -> Result<Option<TimedTask>, TimedTask> {
        if self.is_full() {
            return Err(entry);
        }
        let Replaced {
            previous, dropped, ..
        } = self.insert_replace(entry.deadline, entry.task, entry.id);
        // Not full, so nothing was evicted.
        debug_assert!(dropped.is_none());
        Ok(previous)
    }

    /// Queue `task`, first removing any entry with the same non-zero `id`.
    ///
    /// When the queue is still full the new entry is dropped if it would run
    /// last; otherwise the latest entry is evicted to make room.
    pub fn insert_replace(&mut self, deadline: Millis, task: Task, id: TaskId) -> Replaced {
        let previous = self.remove(id);
        let entry = TimedTask { deadline, task, id };
        let placed = self.entries.insert_by(entry, |queued, new| {
            is_before(queued.deadline, new.deadline)
        });
        match placed {
            Ok(evicted) => {
                if let Some(evicted) = &evicted {
                    debug!("Task queue full, evicted id={} for id={}", evicted.id, id);
                }
                Replaced {
                    stored: true,
                    previous,
                    dropped: evicted,
                }
            }
            Err(rejected) => {
                debug!("Task queue full, dropped id={} at {}", id, deadline);
                Replaced {
                    stored: false,
                    previous,
                    dropped: Some(rejected),
                }
            }
        }
    }

    /// Remove and return the entry queued under `id`. Anonymous ids never
    /// match.
    pub fn remove(&mut self, id: TaskId) -> Option<TimedTask> {
        if id.is_anonymous() {
            return None;
        }
        self.entries.remove(|entry| entry.id == id)
    }

    /// Remove the earliest entry without running it.
    pub fn pop_first(&mut self) -> Option<TimedTask> {
        self.entries.pop_front()
    }

    /// Remove the earliest entry if its deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<TimedTask> {
        match self.next_deadline() {
            Some(deadline) if is_before(deadline, now) => self.pop_first(),
            _ => None,
        }
    }

    /// Pop the earliest entry and run it. Returns `false` if empty.
    pub fn run_next(&mut self) -> bool {
        match self.pop_first() {
            Some(entry) => {
                entry.run();
                true
            }
            None => false,
        }
    }

    /// Hand out a fresh id for automatic schedulers.
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.checked_add(1).unwrap_or(FIRST_AUTO_ID);
        id
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("entries", &self.entries)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::collections::BinaryHeap;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::cmp::Reverse;

    fn noop() -> Task {
        task(|| {})
    }

    fn id(raw: u32) -> TaskId {
        TaskId::new(raw)
    }

    fn snapshot(queue: &TaskQueue) -> Vec<(Millis, u32)> {
        queue.iter().map(|e| (e.deadline, e.id.get())).collect()
    }

    /// xorshift32
    struct Rng(u32);

    impl Rng {
        fn next(&mut self) -> u32 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.0 = x;
            x
        }
    }

    #[test]
    fn test_insert_orders_by_deadline() {
        let mut queue = TaskQueue::new(4);
        assert_eq!(queue.next_deadline(), None);
        queue.insert(30, noop(), TaskId::ANONYMOUS).unwrap();
        queue.insert(10, noop(), TaskId::ANONYMOUS).unwrap();
        queue.insert(20, noop(), TaskId::ANONYMOUS).unwrap();
        assert_eq!(snapshot(&queue), [(10, 0), (20, 0), (30, 0)]);
        assert_eq!(queue.next_deadline(), Some(10));
    }

    #[test]
    fn test_insert_fails_when_full() {
        let mut queue = TaskQueue::new(2);
        queue.insert(1, noop(), id(1)).unwrap();
        queue.insert(2, noop(), id(2)).unwrap();
        assert_eq!(
            queue.insert(0, noop(), id(3)),
            Err(QueueFull { capacity: 2 })
        );
        // Even a replacing insert is refused while full.
        assert!(queue.insert(0, noop(), id(1)).is_err());
        assert_eq!(snapshot(&queue), [(1, 1), (2, 2)]);
    }

    #[test]
    fn test_replace_keeps_one_entry_per_id() {
        let mut queue = TaskQueue::new(4);
        assert!(queue.insert_replace(50, noop(), id(100)).stored);
        assert!(queue.insert_replace(50, noop(), id(100)).stored);
        assert!(queue.insert_replace(10, noop(), id(101)).stored);
        assert!(queue.insert_replace(60, noop(), id(101)).stored);
        assert_eq!(snapshot(&queue), [(50, 100), (60, 101)]);
    }

    #[test]
    fn test_anonymous_entries_coexist() {
        let mut queue = TaskQueue::new(4);
        for _ in 0..3 {
            assert!(queue.insert_replace(5, noop(), TaskId::ANONYMOUS).stored);
        }
        assert_eq!(queue.len(), 3);
        assert!(queue.remove(TaskId::ANONYMOUS).is_none());
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_replace_when_full() {
        let mut queue = TaskQueue::new(3);
        for (deadline, raw) in [(10, 1), (20, 2), (30, 3)] {
            assert!(queue.insert_replace(deadline, noop(), id(raw)).stored);
        }
        // Would run last: dropped.
        assert!(!queue.insert_replace(40, noop(), id(4)).stored);
        assert_eq!(snapshot(&queue), [(10, 1), (20, 2), (30, 3)]);
        // Earlier than the back: the latest entry is evicted.
        assert!(queue.insert_replace(5, noop(), id(5)).stored);
        assert_eq!(snapshot(&queue), [(5, 5), (10, 1), (20, 2)]);
        // Replacing an id frees its slot first.
        assert!(queue.insert_replace(99, noop(), id(1)).stored);
        assert_eq!(snapshot(&queue), [(5, 5), (20, 2), (99, 1)]);
    }

    #[test]
    fn test_displaced_entries_are_handed_back() {
        let mut queue = TaskQueue::new(2);
        let entry = |deadline, raw| TimedTask {
            deadline,
            task: noop(),
            id: id(raw),
        };
        assert!(queue.try_insert(entry(10, 1)).unwrap().is_none());
        let previous = queue.try_insert(entry(20, 1)).unwrap();
        assert_eq!(previous.map(|e| e.deadline), Some(10));
        queue.insert(30, noop(), id(2)).unwrap();
        let rejected = queue.try_insert(entry(5, 3));
        assert_eq!(rejected.err().map(|e| e.id), Some(id(3)));

        // Full: an earlier entry evicts the latest one.
        let replaced = queue.insert_replace(1, noop(), id(4));
        assert!(replaced.stored);
        assert!(replaced.previous.is_none());
        assert_eq!(replaced.dropped.map(|e| e.id), Some(id(2)));

        // Full and last: the new entry comes straight back.
        let replaced = queue.insert_replace(50, noop(), id(5));
        assert!(!replaced.stored);
        assert_eq!(replaced.dropped.map(|e| e.id), Some(id(5)));

        // Replacing by id reports the old entry and evicts nothing.
        let replaced = queue.insert_replace(60, noop(), id(1));
        assert!(replaced.stored);
        assert_eq!(replaced.previous.map(|e| e.deadline), Some(20));
        assert!(replaced.dropped.is_none());
        assert_eq!(snapshot(&queue), [(1, 4), (60, 1)]);
    }

    #[test]
    fn test_equal_deadlines_run_in_insertion_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut queue = TaskQueue::new(8);
        for n in 0..4u32 {
            let order = order.clone();
            queue
                .insert(7, task(move || order.borrow_mut().push(n)), TaskId::ANONYMOUS)
                .unwrap();
        }
        while queue.run_next() {}
        assert_eq!(*order.borrow(), [0, 1, 2, 3]);
        assert!(!queue.run_next());
    }

    #[test]
    fn test_deadlines_across_wrap() {
        let mut queue = TaskQueue::new(4);
        queue.insert(3, noop(), id(1)).unwrap();
        queue.insert(Millis::MAX - 2, noop(), id(2)).unwrap();
        queue.insert(Millis::MAX, noop(), id(3)).unwrap();
        queue.insert(0, noop(), id(4)).unwrap();
        assert_eq!(
            snapshot(&queue),
            [(Millis::MAX - 2, 2), (Millis::MAX, 3), (0, 4), (3, 1)]
        );
        assert!(queue.pop_due(Millis::MAX - 3).is_none());
        assert_eq!(queue.pop_due(1).map(|e| e.id.get()), Some(2));
        assert_eq!(queue.pop_due(1).map(|e| e.id.get()), Some(3));
        assert_eq!(queue.pop_due(1).map(|e| e.id.get()), Some(4));
        assert!(queue.pop_due(1).is_none());
    }

    #[test]
    fn test_remove_round_trip() {
        let mut queue = TaskQueue::new(4);
        queue.insert(10, noop(), id(7)).unwrap();
        queue.insert(20, noop(), id(8)).unwrap();
        assert!(queue.remove(id(7)).is_some());
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(id(7)).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.remove(id(9)).is_none());
    }

    #[test]
    fn test_next_id_starts_above_manual_range() {
        let mut queue = TaskQueue::new(1);
        assert_eq!(queue.next_id(), id(FIRST_AUTO_ID));
        assert_eq!(queue.next_id(), id(FIRST_AUTO_ID + 1));
    }

    #[test]
    fn test_drain_matches_full_width_reference() {
        // Full-width times straddle the 32-bit wrap; the queue only sees the
        // truncated values.
        let base = u64::from(Millis::MAX) - 5_000;
        let mut rng = Rng(0xdead_beef);
        let mut queue = TaskQueue::new(64);
        let mut reference = BinaryHeap::new();

        for seq in 0..64u32 {
            let at = base + u64::from(rng.next() % 10_000);
            queue.insert(at as Millis, noop(), id(seq + 1)).unwrap();
            reference.push(Reverse((at, seq + 1)));
        }

        let mut drained = Vec::new();
        while let Some(entry) = queue.pop_first() {
            drained.push(entry.id.get());
        }
        let expected: Vec<u32> = core::iter::from_fn(|| reference.pop())
            .map(|Reverse((_, raw))| raw)
            .collect();
        assert_eq!(drained.len(), 64);
        // Ties break by insertion order in both: seq grows with insertion.
        assert_eq!(drained, expected);
    }

    #[test]
    fn test_replace_policy_matches_model() {
        // Model: Vec of (full-width time, id) with the same replace and
        // capacity rules.
        const CAP: usize = 8;
        let base = u64::from(Millis::MAX) - 2_000;
        let mut rng = Rng(0x0bad_cafe);
        let mut queue = TaskQueue::new(CAP);
        let mut model: Vec<(u64, u32)> = Vec::new();

        for _ in 0..500 {
            let at = base + u64::from(rng.next() % 4_000);
            let raw = rng.next() % 12;
            let _ = queue.insert_replace(at as Millis, noop(), id(raw));

            if raw != 0 {
                if let Some(pos) = model.iter().rposition(|&(_, r)| r == raw) {
                    model.remove(pos);
                }
            }
            let pos = model.iter().rposition(|&(t, _)| t <= at).map_or(0, |p| p + 1);
            if model.len() == CAP {
                if pos < model.len() {
                    model.pop();
                    model.insert(pos, (at, raw));
                }
            } else {
                model.insert(pos, (at, raw));
            }

            let queued: Vec<(Millis, u32)> = snapshot(&queue);
            let expected: Vec<(Millis, u32)> =
                model.iter().map(|&(t, r)| (t as Millis, r)).collect();
            assert_eq!(queued, expected);

            if rng.next() % 3 == 0 {
                let _ = queue.pop_first();
                if !model.is_empty() {
                    model.remove(0);
                }
            }
        }
    }
}
