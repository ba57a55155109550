//! Fixed-capacity circular storage.
//!
//! [`RingBuffer`] holds the shared index arithmetic: a backing slot table of
//! `capacity` entries, a logical start offset and a length. Logical index `i`
//! (0 = front) lives at physical slot `(start + i) % capacity`. Two
//! specializations sit on top:
//!
//! - [`RingQueue`]: double-ended queue that evicts at the opposite end when
//!   pushed while full.
//! - [`SortedRing`]: keeps elements in ascending order, preferring to keep
//!   earlier-sorting elements when full.
//!
//! Storage is either inline (`[Option<T>; N]`, usable in `static`s) or a boxed
//! slice allocated once at construction. Neither ever grows.

mod queue;
mod sorted;

pub use queue::{RingQueue, StaticRingQueue};
pub use sorted::{SortedRing, StaticSortedRing};

use alloc::boxed::Box;
use alloc::vec::Vec;

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

/// Backing slot table for a ring buffer.
pub trait RingStorage<T> {
    fn slots(&self) -> &[Option<T>];
    fn slots_mut(&mut self) -> &mut [Option<T>];
}

impl<T, const N: usize> RingStorage<T> for [Option<T>; N] {
    fn slots(&self) -> &[Option<T>] {
        self
    }

    fn slots_mut(&mut self) -> &mut [Option<T>] {
        self
    }
}

impl<T> RingStorage<T> for Box<[Option<T>]> {
    fn slots(&self) -> &[Option<T>] {
        self
    }

    fn slots_mut(&mut self) -> &mut [Option<T>] {
        self
    }
}

/// Slot table sized at runtime.
pub type BoxedSlots<T> = Box<[Option<T>]>;

/// Circular buffer base shared by [`RingQueue`] and [`SortedRing`].
pub struct RingBuffer<T, S> {
    store: S,
    start: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T, const N: usize> RingBuffer<T, [Option<T>; N]> {
    pub const fn new() -> Self {
        Self {
            store: [const { None }; N],
            start: 0,
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<T, const N: usize> Default for RingBuffer<T, [Option<T>; N]> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RingBuffer<T, BoxedSlots<T>> {
    /// Allocate a slot table for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        let store: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Self {
            store: store.into_boxed_slice(),
            start: 0,
            len: 0,
            _marker: PhantomData,
        }
    }
}

impl<T, S: RingStorage<T>> RingBuffer<T, S> {
    /// The maximum number of elements which can be held.
    pub fn capacity(&self) -> usize {
        self.store.slots().len()
    }

    /// The number of elements currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Physical slot of the front element.
    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        if idx >= self.len {
            return None;
        }
        self.store.slots()[self.physical(idx)].as_ref()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        if idx >= self.len {
            return None;
        }
        let phys = self.physical(idx);
        self.store.slots_mut()[phys].as_mut()
    }

    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|idx| self.get(idx))
    }

    /// Iterate from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |idx| self.get(idx))
    }

    /// Remove and return the front element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let phys = self.physical(0);
        let value = self.store.slots_mut()[phys].take();
        self.len -= 1;
        if self.len == 0 {
            self.start = 0;
        } else {
            self.increment_start();
        }
        value
    }

    /// Remove and return the back element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let phys = self.physical(self.len - 1);
        let value = self.store.slots_mut()[phys].take();
        self.len -= 1;
        if self.len == 0 {
            self.start = 0;
        }
        value
    }

    /// Remove the element nearest the back for which `select` returns true.
    pub fn remove<F>(&mut self, mut select: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let idx = (0..self.len)
            .rev()
            .find(|&idx| self.get(idx).is_some_and(&mut select))?;
        self.remove_index(idx)
    }

    /// Remove the element at logical index `idx`, closing the gap from
    /// whichever end is nearer.
    pub fn remove_index(&mut self, idx: usize) -> Option<T> {
        if idx >= self.len {
            return None;
        }
        let phys = self.physical(idx);
        let value = self.store.slots_mut()[phys].take();
        if idx < self.len - 1 - idx {
            for i in (0..idx).rev() {
                self.swap_logical(i, i + 1);
            }
            self.increment_start();
        } else {
            for i in idx..self.len - 1 {
                self.swap_logical(i, i + 1);
            }
        }
        self.len -= 1;
        if self.len == 0 {
            self.start = 0;
        }
        value
    }

    pub fn clear(&mut self) {
        for slot in self.store.slots_mut() {
            *slot = None;
        }
        self.start = 0;
        self.len = 0;
    }

    fn physical(&self, idx: usize) -> usize {
        (self.start + idx) % self.capacity()
    }

    fn swap_logical(&mut self, a: usize, b: usize) {
        let pa = self.physical(a);
        let pb = self.physical(b);
        self.store.slots_mut().swap(pa, pb);
    }

    fn increment_start(&mut self) {
        self.start = (self.start + 1) % self.capacity();
    }

    fn decrement_start(&mut self) {
        let capacity = self.capacity();
        self.start = (self.start + capacity - 1) % capacity;
    }

    /// Open a gap at `idx` by shifting toward the nearer end and store `value`
    /// there. Requires `idx <= len < capacity`.
    fn insert_at_unchecked(&mut self, idx: usize, value: T) {
        debug_assert!(idx <= self.len && self.len < self.capacity());
        if idx < self.len - idx {
            // Logical 0 becomes the vacant slot; walk it forward to `idx`.
            self.decrement_start();
            for i in 0..idx {
                self.swap_logical(i, i + 1);
            }
        } else {
            // Logical `len` is vacant; walk it back to `idx`.
            for i in (idx..self.len).rev() {
                self.swap_logical(i, i + 1);
            }
        }
        let phys = self.physical(idx);
        self.store.slots_mut()[phys] = Some(value);
        self.len += 1;
    }
}

impl<T, S: RingStorage<T>> Index<usize> for RingBuffer<T, S> {
    type Output = T;

    fn index(&self, idx: usize) -> &T {
        match self.get(idx) {
            Some(value) => value,
            None => panic!("ring index {idx} out of range (len {})", self.len),
        }
    }
}

impl<T, S: RingStorage<T>> IndexMut<usize> for RingBuffer<T, S> {
    fn index_mut(&mut self, idx: usize) -> &mut T {
        let len = self.len;
        match self.get_mut(idx) {
            Some(value) => value,
            None => panic!("ring index {idx} out of range (len {len})"),
        }
    }
}

impl<T: fmt::Debug, S: RingStorage<T>> fmt::Debug for RingBuffer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
