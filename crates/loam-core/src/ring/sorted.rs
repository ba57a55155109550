use core::ops::Deref;

use super::{BoxedSlots, RingBuffer, RingStorage};

/// A ring with fixed capacity whose elements are kept in ascending order.
///
/// When full, the ring keeps the earliest-sorting elements: a value that
/// would land at the back is rejected, and any other value evicts the
/// current back element to make room. Equal elements keep insertion order.
pub struct SortedRing<T, S = BoxedSlots<T>> {
    ring: RingBuffer<T, S>,
}

/// A [`SortedRing`] with inline storage for `N` elements.
pub type StaticSortedRing<T, const N: usize> = SortedRing<T, [Option<T>; N]>;

impl<T, const N: usize> SortedRing<T, [Option<T>; N]> {
    pub const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
        }
    }
}

impl<T, const N: usize> Default for SortedRing<T, [Option<T>; N]> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SortedRing<T, BoxedSlots<T>> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(capacity),
        }
    }
}

impl<T, S: RingStorage<T>> SortedRing<T, S> {
    /// Insert `value` after every element `e` for which `precedes(e, value)`
    /// holds, scanning from the back.
    ///
    /// `precedes` must be consistent with the order already in the ring.
    /// Returns `Ok` with the evicted back element when a full ring made room,
    /// or `Err(value)` when the value was not stored. Nothing is dropped here.
    pub fn insert_by<F>(&mut self, value: T, mut precedes: F) -> Result<Option<T>, T>
    where
        F: FnMut(&T, &T) -> bool,
    {
        if self.ring.capacity() == 0 {
            return Err(value);
        }
        let mut pos = self.ring.len();
        while pos > 0 && !precedes(&self.ring[pos - 1], &value) {
            pos -= 1;
        }
        let mut evicted = None;
        if self.ring.is_full() {
            if pos == self.ring.len() {
                return Err(value);
            }
            evicted = self.ring.pop_back();
        }
        self.ring.insert_at_unchecked(pos, value);
        Ok(evicted)
    }

    /// Store `value` at logical position `idx` without comparing it to its
    /// neighbours. Fails if `idx > len` or the ring is full.
    pub fn insert_at(&mut self, value: T, idx: usize) -> bool {
        if idx > self.ring.len() || self.ring.is_full() {
            return false;
        }
        self.ring.insert_at_unchecked(idx, value);
        true
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.ring.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<T> {
        self.ring.pop_back()
    }

    pub fn remove<F>(&mut self, select: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.ring.remove(select)
    }

    pub fn remove_index(&mut self, idx: usize) -> Option<T> {
        self.ring.remove_index(idx)
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<T: Ord, S: RingStorage<T>> SortedRing<T, S> {
    /// Insert keeping ascending order. See the type docs for the full policy.
    pub fn insert(&mut self, value: T) -> bool {
        self.insert_by(value, |a, b| a <= b).is_ok()
    }
}

// Read-only: mutable element access could break the ordering.
impl<T, S> Deref for SortedRing<T, S> {
    type Target = RingBuffer<T, S>;

    fn deref(&self) -> &Self::Target {
        &self.ring
    }
}

impl<T: core::fmt::Debug, S: RingStorage<T>> core::fmt::Debug for SortedRing<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.ring, f)
    }
}
