use core::ops::{Deref, DerefMut};

use super::{BoxedSlots, RingBuffer, RingStorage};

/// A queue with fixed capacity where elements may be added and removed at
/// both ends.
///
/// Pushing onto a full queue overwrites the element at the opposite end:
/// `push_front` evicts the back, `push_back` evicts the front. Capacity is
/// never exceeded and there is no separate overflow error.
pub struct RingQueue<T, S = BoxedSlots<T>> {
    ring: RingBuffer<T, S>,
}

/// A [`RingQueue`] with inline storage for `N` elements.
pub type StaticRingQueue<T, const N: usize> = RingQueue<T, [Option<T>; N]>;

impl<T, const N: usize> RingQueue<T, [Option<T>; N]> {
    pub const fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
        }
    }
}

impl<T, const N: usize> Default for RingQueue<T, [Option<T>; N]> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RingQueue<T, BoxedSlots<T>> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(capacity),
        }
    }
}

impl<T, S: RingStorage<T>> RingQueue<T, S> {
    /// Push at the front, returning the evicted back element if full.
    pub fn push_front(&mut self, value: T) -> Option<T> {
        if self.ring.capacity() == 0 {
            return Some(value);
        }
        let was_full = self.ring.is_full();
        if !self.ring.is_empty() {
            self.ring.decrement_start();
        }
        let phys = self.ring.physical(0);
        let evicted = self.ring.store.slots_mut()[phys].replace(value);
        if !was_full {
            self.ring.len += 1;
        }
        evicted
    }

    /// Push at the back, returning the evicted front element if full.
    pub fn push_back(&mut self, value: T) -> Option<T> {
        if self.ring.capacity() == 0 {
            return Some(value);
        }
        if self.ring.is_full() {
            // The old front slot becomes the new back slot.
            let phys = self.ring.physical(0);
            let evicted = self.ring.store.slots_mut()[phys].replace(value);
            self.ring.increment_start();
            evicted
        } else {
            let phys = self.ring.physical(self.ring.len);
            self.ring.store.slots_mut()[phys] = Some(value);
            self.ring.len += 1;
            None
        }
    }
}

impl<T, S> Deref for RingQueue<T, S> {
    type Target = RingBuffer<T, S>;

    fn deref(&self) -> &Self::Target {
        &self.ring
    }
}

impl<T, S> DerefMut for RingQueue<T, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ring
    }
}

impl<T: core::fmt::Debug, S: RingStorage<T>> core::fmt::Debug for RingQueue<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.ring, f)
    }
}
