use std::collections::VecDeque;
use std::fmt;

/// Fixed-capacity queue ordered oldest to newest. Pushing into a full queue
/// evicts the oldest item.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    /// Capacity is clamped to at least one slot.
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let capacity = cap.max(1);

        Self {
            deque: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends at the newest end, returning the evicted oldest item if the queue was full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };

        self.deque.push_back(item);

        evicted
    }

    /// Removes the oldest item.
    #[inline]
    pub fn pop_oldest(&mut self) -> Option<T> {
        self.deque.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.deque.clear()
    }

    #[inline]
    pub fn newest(&self) -> Option<&T> {
        self.deque.back()
    }

    #[inline]
    pub fn oldest(&self) -> Option<&T> {
        self.deque.front()
    }

    /// Oldest to newest.
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ T> + ExactSizeIterator {
        self.deque.iter()
    }

    /// The last `n` items, oldest to newest.
    #[inline]
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &'_ T> {
        self.deque.iter().skip(self.deque.len().saturating_sub(n))
    }
}
