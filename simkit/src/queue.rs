use std::collections::VecDeque;

/// Abstraction over [`VecDeque`] that allows to limit the capacity of the queue.
/// This means that push operations can fail, in which case the rejected value is handed back.
/// By default, the capacity is equal to [`usize::MAX`], which makes unlimited in practice.
///
/// # Examples
///
/// ```
/// # use simkit::Queue;
///
/// let mut queue: Queue<i32> = Queue::default();
/// assert!(queue.push_back(1).is_ok()); // Always succeeds
///
/// let mut queue: Queue<i32> = Queue::bounded(2);
/// assert!(queue.push_back(1).is_ok());
/// assert!(queue.push_back(2).is_ok());
/// assert_eq!(queue.push_back(3), Err(3));
/// ```
#[derive(Debug, Clone)]
pub struct Queue<T> {
    inner: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            inner: VecDeque::default(),
            capacity: usize::MAX,
        }
    }
}

impl<T> Queue<T> {
    /// Creates a queue with the given capacity.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Creates a queue bounded by `capacity` if given, or an unbounded one otherwise.
    #[must_use]
    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        capacity.map_or_else(Self::default, Self::bounded)
    }

    /// Appends an element to the back of the `Queue`.
    ///
    /// # Errors
    ///
    /// Returns the value back if the queue is full.
    pub fn push_back(&mut self, value: T) -> Result<(), T> {
        if self.inner.len() < self.capacity {
            self.inner.push_back(value);
            Ok(())
        } else {
            Err(value)
        }
    }

    /// Removes the first element and returns it, or `None` if the `Queue` is empty.
    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    /// Removes and returns the first element matching `predicate`, preserving the order of the
    /// remaining elements.
    pub fn remove_first<P>(&mut self, predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let position = self.inner.iter().position(predicate)?;
        self.inner.remove(position)
    }

    /// Returns a reference to the first element.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.inner.front()
    }

    /// Iterates over the elements from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }

    /// Returns the number of elements in the `Queue`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Checks if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if another push would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.capacity
    }

    /// The maximum number of elements the queue holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
