//! Reusable record pools.
//!
//! One pool per concrete record type. Records are reset on recycle and kept
//! for the next `spawn`, so the hot load/release paths reuse their buffers
//! instead of allocating fresh ones.

use crate::profiling::profile_function;

/// A record that can live in an [`ObjectPool`].
pub trait Poolable: Default {
    /// Clear the record back to its freshly-constructed state.
    ///
    /// Implementations should keep allocated capacity (e.g. `Vec::clear`).
    fn reset(&mut self);
}

/// A stack of reusable records of one type.
///
/// A `max_count` of zero means the pool is unbounded and starts empty.
/// Otherwise `max_count` records are preallocated and at most that many are
/// retained on recycle; extras are dropped.
///
/// Pools are single-threaded by contract: every operation takes `&mut self`.
#[derive(Debug)]
pub struct ObjectPool<T: Poolable> {
    free: Vec<T>,
    max_count: usize,
    outstanding: usize,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a pool, preallocating `max_count` records.
    pub fn new(max_count: usize) -> Self {
        let mut free = Vec::with_capacity(max_count);
        free.resize_with(max_count, T::default);
        Self {
            free,
            max_count,
            outstanding: 0,
        }
    }

    /// Create an unbounded pool with nothing preallocated.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Take a record from the pool.
    ///
    /// When the pool is empty a new record is created only if
    /// `create_if_empty` is set; otherwise `None` is returned.
    pub fn spawn(&mut self, create_if_empty: bool) -> Option<T> {
        profile_function!();
        let record = match self.free.pop() {
            Some(record) => record,
            None if create_if_empty => T::default(),
            None => return None,
        };
        self.outstanding += 1;
        Some(record)
    }

    /// Take a record, creating one if the pool is empty.
    pub fn spawn_or_default(&mut self) -> T {
        self.spawn(true).unwrap_or_default()
    }

    /// Reset a record and return it to the pool.
    ///
    /// Returns `false` if the pool is full and the record was dropped.
    pub fn recycle(&mut self, mut record: T) -> bool {
        profile_function!();
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.max_count > 0 && self.free.len() >= self.max_count {
            return false;
        }
        record.reset();
        self.free.push(record);
        true
    }

    /// Number of records currently available for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of records spawned and not yet recycled.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// The retention limit (zero for unbounded).
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_count == 0
    }
}

impl<T: Poolable> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}
