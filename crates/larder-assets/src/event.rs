//! Cache events for hosts that want to observe loads and evictions.

use std::collections::VecDeque;

use larder_core::Fingerprint;

/// Events emitted by the object cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// An object was materialized from its package.
    Loaded {
        fingerprint: Fingerprint,
        /// The logical path that was requested.
        path: String,
        /// Type name of the materialized object.
        type_name: &'static str,
    },

    /// An object was dropped and its package chain closed.
    Evicted {
        fingerprint: Fingerprint,
        path: String,
    },

    /// A load failed; nothing was cached.
    LoadFailed {
        fingerprint: Fingerprint,
        path: String,
        /// Error message.
        error: String,
    },
}

impl CacheEvent {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            CacheEvent::Loaded { fingerprint, .. }
            | CacheEvent::Evicted { fingerprint, .. }
            | CacheEvent::LoadFailed { fingerprint, .. } => *fingerprint,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            CacheEvent::Loaded { path, .. }
            | CacheEvent::Evicted { path, .. }
            | CacheEvent::LoadFailed { path, .. } => path,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, CacheEvent::Loaded { .. })
    }

    pub fn is_evicted(&self) -> bool {
        matches!(self, CacheEvent::Evicted { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CacheEvent::LoadFailed { .. })
    }
}

/// A buffer of cache events, drained by the host.
///
/// With a non-zero capacity the buffer keeps only the newest events; older
/// ones are dropped and counted. A capacity of zero never drops.
#[derive(Debug, Default)]
pub struct CacheEventBuffer {
    events: VecDeque<CacheEvent>,
    capacity: usize,
    dropped: u64,
}

impl CacheEventBuffer {
    /// Create an unbounded buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding at most `capacity` events (zero = unbounded).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: CacheEvent) {
        if self.capacity > 0 && self.events.len() >= self.capacity {
            self.events.pop_front();
            if self.dropped == 0 {
                tracing::warn!("Cache event buffer full ({}), dropping oldest events", self.capacity);
            }
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Drain all events from the buffer.
    pub fn drain(&mut self) -> impl Iterator<Item = CacheEvent> + '_ {
        self.events.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Maximum number of buffered events (zero = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
