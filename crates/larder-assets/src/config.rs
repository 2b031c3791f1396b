//! Configuration for the cache and the load scheduler.
//!
//! Every struct has working defaults and can also be read from JSON; missing
//! fields fall back to the defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AssetResult;

/// Eviction ceilings for idle (zero-reference) cache entries.
///
/// [`ObjectCache::wash_out`](crate::ObjectCache::wash_out) evicts from the
/// LRU tail while either ceiling is exceeded. Active entries never count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of idle entries kept for reuse.
    pub max_idle_entries: usize,
    /// Maximum total payload bytes of idle entries, if bounded.
    pub max_idle_bytes: Option<u64>,
    /// Events kept until the host drains them; older ones are dropped.
    /// Zero keeps every event.
    pub max_buffered_events: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_idle_entries: 256,
            max_idle_bytes: None,
            max_buffered_events: 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle entry ceiling.
    pub fn max_idle_entries(mut self, max: usize) -> Self {
        self.max_idle_entries = max;
        self
    }

    /// Set the idle byte ceiling.
    pub fn max_idle_bytes(mut self, max: u64) -> Self {
        self.max_idle_bytes = Some(max);
        self
    }

    /// Set the event buffer limit (zero = unbounded).
    pub fn max_buffered_events(mut self, max: usize) -> Self {
        self.max_buffered_events = max;
        self
    }
}

/// Settings for the asynchronous load scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Longest stretch of uninterrupted loading, in whole milliseconds,
    /// before the pump hands control back to the host.
    pub time_budget_ms: u64,
    /// Pending-load records kept for reuse.
    pub pending_pool_capacity: usize,
    /// Callback records kept for reuse.
    pub callback_pool_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 200,
            pending_pool_capacity: 50,
            callback_pool_capacity: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The time budget as a `Duration`.
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    /// Set the time budget, rounded up to whole milliseconds so that only
    /// `Duration::ZERO` means "yield after every request".
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = u64::try_from(budget.as_micros().div_ceil(1000)).unwrap_or(u64::MAX);
        self
    }

    /// Set both pool capacities.
    pub fn with_pool_capacity(mut self, pending: usize, callbacks: usize) -> Self {
        self.pending_pool_capacity = pending;
        self.callback_pool_capacity = callbacks;
        self
    }
}

/// Top-level configuration for a disk-backed cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LarderConfig {
    /// Directory holding the package archives and the manifest.
    pub package_root: PathBuf,
    /// Manifest file name, relative to `package_root`.
    pub manifest: String,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for LarderConfig {
    fn default() -> Self {
        Self {
            package_root: PathBuf::from("packages"),
            manifest: "manifest.json".to_string(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl LarderConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(bytes: &[u8]) -> AssetResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Full path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.package_root.join(&self.manifest)
    }
}
