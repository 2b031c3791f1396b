//! Allocation-light collections used on the load and release paths.
//!
//! - AHash-backed `HashMap`/`HashSet` re-exports
//! - [`LruList`]: recency list with O(1) refresh and tail eviction
//! - [`ObjectPool`]: reusable record stacks for short-lived bookkeeping

pub mod lru;
pub mod pool;

pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};
pub use lru::LruList;
pub use pool::{ObjectPool, Poolable};

/// Map keyed by a 32-bit path or package fingerprint.
pub type FingerprintMap<V> = HashMap<crate::Fingerprint, V>;
