//! Larder Core
//!
//! Shared building blocks for the Larder package cache: hash collections,
//! the LRU list and object pool, path fingerprints, logging and profiling.

pub mod alloc;
pub mod fingerprint;
pub mod logging;
pub mod profiling;

pub use fingerprint::{Fingerprint, fingerprint};
