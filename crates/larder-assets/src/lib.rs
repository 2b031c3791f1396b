//! Package-backed object cache.
//!
//! Assets live inside packages (archives on disk or in memory) described by a
//! manifest. The [`ObjectCache`] resolves a logical path to a decoded object,
//! opening the owning package and its dependency packages through the
//! [`PackageRegistry`], reference counting the result and parking released
//! objects in an LRU list until they are evicted. The [`LoadScheduler`] feeds
//! the same cache from prioritized asynchronous requests.
//!
//! # Example
//!
//! ```ignore
//! let storage = DirectoryStorage::new("packages");
//! let mut cache = ObjectCache::new(storage, CacheConfig::default());
//! cache.register_loader(TextLoader);
//! cache.load_manifest(&std::fs::read("packages/manifest.json")?)?;
//!
//! let text: Arc<String> = cache.get("Assets/Text/intro.txt")?;
//! cache.release(&text, false)?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod io;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod scheduler;

pub use cache::{ObjectCache, ObjectId, SharedObject};
pub use config::{CacheConfig, LarderConfig, SchedulerConfig};
pub use error::{AssetError, AssetResult};
pub use event::{CacheEvent, CacheEventBuffer};
pub use io::{BytesFuture, DirectoryStorage, MemoryPackage, MemoryStorage, PackageArchive, PackageStorage};
pub use loader::{ANY_EXTENSION, AssetLoader, BytesLoader, LoadContext, LoaderRegistry, TextLoader};
pub use manifest::{DuplicateRecord, Manifest, ManifestReport, PackageRecord};
pub use registry::PackageRegistry;
pub use scheduler::{LoadPriority, LoadScheduler, PumpStatus, RequestStatus};

pub use larder_core::{Fingerprint, fingerprint};

/// Marker trait for types that can be materialized from a package.
pub trait Asset: Send + Sync + 'static {
    /// Human-readable name for diagnostics.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl Asset for String {
    fn type_name() -> &'static str {
        "String"
    }
}

impl Asset for Vec<u8> {
    fn type_name() -> &'static str {
        "Bytes"
    }
}

pub mod prelude {
    pub use crate::{
        Asset, AssetError, AssetLoader, AssetResult, BytesLoader, CacheConfig, CacheEvent,
        DirectoryStorage, LoadContext, LoadPriority, LoadScheduler, Manifest, MemoryStorage,
        ObjectCache, PackageRecord, PackageStorage, PumpStatus, RequestStatus, SchedulerConfig,
        TextLoader,
    };
}
