//! The object cache: path in, shared decoded object out.
//!
//! Every cached object is either *active* (reference count above zero) or
//! *idle* (count zero, kept for reuse and ordered in an LRU list). Idle
//! objects are evicted from the LRU tail by [`ObjectCache::wash_out`], or
//! immediately when released with `evict_now`. Evicting an object closes the
//! package chain that was opened to load it.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Instant;

use larder_core::alloc::{FingerprintMap, HashMap, LruList};
use larder_core::profiling::profile_function;
use larder_core::{Fingerprint, fingerprint};

use crate::Asset;
use crate::config::{CacheConfig, LarderConfig};
use crate::error::{AssetError, AssetResult};
use crate::event::{CacheEvent, CacheEventBuffer};
use crate::io::{DirectoryStorage, PackageStorage};
use crate::loader::{AssetLoader, LoadContext, LoaderRegistry};
use crate::manifest::{ManifestReport, PackageRecord};
use crate::registry::PackageRegistry;

/// A type-erased cached object.
pub type SharedObject = Arc<dyn Any + Send + Sync>;

/// Stable identity of a cached object: the address of its shared allocation.
///
/// Valid while the cache holds the object; every `Arc` clone handed out for
/// the same entry has the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Identity of the allocation behind `object`.
    pub fn of<T: ?Sized>(object: &Arc<T>) -> Self {
        Self(Arc::as_ptr(object) as *const () as usize)
    }
}

/// One cached object and its bookkeeping.
struct CacheEntry {
    path: String,
    object: SharedObject,
    type_id: TypeId,
    type_name: &'static str,
    last_use: Instant,
    ref_count: u32,
    /// Payload size read from the package.
    byte_size: usize,
    record: Arc<PackageRecord>,
}

impl CacheEntry {
    fn check_type(&self, type_id: TypeId, type_name: &'static str) -> AssetResult<()> {
        if self.type_id == type_id {
            Ok(())
        } else {
            Err(AssetError::TypeMismatch {
                expected: type_name,
                actual: self.type_name,
            })
        }
    }
}

/// Reference-counted cache of objects materialized from packages.
///
/// # Example
///
/// ```ignore
/// let mut cache = ObjectCache::new(MemoryStorage::new(), CacheConfig::default());
/// cache.register_loader(TextLoader);
/// cache.load_manifest(manifest_bytes)?;
///
/// let a: Arc<String> = cache.get("Assets/intro.txt")?;
/// let b: Arc<String> = cache.get("Assets/intro.txt")?; // same object, count 2
/// cache.release(&a, false)?;
/// cache.release(&b, false)?; // idle, still cached
/// ```
pub struct ObjectCache<S: PackageStorage> {
    registry: PackageRegistry<S>,
    loaders: LoaderRegistry,
    config: CacheConfig,
    /// Entries with a reference count above zero.
    active: FingerprintMap<CacheEntry>,
    /// Entries with a reference count of zero, awaiting reuse or eviction.
    idle: FingerprintMap<CacheEntry>,
    lru: LruList<Fingerprint>,
    idle_bytes: u64,
    /// Object identity -> fingerprint, for both active and idle entries.
    identities: HashMap<ObjectId, Fingerprint>,
    /// Chains opened for an async read that has not finished. A read whose
    /// future was dropped leaves its entry here for the next load to reuse.
    reading: FingerprintMap<Arc<PackageRecord>>,
    events: CacheEventBuffer,
}

impl<S: PackageStorage> ObjectCache<S> {
    /// Create a cache over `storage`.
    pub fn new(storage: S, config: CacheConfig) -> Self {
        Self::with_registry(PackageRegistry::new(storage), config)
    }

    /// Create a cache over an existing registry.
    pub fn with_registry(registry: PackageRegistry<S>, config: CacheConfig) -> Self {
        Self {
            registry,
            loaders: LoaderRegistry::new(),
            lru: LruList::with_capacity(config.max_idle_entries),
            events: CacheEventBuffer::with_capacity(config.max_buffered_events),
            config,
            active: FingerprintMap::default(),
            idle: FingerprintMap::default(),
            idle_bytes: 0,
            identities: HashMap::default(),
            reading: FingerprintMap::default(),
        }
    }

    /// Register an asset loader.
    pub fn register_loader<L: AssetLoader>(&mut self, loader: L) {
        self.loaders.register(loader);
    }

    /// Parse and install a JSON manifest into the registry.
    pub fn load_manifest(&mut self, bytes: &[u8]) -> AssetResult<ManifestReport> {
        self.registry.load_manifest(bytes)
    }

    pub fn registry(&self) -> &PackageRegistry<S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PackageRegistry<S> {
        &mut self.registry
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the object at `path`, loading it if needed.
    ///
    /// Each successful call adds one reference that must be paired with a
    /// [`release`](Self::release).
    pub fn get<T: Asset>(&mut self, path: &str) -> AssetResult<Arc<T>> {
        profile_function!();
        if path.is_empty() {
            return Err(AssetError::NotFound {
                path: String::new(),
            });
        }

        let fingerprint = fingerprint(path);
        let type_id = TypeId::of::<T>();
        let object = match self.acquire_cached(fingerprint, type_id, T::type_name(), 1) {
            Some(cached) => cached?,
            None => self.load_now(fingerprint, path, type_id, T::type_name())?,
        };

        object.downcast::<T>().map_err(|_| AssetError::TypeMismatch {
            expected: T::type_name(),
            actual: "unknown",
        })
    }

    /// Drop one reference to `object`.
    ///
    /// At zero references the object becomes idle (kept for reuse) unless
    /// `evict_now` is set, in which case it is dropped and its package chain
    /// closed. Releasing an idle object with `evict_now` evicts it; releasing
    /// it without `evict_now`, or releasing an object this cache does not
    /// hold, is an invariant violation and leaves the cache unchanged.
    pub fn release<T: ?Sized>(&mut self, object: &Arc<T>, evict_now: bool) -> AssetResult<()> {
        profile_function!();
        let identity = ObjectId::of(object);
        let Some(&fingerprint) = self.identities.get(&identity) else {
            return Err(self.violation("release of an object not held by the cache".to_string()));
        };

        if self.idle.contains_key(&fingerprint) {
            if evict_now {
                self.evict(fingerprint);
                return Ok(());
            }
            return Err(self.violation(format!(
                "double release of {:#010x}: reference count is already zero",
                fingerprint
            )));
        }

        let Some(entry) = self.active.get_mut(&fingerprint) else {
            return Err(self.violation(format!("identity index points at missing entry {:#010x}", fingerprint)));
        };
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(());
        }

        if let Some(entry) = self.active.remove(&fingerprint) {
            if evict_now {
                self.destroy(fingerprint, entry);
            } else {
                self.park(fingerprint, entry);
            }
        }
        Ok(())
    }

    /// Evict idle entries from the LRU tail while over the configured
    /// ceilings. Returns the number evicted. Active entries are never touched.
    pub fn wash_out(&mut self) -> usize {
        profile_function!();
        let mut evicted = 0;
        while self.over_ceiling() {
            let Some(victim) = self.lru.back() else {
                break;
            };
            self.evict(victim);
            evicted += 1;
        }
        evicted
    }

    /// Evict every idle entry. Returns the number evicted.
    pub fn evict_all_idle(&mut self) -> usize {
        let mut evicted = 0;
        while let Some(victim) = self.lru.back() {
            self.evict(victim);
            evicted += 1;
        }
        evicted
    }

    /// Mark an idle entry as recently used without acquiring it, moving it
    /// away from the eviction end. Returns `false` if `path` is not idle.
    pub fn touch(&mut self, path: &str) -> bool {
        let fingerprint = fingerprint(path);
        match self.idle.get_mut(&fingerprint) {
            Some(entry) => {
                entry.last_use = Instant::now();
                self.lru.refresh(&fingerprint)
            }
            None => false,
        }
    }

    /// Reference count of the entry for `path` (zero if idle or absent).
    pub fn ref_count(&self, path: &str) -> u32 {
        self.active
            .get(&fingerprint(path))
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    /// Returns `true` if `path` is cached, active or idle.
    pub fn is_cached(&self, path: &str) -> bool {
        let fingerprint = fingerprint(path);
        self.active.contains_key(&fingerprint) || self.idle.contains_key(&fingerprint)
    }

    /// Returns `true` if `path` is cached with zero references.
    pub fn is_idle(&self, path: &str) -> bool {
        self.idle.contains_key(&fingerprint(path))
    }

    /// When the entry for `path` was last acquired or touched.
    pub fn last_use(&self, path: &str) -> Option<Instant> {
        let fingerprint = fingerprint(path);
        self.active
            .get(&fingerprint)
            .or_else(|| self.idle.get(&fingerprint))
            .map(|entry| entry.last_use)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Total payload bytes of idle entries.
    pub fn idle_bytes(&self) -> u64 {
        self.idle_bytes
    }

    /// Idle paths from most to least recently used.
    pub fn idle_paths(&self) -> Vec<&str> {
        self.lru
            .iter()
            .filter_map(|fingerprint| self.idle.get(&fingerprint))
            .map(|entry| entry.path.as_str())
            .collect()
    }

    /// Drain all pending cache events.
    ///
    /// Hosts should drain regularly: past
    /// [`CacheConfig::max_buffered_events`] the oldest events are discarded.
    pub fn drain_events(&mut self) -> impl Iterator<Item = CacheEvent> + '_ {
        self.events.drain()
    }

    /// Events discarded because nobody drained the buffer in time.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    pub fn iter_events(&self) -> impl Iterator<Item = &CacheEvent> {
        self.events.iter()
    }

    /// Add `count` references to a cached entry, reviving it if idle.
    ///
    /// `None` if nothing is cached for `fingerprint`. A type mismatch leaves
    /// the entry untouched.
    pub(crate) fn acquire_cached(
        &mut self,
        fingerprint: Fingerprint,
        type_id: TypeId,
        type_name: &'static str,
        count: u32,
    ) -> Option<AssetResult<SharedObject>> {
        if let Some(entry) = self.active.get_mut(&fingerprint) {
            if let Err(err) = entry.check_type(type_id, type_name) {
                return Some(Err(err));
            }
            entry.ref_count += count;
            entry.last_use = Instant::now();
            return Some(Ok(Arc::clone(&entry.object)));
        }

        let entry = self.idle.get(&fingerprint)?;
        if let Err(err) = entry.check_type(type_id, type_name) {
            return Some(Err(err));
        }
        let mut entry = self.unpark(fingerprint)?;
        entry.ref_count = count;
        entry.last_use = Instant::now();
        let object = Arc::clone(&entry.object);
        if count > 0 {
            self.active.insert(fingerprint, entry);
        } else {
            self.park(fingerprint, entry);
        }
        Some(Ok(object))
    }

    /// Load synchronously and cache with one reference.
    fn load_now(
        &mut self,
        fingerprint: Fingerprint,
        path: &str,
        type_id: TypeId,
        type_name: &'static str,
    ) -> AssetResult<SharedObject> {
        let record = self.open_for_load(fingerprint, path)?;

        let read = match self.registry.package(&record.package_name) {
            Some(package) => self.registry.storage().read_asset(package, &record.asset_name),
            None => Err(self.missing_package(&record)),
        };
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.abort_load(fingerprint, path, &record, err)),
        };

        self.finish_load(fingerprint, path, record, &bytes, type_id, type_name, 1)
    }

    /// Load through the storage's async read and cache with `waiters`
    /// references. Failures are logged and reported as `None`.
    pub(crate) async fn load_for_waiters(
        &mut self,
        fingerprint: Fingerprint,
        path: &str,
        type_id: TypeId,
        type_name: &'static str,
        waiters: u32,
    ) -> Option<SharedObject> {
        // A synchronous `get` may have loaded it while the request waited.
        if let Some(cached) = self.acquire_cached(fingerprint, type_id, type_name, waiters) {
            return cached
                .inspect_err(|err| tracing::warn!("Async load of '{}' rejected: {}", path, err))
                .ok();
        }

        let record = self.open_for_load(fingerprint, path).ok()?;

        let read = match self.registry.package(&record.package_name) {
            Some(package) => self
                .registry
                .storage()
                .read_asset_async(package, &record.asset_name),
            None => {
                let err = self.missing_package(&record);
                self.abort_load(fingerprint, path, &record, err);
                return None;
            }
        };
        self.reading.insert(fingerprint, Arc::clone(&record));
        let read = read.await;
        self.reading.remove(&fingerprint);
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(err) => {
                self.abort_load(fingerprint, path, &record, err);
                return None;
            }
        };

        self.finish_load(fingerprint, path, record, &bytes, type_id, type_name, waiters)
            .ok()
    }

    fn open_for_load(&mut self, fingerprint: Fingerprint, path: &str) -> AssetResult<Arc<PackageRecord>> {
        if let Some(record) = self.reading.remove(&fingerprint) {
            tracing::debug!("Resuming abandoned read of '{}'", path);
            return Ok(record);
        }
        self.wash_out();
        match self.registry.open_package_chain(fingerprint) {
            Ok(record) => Ok(record),
            Err(err) => {
                let err = if self.registry.record(fingerprint).is_none() {
                    AssetError::NotFound {
                        path: path.to_string(),
                    }
                } else {
                    err
                };
                self.report_failure(fingerprint, path, &err);
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_load(
        &mut self,
        fingerprint: Fingerprint,
        path: &str,
        record: Arc<PackageRecord>,
        bytes: &[u8],
        type_id: TypeId,
        type_name: &'static str,
        ref_count: u32,
    ) -> AssetResult<SharedObject> {
        let decoded = self
            .loaders
            .load_erased(type_id, type_name, LoadContext::new(path, &record, bytes));
        let object: SharedObject = match decoded {
            Ok(boxed) => Arc::from(boxed),
            Err(err) => return Err(self.abort_load(fingerprint, path, &record, err)),
        };

        tracing::debug!("Loaded '{}' as {} ({} bytes)", path, type_name, bytes.len());
        self.identities.insert(ObjectId::of(&object), fingerprint);
        self.events.push(CacheEvent::Loaded {
            fingerprint,
            path: path.to_string(),
            type_name,
        });

        let entry = CacheEntry {
            path: path.to_string(),
            object: Arc::clone(&object),
            type_id,
            type_name,
            last_use: Instant::now(),
            ref_count,
            byte_size: bytes.len(),
            record,
        };
        if ref_count > 0 {
            self.active.insert(fingerprint, entry);
        } else {
            self.park(fingerprint, entry);
        }
        Ok(object)
    }

    /// Undo the chain opened for a failed load.
    fn abort_load(
        &mut self,
        fingerprint: Fingerprint,
        path: &str,
        record: &PackageRecord,
        err: AssetError,
    ) -> AssetError {
        if let Err(close_err) = self.registry.close_package_chain(record) {
            tracing::error!("Closing packages after failed load of '{}': {}", path, close_err);
        }
        self.report_failure(fingerprint, path, &err);
        err
    }

    fn report_failure(&mut self, fingerprint: Fingerprint, path: &str, err: &AssetError) {
        tracing::error!("Failed to load '{}': {}", path, err);
        self.events.push(CacheEvent::LoadFailed {
            fingerprint,
            path: path.to_string(),
            error: err.to_string(),
        });
    }

    fn missing_package(&self, record: &PackageRecord) -> AssetError {
        AssetError::invariant(format!(
            "package '{}' not open after opening its chain",
            record.package_name
        ))
    }

    fn over_ceiling(&self) -> bool {
        self.idle.len() > self.config.max_idle_entries
            || self
                .config
                .max_idle_bytes
                .is_some_and(|max| self.idle_bytes > max)
    }

    fn park(&mut self, fingerprint: Fingerprint, entry: CacheEntry) {
        self.idle_bytes += entry.byte_size as u64;
        self.lru.insert_to_head(fingerprint);
        self.idle.insert(fingerprint, entry);
    }

    fn unpark(&mut self, fingerprint: Fingerprint) -> Option<CacheEntry> {
        let entry = self.idle.remove(&fingerprint)?;
        self.lru.remove(&fingerprint);
        self.idle_bytes -= entry.byte_size as u64;
        Some(entry)
    }

    fn evict(&mut self, fingerprint: Fingerprint) {
        if let Some(entry) = self.unpark(fingerprint) {
            self.destroy(fingerprint, entry);
        }
    }

    /// Drop the object and close the package chain it was loaded from.
    fn destroy(&mut self, fingerprint: Fingerprint, entry: CacheEntry) {
        self.identities.remove(&ObjectId::of(&entry.object));
        if let Err(err) = self.registry.close_package_chain(&entry.record) {
            tracing::error!("Closing packages for '{}': {}", entry.path, err);
        }
        tracing::debug!("Evicted '{}'", entry.path);
        self.events.push(CacheEvent::Evicted {
            fingerprint,
            path: entry.path,
        });
    }

    fn violation(&self, message: String) -> AssetError {
        let err = AssetError::invariant(message);
        tracing::error!("{}", err);
        err
    }
}

impl ObjectCache<DirectoryStorage> {
    /// Open the package directory named by `config` and load its manifest.
    ///
    /// Loaders still have to be registered by the caller.
    pub fn from_config(config: &LarderConfig) -> AssetResult<Self> {
        let manifest_path = config.manifest_path();
        let bytes = std::fs::read(&manifest_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound {
                    path: manifest_path.display().to_string(),
                }
            } else {
                AssetError::IoError {
                    path: manifest_path.clone(),
                    source: e,
                }
            }
        })?;

        let mut cache = Self::new(DirectoryStorage::new(&config.package_root), config.cache.clone());
        let report = cache.load_manifest(&bytes)?;
        tracing::info!(
            "Opened package root {} ({} records, {} duplicates)",
            config.package_root.display(),
            report.loaded,
            report.duplicates.len()
        );
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStorage;
    use crate::loader::{BytesLoader, TextLoader};
    use crate::manifest::Manifest;

    fn storage() -> MemoryStorage {
        MemoryStorage::new()
            .with_package("base", [("a.txt", "alpha")])
            .with_package("extra", [("b.txt", "bravo"), ("c.txt", "charlie")])
    }

    fn manifest() -> Manifest {
        Manifest::new()
            .with(PackageRecord::for_path("A", "a.txt", "base"))
            .with(PackageRecord::for_path("B", "b.txt", "extra").depends_on("base"))
            .with(PackageRecord::for_path("C", "c.txt", "extra").depends_on("base"))
    }

    fn cache(storage: &MemoryStorage, config: CacheConfig) -> ObjectCache<&MemoryStorage> {
        let mut cache = ObjectCache::new(storage, config);
        cache.register_loader(TextLoader);
        cache.register_loader(BytesLoader);
        cache.registry_mut().install_manifest(manifest());
        cache
    }

    #[test]
    fn test_get_shares_one_object() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let first: Arc<String> = cache.get("A").unwrap();
        let second: Arc<String> = cache.get("A").unwrap();
        assert_eq!(*first, "alpha");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.ref_count("A"), 2);
        assert_eq!(storage.read_count(), 1);
    }

    #[test]
    fn test_release_parks_then_revives() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let text: Arc<String> = cache.get("A").unwrap();
        cache.release(&text, false).unwrap();
        assert!(cache.is_idle("A"));
        assert_eq!(cache.active_count(), 0);
        assert_eq!(cache.idle_bytes(), 5);
        assert_eq!(cache.registry().package_ref_count("base"), 1);

        let again: Arc<String> = cache.get("A").unwrap();
        assert!(Arc::ptr_eq(&text, &again));
        assert!(!cache.is_idle("A"));
        assert_eq!(cache.idle_bytes(), 0);
        assert_eq!(storage.read_count(), 1);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let text: Arc<String> = cache.get("A").unwrap();
        cache.release(&text, false).unwrap();
        let err = cache.release(&text, false).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(cache.ref_count("A"), 0);
        assert!(cache.is_idle("A"));
    }

    #[test]
    fn test_release_of_foreign_object() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());
        let stranger = Arc::new(String::from("alpha"));
        assert!(cache.release(&stranger, true).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_type_mismatch_leaves_count() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let _text: Arc<String> = cache.get("A").unwrap();
        let err = cache.get::<Vec<u8>>("A").unwrap_err();
        assert!(matches!(err, AssetError::TypeMismatch { actual: "String", .. }));
        assert_eq!(cache.ref_count("A"), 1);
    }

    #[test]
    fn test_wash_out_respects_entry_ceiling() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::new().max_idle_entries(1));

        let a: Arc<String> = cache.get("A").unwrap();
        let b: Arc<String> = cache.get("B").unwrap();
        cache.release(&a, false).unwrap();
        cache.release(&b, false).unwrap();
        assert_eq!(cache.idle_paths(), vec!["B", "A"]);

        // Loading C washes out the oldest idle entry first.
        let _c: Arc<String> = cache.get("C").unwrap();
        assert!(!cache.is_cached("A"));
        assert!(cache.is_idle("B"));
        assert_eq!(cache.registry().package_ref_count("base"), 2);
    }

    #[test]
    fn test_wash_out_respects_byte_ceiling() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::new().max_idle_bytes(7));

        let b: Arc<String> = cache.get("B").unwrap();
        let c: Arc<String> = cache.get("C").unwrap();
        cache.release(&b, false).unwrap();
        cache.release(&c, false).unwrap();
        assert_eq!(cache.idle_bytes(), 12);

        assert_eq!(cache.wash_out(), 1);
        assert!(!cache.is_cached("B"));
        assert!(cache.is_idle("C"));
        assert_eq!(cache.idle_bytes(), 7);

        assert_eq!(cache.evict_all_idle(), 1);
        assert_eq!(cache.idle_count(), 0);
        assert_eq!(cache.registry().open_package_count(), 0);
    }

    #[test]
    fn test_evict_now_closes_chain() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let b: Arc<String> = cache.get("B").unwrap();
        let again: Arc<String> = cache.get("B").unwrap();
        cache.release(&again, true).unwrap();
        assert_eq!(cache.ref_count("B"), 1);

        cache.release(&b, true).unwrap();
        assert!(!cache.is_cached("B"));
        assert_eq!(cache.registry().open_package_count(), 0);
        assert_eq!(storage.close_count(), 2);
        let events: Vec<_> = cache.drain_events().collect();
        assert!(events[0].is_loaded());
        assert!(events[1].is_evicted());
    }

    #[test]
    fn test_release_idle_with_evict_now() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let a: Arc<String> = cache.get("A").unwrap();
        cache.release(&a, false).unwrap();
        cache.release(&a, true).unwrap();
        assert!(!cache.is_cached("A"));
        assert!(cache.release(&a, true).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_touch_changes_victim() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());

        let a: Arc<String> = cache.get("A").unwrap();
        let b: Arc<String> = cache.get("B").unwrap();
        cache.release(&a, false).unwrap();
        cache.release(&b, false).unwrap();

        assert!(cache.touch("A"));
        assert!(!cache.touch("C"));
        assert_eq!(cache.idle_paths(), vec!["A", "B"]);
    }

    #[test]
    fn test_failed_decode_caches_nothing() {
        let storage = MemoryStorage::new().with_package("base", [("bad.txt", vec![0xffu8, 0xfe])]);
        let mut cache = ObjectCache::new(&storage, CacheConfig::default());
        cache.register_loader(TextLoader);
        cache
            .registry_mut()
            .install_manifest(Manifest::new().with(PackageRecord::for_path("Bad", "bad.txt", "base")));

        let err = cache.get::<String>("Bad").unwrap_err();
        assert!(matches!(err, AssetError::LoaderError { .. }));
        assert!(!cache.is_cached("Bad"));
        assert_eq!(cache.registry().open_package_count(), 0);
        assert_eq!(storage.close_count(), 1);
        assert!(cache.drain_events().any(|e| e.is_failed()));
    }

    #[test]
    fn test_undrained_events_are_bounded() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::new().max_buffered_events(2));

        for _ in 0..3 {
            let a: Arc<String> = cache.get("A").unwrap();
            cache.release(&a, true).unwrap();
        }
        assert_eq!(cache.iter_events().count(), 2);
        assert_eq!(cache.dropped_events(), 4);
        let last: Vec<_> = cache.drain_events().collect();
        assert!(last[0].is_loaded());
        assert!(last[1].is_evicted());
    }

    #[test]
    fn test_unknown_path() {
        let storage = storage();
        let mut cache = cache(&storage, CacheConfig::default());
        let err = cache.get::<String>("Nope").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { ref path } if path == "Nope"));
        assert!(cache.get::<String>("").unwrap_err().is_not_found());
    }
}
