//! Priority-tiered, time-budgeted loading on top of [`ObjectCache`].
//!
//! Requests are queued per [`LoadPriority`] and drained by [`LoadScheduler::pump`],
//! a single cooperative loop that sweeps the tiers high to low. Concurrent requests for the same path share one
//! pending load: the object is read once and every waiter's callback receives
//! the same shared object, in registration order.
//!
//! ```ignore
//! let mut scheduler = LoadScheduler::new(SchedulerConfig::default());
//! scheduler.request_load(&mut cache, "Assets/intro.txt", LoadPriority::High, |path, text: Option<Arc<String>>| {
//!     println!("{path}: {:?}", text);
//! });
//!
//! // Once per frame:
//! scheduler.pump_blocking(&mut cache);
//! ```

use std::any::TypeId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use larder_core::alloc::{FingerprintMap, ObjectPool, Poolable};
use larder_core::profiling::profile_function;
use larder_core::{Fingerprint, fingerprint};

use crate::Asset;
use crate::cache::{ObjectCache, SharedObject};
use crate::config::SchedulerConfig;
use crate::io::PackageStorage;

/// Queue tier of a load request.
///
/// The pump sweeps the tiers high to low, taking one request from each
/// non-empty tier per pass, so higher tiers go first without starving lower
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LoadPriority {
    High,
    Medium,
    #[default]
    Low,
}

impl LoadPriority {
    /// All tiers, highest first.
    pub const ALL: [LoadPriority; 3] = [LoadPriority::High, LoadPriority::Medium, LoadPriority::Low];

    fn index(self) -> usize {
        self as usize
    }
}

/// What [`LoadScheduler::request_load`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// The object was cached; the callback already ran.
    Completed,
    /// A new pending load was queued.
    Queued,
    /// The request joined a load already pending for the same path.
    Joined,
    /// The request could not be served; the callback already ran with `None`.
    Rejected,
}

/// Why [`LoadScheduler::pump`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// The time budget ran out with requests still queued.
    Yielded,
    /// Every tier is empty.
    Idle,
}

type ErasedCallback = Box<dyn FnOnce(&str, Option<SharedObject>)>;

/// A pooled waiter.
#[derive(Default)]
struct Callback {
    function: Option<ErasedCallback>,
}

impl Poolable for Callback {
    fn reset(&mut self) {
        self.function = None;
    }
}

/// A pooled in-flight request, one per fingerprint.
struct PendingLoad {
    fingerprint: Fingerprint,
    path: String,
    priority: LoadPriority,
    asset_type: TypeId,
    type_name: &'static str,
    waiters: Vec<Callback>,
}

impl Default for PendingLoad {
    fn default() -> Self {
        Self {
            fingerprint: 0,
            path: String::new(),
            priority: LoadPriority::default(),
            asset_type: TypeId::of::<()>(),
            type_name: "",
            waiters: Vec::new(),
        }
    }
}

impl Poolable for PendingLoad {
    fn reset(&mut self) {
        self.fingerprint = 0;
        self.path.clear();
        self.priority = LoadPriority::default();
        self.asset_type = TypeId::of::<()>();
        self.type_name = "";
        self.waiters.clear();
    }
}

/// Cooperative loader draining three priority tiers under a time budget.
pub struct LoadScheduler {
    config: SchedulerConfig,
    tiers: [VecDeque<Fingerprint>; 3],
    /// Tier the current sweep visits next.
    cursor: usize,
    /// Every queued or loading request, until its waiters have been called.
    pending: FingerprintMap<PendingLoad>,
    pending_pool: ObjectPool<PendingLoad>,
    callback_pool: ObjectPool<Callback>,
    completed: u64,
}

impl Default for LoadScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl LoadScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            pending_pool: ObjectPool::new(config.pending_pool_capacity),
            callback_pool: ObjectPool::new(config.callback_pool_capacity),
            config,
            tiers: Default::default(),
            cursor: 0,
            pending: FingerprintMap::default(),
            completed: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Request `path` as a `T`, calling `callback` once with the result.
    ///
    /// A cached object is handed to the callback immediately. Otherwise the
    /// request joins the pending load for `path`, or queues a new one on the
    /// `priority` tier. Every `Some` delivered holds one cache reference that
    /// the receiver must [`release`](ObjectCache::release).
    pub fn request_load<S, T, F>(
        &mut self,
        cache: &mut ObjectCache<S>,
        path: &str,
        priority: LoadPriority,
        callback: F,
    ) -> RequestStatus
    where
        S: PackageStorage,
        T: Asset,
        F: FnOnce(&str, Option<Arc<T>>) + 'static,
    {
        self.request_load_with_fingerprint(cache, path, fingerprint(path), priority, callback)
    }

    /// Like [`request_load`](Self::request_load) with a precomputed
    /// fingerprint of `path`.
    pub fn request_load_with_fingerprint<S, T, F>(
        &mut self,
        cache: &mut ObjectCache<S>,
        path: &str,
        fingerprint: Fingerprint,
        priority: LoadPriority,
        callback: F,
    ) -> RequestStatus
    where
        S: PackageStorage,
        T: Asset,
        F: FnOnce(&str, Option<Arc<T>>) + 'static,
    {
        profile_function!();
        if path.is_empty() {
            tracing::warn!("Ignoring load request with an empty path");
            callback(path, None);
            return RequestStatus::Rejected;
        }

        let asset_type = TypeId::of::<T>();
        match cache.acquire_cached(fingerprint, asset_type, T::type_name(), 1) {
            Some(Ok(object)) => {
                callback(path, object.downcast::<T>().ok());
                return RequestStatus::Completed;
            }
            Some(Err(err)) => {
                tracing::warn!("Load request for '{}' rejected: {}", path, err);
                callback(path, None);
                return RequestStatus::Rejected;
            }
            None => {}
        }

        let mut waiter = self.callback_pool.spawn_or_default();
        waiter.function = Some(Box::new(move |path: &str, object: Option<SharedObject>| {
            callback(path, object.and_then(|object| object.downcast::<T>().ok()));
        }));

        if let Some(pending) = self.pending.get_mut(&fingerprint) {
            if pending.asset_type != asset_type {
                tracing::warn!(
                    "Load request for '{}' as {} rejected: already pending as {}",
                    path,
                    T::type_name(),
                    pending.type_name
                );
                if let Some(function) = waiter.function.take() {
                    function(path, None);
                }
                self.callback_pool.recycle(waiter);
                return RequestStatus::Rejected;
            }
            pending.waiters.push(waiter);
            return RequestStatus::Joined;
        }

        let mut pending = self.pending_pool.spawn_or_default();
        pending.fingerprint = fingerprint;
        pending.path.push_str(path);
        pending.priority = priority;
        pending.asset_type = asset_type;
        pending.type_name = T::type_name();
        pending.waiters.push(waiter);

        self.tiers[priority.index()].push_back(fingerprint);
        self.pending.insert(fingerprint, pending);
        tracing::trace!("Queued '{}' at {:?} priority", path, priority);
        RequestStatus::Queued
    }

    /// Drain queued requests.
    ///
    /// Each pass visits the tiers high, medium, low and completes the head
    /// request of every non-empty one. Returns [`PumpStatus::Yielded`] once
    /// the time budget has elapsed after a completed request with more still
    /// queued; the next call resumes the same pass. Returns
    /// [`PumpStatus::Idle`] when nothing is left. A request that has started
    /// always completes before the budget is checked.
    pub async fn pump<S: PackageStorage>(&mut self, cache: &mut ObjectCache<S>) -> PumpStatus {
        let started = Instant::now();
        let budget = self.config.time_budget();

        while let Some((tier, fingerprint)) = self.next_request() {
            self.complete(cache, fingerprint).await;
            self.tiers[tier].pop_front();
            if self.has_pending() && started.elapsed() >= budget {
                tracing::trace!("Load budget spent, {} requests left", self.pending.len());
                return PumpStatus::Yielded;
            }
        }
        self.cursor = 0;
        PumpStatus::Idle
    }

    /// Run [`pump`](Self::pump) to completion on the current thread.
    pub fn pump_blocking<S: PackageStorage>(&mut self, cache: &mut ObjectCache<S>) -> PumpStatus {
        profile_function!();
        futures_lite::future::block_on(self.pump(cache))
    }

    /// Head of the next non-empty tier in the sweep. The request stays
    /// queued until it has completed.
    fn next_request(&mut self) -> Option<(usize, Fingerprint)> {
        for _ in 0..self.tiers.len() {
            let tier = self.cursor;
            self.cursor = (tier + 1) % self.tiers.len();
            if let Some(&fingerprint) = self.tiers[tier].front() {
                return Some((tier, fingerprint));
            }
        }
        None
    }

    /// Load one pending request and fan the result out to its waiters.
    async fn complete<S: PackageStorage>(&mut self, cache: &mut ObjectCache<S>, fingerprint: Fingerprint) {
        let Some(pending) = self.pending.get(&fingerprint) else {
            return;
        };

        let waiters = pending.waiters.len() as u32;
        tracing::debug!(
            "Loading '{}' ({:#010x}) at {:?} priority for {} waiters",
            pending.path,
            pending.fingerprint,
            pending.priority,
            waiters
        );
        let object = cache
            .load_for_waiters(
                fingerprint,
                &pending.path,
                pending.asset_type,
                pending.type_name,
                waiters,
            )
            .await;

        let Some(mut pending) = self.pending.remove(&fingerprint) else {
            return;
        };
        if object.is_none() {
            tracing::debug!("'{}' failed, notifying {} waiters", pending.path, waiters);
        }

        for mut waiter in pending.waiters.drain(..) {
            if let Some(function) = waiter.function.take() {
                function(&pending.path, object.clone());
            }
            self.callback_pool.recycle(waiter);
        }
        self.completed += 1;
        self.pending_pool.recycle(pending);
    }

    /// Number of distinct paths queued or loading.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of requests queued on one tier.
    pub fn queued_in(&self, priority: LoadPriority) -> usize {
        self.tiers[priority.index()].len()
    }

    pub fn is_pending(&self, path: &str) -> bool {
        self.pending.contains_key(&fingerprint(path))
    }

    /// Number of callbacks waiting on `path`.
    pub fn waiter_count(&self, path: &str) -> usize {
        self.pending
            .get(&fingerprint(path))
            .map(|pending| pending.waiters.len())
            .unwrap_or(0)
    }

    /// Total requests completed (successfully or not) by `pump`.
    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    /// Pending-load records available for reuse.
    pub fn pooled_requests(&self) -> usize {
        self.pending_pool.available()
    }

    /// Callback records available for reuse.
    pub fn pooled_callbacks(&self) -> usize {
        self.callback_pool.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::AssetResult;
    use crate::io::{BytesFuture, MemoryPackage, MemoryStorage};
    use crate::loader::{BytesLoader, TextLoader};
    use crate::manifest::{Manifest, PackageRecord};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn storage() -> MemoryStorage {
        MemoryStorage::new().with_package("base", [("a.txt", "alpha"), ("b.txt", "bravo"), ("c.txt", "charlie")])
    }

    fn cache(storage: &MemoryStorage) -> ObjectCache<&MemoryStorage> {
        let mut cache = ObjectCache::new(storage, CacheConfig::default());
        cache.register_loader(TextLoader);
        cache.register_loader(BytesLoader);
        cache.registry_mut().install_manifest(
            Manifest::new()
                .with(PackageRecord::for_path("A", "a.txt", "base"))
                .with(PackageRecord::for_path("B", "b.txt", "base"))
                .with(PackageRecord::for_path("C", "c.txt", "base"))
                .with(PackageRecord::for_path("Gone", "gone.txt", "base")),
        );
        cache
    }

    type Log = Rc<RefCell<Vec<(String, Option<Arc<String>>)>>>;

    fn recorder(log: &Log) -> impl FnOnce(&str, Option<Arc<String>>) + 'static {
        let log = Rc::clone(log);
        move |path: &str, object: Option<Arc<String>>| log.borrow_mut().push((path.to_string(), object))
    }

    #[test]
    fn test_requests_for_one_path_share_a_load() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();

        assert_eq!(
            scheduler.request_load(&mut cache, "A", LoadPriority::Low, recorder(&log)),
            RequestStatus::Queued
        );
        for _ in 0..2 {
            assert_eq!(
                scheduler.request_load(&mut cache, "A", LoadPriority::High, recorder(&log)),
                RequestStatus::Joined
            );
        }
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(scheduler.waiter_count("A"), 3);

        assert_eq!(scheduler.pump_blocking(&mut cache), PumpStatus::Idle);
        assert_eq!(storage.read_count(), 1);
        assert_eq!(cache.ref_count("A"), 3);

        let log = log.borrow();
        assert_eq!(log.len(), 3);
        let first = log[0].1.as_ref().unwrap();
        assert!(log.iter().all(|(_, object)| Arc::ptr_eq(object.as_ref().unwrap(), first)));
    }

    #[test]
    fn test_tiers_drain_high_first() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();

        scheduler.request_load(&mut cache, "C", LoadPriority::Low, recorder(&log));
        scheduler.request_load(&mut cache, "B", LoadPriority::Medium, recorder(&log));
        scheduler.request_load(&mut cache, "A", LoadPriority::High, recorder(&log));
        assert_eq!(scheduler.queued_in(LoadPriority::Medium), 1);

        scheduler.pump_blocking(&mut cache);
        let order: Vec<_> = log.borrow().iter().map(|(path, _)| path.clone()).collect();
        assert_eq!(order, ["A", "B", "C"]);
    }

    fn paths(log: &Log) -> Vec<String> {
        log.borrow().iter().map(|(path, _)| path.clone()).collect()
    }

    #[test]
    fn test_each_pass_takes_one_request_per_tier() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();

        scheduler.request_load(&mut cache, "A", LoadPriority::High, recorder(&log));
        scheduler.request_load(&mut cache, "B", LoadPriority::High, recorder(&log));
        scheduler.request_load(&mut cache, "C", LoadPriority::Low, recorder(&log));

        assert_eq!(scheduler.pump_blocking(&mut cache), PumpStatus::Idle);
        assert_eq!(paths(&log), ["A", "C", "B"]);
    }

    #[test]
    fn test_yield_resumes_the_same_pass() {
        let storage = MemoryStorage::new().with_package(
            "base",
            [("h1.txt", "h1"), ("h2.txt", "h2"), ("m1.txt", "m1"), ("l1.txt", "l1")],
        );
        let mut cache = ObjectCache::new(&storage, CacheConfig::default());
        cache.register_loader(TextLoader);
        let mut manifest = Manifest::new();
        for name in ["H1", "H2", "M1", "L1"] {
            let asset = format!("{}.txt", name.to_lowercase());
            manifest.push(PackageRecord::for_path(name, asset, "base"));
        }
        cache.registry_mut().install_manifest(manifest);

        let mut scheduler = LoadScheduler::new(SchedulerConfig::new().with_time_budget(Duration::ZERO));
        let log = Log::default();
        scheduler.request_load(&mut cache, "H1", LoadPriority::High, recorder(&log));
        scheduler.request_load(&mut cache, "H2", LoadPriority::High, recorder(&log));
        scheduler.request_load(&mut cache, "M1", LoadPriority::Medium, recorder(&log));
        scheduler.request_load(&mut cache, "L1", LoadPriority::Low, recorder(&log));

        let mut pumps = 1;
        while scheduler.pump_blocking(&mut cache) == PumpStatus::Yielded {
            pumps += 1;
        }
        assert_eq!(pumps, 3);
        assert_eq!(paths(&log), ["H1", "M1", "L1", "H2"]);
    }

    /// Memory storage whose async reads suspend once before completing.
    struct SuspendingStorage(MemoryStorage);

    impl PackageStorage for SuspendingStorage {
        type Package = MemoryPackage;

        fn open_package(&self, name: &str) -> AssetResult<MemoryPackage> {
            self.0.open_package(name)
        }

        fn close_package(&self, name: &str, package: MemoryPackage) -> AssetResult<()> {
            self.0.close_package(name, package)
        }

        fn read_asset(&self, package: &MemoryPackage, asset_name: &str) -> AssetResult<Vec<u8>> {
            self.0.read_asset(package, asset_name)
        }

        fn read_asset_async(&self, package: &MemoryPackage, asset_name: &str) -> BytesFuture {
            let result = self.0.read_asset(package, asset_name);
            Box::pin(async move {
                futures_lite::future::yield_now().await;
                result
            })
        }
    }

    #[test]
    fn test_abandoned_pump_keeps_request_pending() {
        let mut cache = ObjectCache::new(SuspendingStorage(storage()), CacheConfig::default());
        cache.register_loader(TextLoader);
        cache
            .registry_mut()
            .install_manifest(Manifest::new().with(PackageRecord::for_path("A", "a.txt", "base")));
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();
        scheduler.request_load(&mut cache, "A", LoadPriority::High, recorder(&log));

        {
            let mut pump = Box::pin(scheduler.pump(&mut cache));
            let polled = futures_lite::future::block_on(futures_lite::future::poll_once(&mut pump));
            assert_eq!(polled, None);
        }
        assert!(scheduler.is_pending("A"));
        assert_eq!(scheduler.waiter_count("A"), 1);
        assert_eq!(scheduler.queued_in(LoadPriority::High), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(cache.registry().package_ref_count("base"), 1);

        assert_eq!(scheduler.pump_blocking(&mut cache), PumpStatus::Idle);
        assert_eq!(log.borrow()[0].1.as_deref().map(String::as_str), Some("alpha"));
        assert!(!scheduler.has_pending());
        assert_eq!(cache.registry().package_ref_count("base"), 1);
        assert_eq!(cache.registry().storage().0.open_count(), 1);
    }

    #[test]
    fn test_cached_object_completes_immediately() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();

        let held: Arc<String> = cache.get("A").unwrap();
        let status = scheduler.request_load(&mut cache, "A", LoadPriority::Low, recorder(&log));
        assert_eq!(status, RequestStatus::Completed);
        assert!(!scheduler.has_pending());
        assert!(Arc::ptr_eq(log.borrow()[0].1.as_ref().unwrap(), &held));
        assert_eq!(cache.ref_count("A"), 2);
    }

    #[test]
    fn test_failed_load_notifies_every_waiter_once() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let log = Log::default();

        scheduler.request_load(&mut cache, "Gone", LoadPriority::Medium, recorder(&log));
        scheduler.request_load(&mut cache, "Gone", LoadPriority::Medium, recorder(&log));
        scheduler.pump_blocking(&mut cache);

        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, object)| object.is_none()));
        assert!(!cache.is_cached("Gone"));
        assert_eq!(cache.registry().open_package_count(), 0);
    }

    #[test]
    fn test_zero_budget_yields_between_requests() {
        let storage = storage();
        let mut cache = cache(&storage);
        let config = SchedulerConfig::new().with_time_budget(Duration::ZERO);
        let mut scheduler = LoadScheduler::new(config);
        let log = Log::default();

        scheduler.request_load(&mut cache, "A", LoadPriority::High, recorder(&log));
        scheduler.request_load(&mut cache, "B", LoadPriority::High, recorder(&log));

        assert_eq!(scheduler.pump_blocking(&mut cache), PumpStatus::Yielded);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(scheduler.pump_blocking(&mut cache), PumpStatus::Idle);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(scheduler.completed_count(), 2);
    }

    #[test]
    fn test_type_conflict_is_rejected() {
        let storage = storage();
        let mut cache = cache(&storage);
        let mut scheduler = LoadScheduler::default();
        let got_bytes = Rc::new(RefCell::new(None));

        scheduler.request_load(&mut cache, "A", LoadPriority::Low, |_, _: Option<Arc<String>>| {});
        let slot = Rc::clone(&got_bytes);
        let status = scheduler.request_load(&mut cache, "A", LoadPriority::Low, move |_, bytes: Option<Arc<Vec<u8>>>| {
            *slot.borrow_mut() = Some(bytes.is_some());
        });
        assert_eq!(status, RequestStatus::Rejected);
        assert_eq!(*got_bytes.borrow(), Some(false));
        assert_eq!(scheduler.waiter_count("A"), 1);
    }

    #[test]
    fn test_records_return_to_pools() {
        let storage = storage();
        let mut cache = cache(&storage);
        let config = SchedulerConfig::new().with_pool_capacity(4, 4);
        let mut scheduler = LoadScheduler::new(config);
        let log = Log::default();

        scheduler.request_load(&mut cache, "A", LoadPriority::Low, recorder(&log));
        scheduler.request_load(&mut cache, "A", LoadPriority::Low, recorder(&log));
        scheduler.request_load(&mut cache, "B", LoadPriority::Low, recorder(&log));
        assert_eq!(scheduler.pooled_requests(), 2);
        assert_eq!(scheduler.pooled_callbacks(), 1);

        scheduler.pump_blocking(&mut cache);
        assert_eq!(scheduler.pooled_requests(), 4);
        assert_eq!(scheduler.pooled_callbacks(), 4);
    }
}
