//! Package registry: manifest index plus reference-counted open packages.

use std::sync::Arc;

use larder_core::alloc::FingerprintMap;
use larder_core::profiling::profile_function;
use larder_core::{Fingerprint, fingerprint};

use crate::error::{AssetError, AssetResult};
use crate::io::PackageStorage;
use crate::manifest::{DuplicateRecord, Manifest, ManifestReport, PackageRecord};

/// A physical package kept open while anything references it.
struct OpenPackage<P> {
    name: String,
    package: P,
    ref_count: u32,
}

/// Indexes manifest records by fingerprint and owns every open package.
///
/// Each `open_package_chain` opens the asset's own package and each of its
/// dependency packages once; each `close_package_chain` undoes exactly that.
/// A package is physically closed when its count returns to zero.
pub struct PackageRegistry<S: PackageStorage> {
    storage: S,
    records: FingerprintMap<Arc<PackageRecord>>,
    /// Keyed by the fingerprint of the package name.
    open: FingerprintMap<OpenPackage<S::Package>>,
}

impl<S: PackageStorage> PackageRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            records: FingerprintMap::default(),
            open: FingerprintMap::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Parse and install a JSON manifest.
    ///
    /// On a parse error the current index is left untouched.
    pub fn load_manifest(&mut self, bytes: &[u8]) -> AssetResult<ManifestReport> {
        let manifest = Manifest::from_json(bytes)?;
        Ok(self.install_manifest(manifest))
    }

    /// Replace the record index with `manifest`.
    ///
    /// Records whose fingerprint is already taken are logged, skipped and
    /// listed in the report; the first record wins. Open packages and
    /// records held by cached objects are unaffected.
    pub fn install_manifest(&mut self, manifest: Manifest) -> ManifestReport {
        profile_function!();
        let mut records: FingerprintMap<Arc<PackageRecord>> = FingerprintMap::default();
        records.reserve(manifest.packages.len());
        let mut report = ManifestReport::default();

        for record in manifest.packages {
            if let Some(kept) = records.get(&record.fingerprint) {
                let duplicate = DuplicateRecord {
                    fingerprint: record.fingerprint,
                    kept: kept.asset_name.clone(),
                    dropped: record,
                };
                tracing::warn!("{}", duplicate.to_error());
                report.duplicates.push(duplicate);
                continue;
            }
            records.insert(record.fingerprint, Arc::new(record));
        }

        report.loaded = records.len();
        self.records = records;
        tracing::info!(
            "Manifest installed: {} records, {} duplicates",
            report.loaded,
            report.duplicates.len()
        );
        report
    }

    /// Look up a record by fingerprint.
    pub fn record(&self, fingerprint: Fingerprint) -> Option<&Arc<PackageRecord>> {
        self.records.get(&fingerprint)
    }

    /// Look up a record by logical path.
    pub fn record_for_path(&self, path: &str) -> Option<&Arc<PackageRecord>> {
        self.record(fingerprint(path))
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Open the record's package and all of its dependency packages.
    ///
    /// Fails with `NotFound` for an unknown fingerprint. If any package in
    /// the chain fails to open, the ones opened so far are closed again and
    /// the registry is left as it was.
    pub fn open_package_chain(&mut self, fingerprint: Fingerprint) -> AssetResult<Arc<PackageRecord>> {
        profile_function!();
        let record = self
            .records
            .get(&fingerprint)
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                path: format!("fingerprint {:#010x}", fingerprint),
            })?;

        self.open_package(&record.package_name)?;
        for (opened, dependency) in record.dependencies.iter().enumerate() {
            if let Err(err) = self.open_package(dependency) {
                for name in record.dependencies[..opened].iter().rev() {
                    self.rollback(name);
                }
                self.rollback(&record.package_name);
                return Err(err);
            }
        }

        Ok(record)
    }

    /// Release one reference on the record's package and each dependency.
    ///
    /// Every package is visited even if an earlier one fails; the first
    /// error is returned.
    pub fn close_package_chain(&mut self, record: &PackageRecord) -> AssetResult<()> {
        profile_function!();
        let mut first_error = None;
        for name in record.dependencies.iter().rev() {
            if let Err(err) = self.close_package(name) {
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = self.close_package(&record.package_name) {
            first_error.get_or_insert(err);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The open package with this name, if any.
    pub fn package(&self, name: &str) -> Option<&S::Package> {
        self.open.get(&fingerprint(name)).map(|open| &open.package)
    }

    /// Current reference count of a package (zero when closed).
    pub fn package_ref_count(&self, name: &str) -> u32 {
        self.open
            .get(&fingerprint(name))
            .map(|open| open.ref_count)
            .unwrap_or(0)
    }

    pub fn is_package_open(&self, name: &str) -> bool {
        self.open.contains_key(&fingerprint(name))
    }

    pub fn open_package_count(&self) -> usize {
        self.open.len()
    }

    /// Names of all currently open packages.
    pub fn open_packages(&self) -> impl Iterator<Item = &str> {
        self.open.values().map(|open| open.name.as_str())
    }

    fn open_package(&mut self, name: &str) -> AssetResult<()> {
        let key = fingerprint(name);
        if let Some(open) = self.open.get_mut(&key) {
            open.ref_count += 1;
            tracing::trace!("Package '{}' ref count -> {}", name, open.ref_count);
            return Ok(());
        }

        let package = self.storage.open_package(name).inspect_err(|err| {
            tracing::error!("Failed to open package '{}': {}", name, err);
        })?;
        tracing::debug!("Package '{}' opened", name);
        self.open.insert(
            key,
            OpenPackage {
                name: name.to_string(),
                package,
                ref_count: 1,
            },
        );
        Ok(())
    }

    fn close_package(&mut self, name: &str) -> AssetResult<()> {
        let key = fingerprint(name);
        let Some(open) = self.open.get_mut(&key) else {
            let err = AssetError::invariant(format!("close of package '{}' which is not open", name));
            tracing::error!("{}", err);
            return Err(err);
        };

        open.ref_count -= 1;
        if open.ref_count > 0 {
            tracing::trace!("Package '{}' ref count -> {}", name, open.ref_count);
            return Ok(());
        }

        let Some(open) = self.open.remove(&key) else {
            return Ok(());
        };
        tracing::debug!("Package '{}' closed", name);
        self.storage
            .close_package(&open.name, open.package)
            .inspect_err(|err| tracing::error!("Failed to close package '{}': {}", name, err))
    }

    fn rollback(&mut self, name: &str) {
        if let Err(err) = self.close_package(name) {
            tracing::error!("Rollback of package '{}' failed: {}", name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStorage;

    fn storage() -> MemoryStorage {
        MemoryStorage::new()
            .with_package("shared", [("common.txt", "common")])
            .with_package("ui", [("icon.txt", "icon")])
            .with_package("level", [("map.txt", "map")])
    }

    fn manifest() -> Manifest {
        Manifest::new()
            .with(PackageRecord::for_path("Assets/common.txt", "common.txt", "shared"))
            .with(PackageRecord::for_path("Assets/icon.txt", "icon.txt", "ui").depends_on("shared"))
            .with(
                PackageRecord::for_path("Assets/map.txt", "map.txt", "level")
                    .depends_on("shared")
                    .depends_on("ui"),
            )
    }

    #[test]
    fn test_install_and_lookup() {
        let mut registry = PackageRegistry::new(storage());
        let report = registry.install_manifest(manifest());
        assert_eq!(report.loaded, 3);
        assert!(report.is_clean());

        let record = registry.record_for_path("Assets/icon.txt").unwrap();
        assert_eq!(record.package_name, "ui");
        assert!(registry.record_for_path("Assets/missing.txt").is_none());
    }

    #[test]
    fn test_duplicate_fingerprint_keeps_first() {
        let mut first = PackageRecord::for_path("Assets/a.txt", "a.txt", "shared");
        first.fingerprint = 0xABCD;
        let mut second = PackageRecord::for_path("Assets/b.txt", "b.txt", "ui");
        second.fingerprint = 0xABCD;

        let mut registry = PackageRegistry::new(storage());
        let report = registry.install_manifest(Manifest::new().with(first).with(second));

        assert_eq!(report.loaded, 1);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].kept, "a.txt");
        assert_eq!(report.duplicates[0].dropped.asset_name, "b.txt");
        assert_eq!(registry.record(0xABCD).unwrap().asset_name, "a.txt");
        assert!(matches!(
            report.integrity_errors()[0],
            AssetError::DuplicateFingerprint { fingerprint: 0xABCD, .. }
        ));
    }

    #[test]
    fn test_bad_manifest_keeps_previous_index() {
        let mut registry = PackageRegistry::new(storage());
        registry.install_manifest(manifest());

        assert!(registry.load_manifest(b"{ \"packages\": 12 }").is_err());
        assert_eq!(registry.record_count(), 3);
    }

    #[test]
    fn test_chain_refcounts() {
        let mut registry = PackageRegistry::new(storage());
        registry.install_manifest(manifest());

        let map = registry.open_package_chain(fingerprint("Assets/map.txt")).unwrap();
        assert_eq!(registry.package_ref_count("level"), 1);
        assert_eq!(registry.package_ref_count("shared"), 1);
        assert_eq!(registry.package_ref_count("ui"), 1);

        let icon = registry.open_package_chain(fingerprint("Assets/icon.txt")).unwrap();
        assert_eq!(registry.package_ref_count("ui"), 2);
        assert_eq!(registry.package_ref_count("shared"), 2);
        assert_eq!(registry.storage().open_count(), 3);

        registry.close_package_chain(&map).unwrap();
        assert!(!registry.is_package_open("level"));
        assert_eq!(registry.package_ref_count("ui"), 1);
        assert_eq!(registry.package_ref_count("shared"), 1);

        registry.close_package_chain(&icon).unwrap();
        assert_eq!(registry.open_package_count(), 0);
        assert_eq!(registry.storage().close_count(), 3);
    }

    #[test]
    fn test_unknown_fingerprint() {
        let mut registry = PackageRegistry::new(storage());
        registry.install_manifest(manifest());
        let err = registry.open_package_chain(fingerprint("Assets/nope.txt")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(registry.open_package_count(), 0);
    }

    #[test]
    fn test_failed_dependency_rolls_back() {
        let broken = PackageRecord::for_path("Assets/broken.txt", "broken.txt", "ui")
            .depends_on("shared")
            .depends_on("missing_pkg");
        let mut registry = PackageRegistry::new(storage());
        registry.install_manifest(manifest().with(broken));

        let icon = registry.open_package_chain(fingerprint("Assets/icon.txt")).unwrap();
        let err = registry.open_package_chain(fingerprint("Assets/broken.txt")).unwrap_err();
        assert!(err.is_not_found());

        // Only the icon chain is still holding references.
        assert_eq!(registry.package_ref_count("ui"), 1);
        assert_eq!(registry.package_ref_count("shared"), 1);
        registry.close_package_chain(&icon).unwrap();
        assert_eq!(registry.open_package_count(), 0);
    }

    #[test]
    fn test_unbalanced_close_is_flagged() {
        let mut registry = PackageRegistry::new(storage());
        registry.install_manifest(manifest());

        let icon = registry.open_package_chain(fingerprint("Assets/icon.txt")).unwrap();
        registry.close_package_chain(&icon).unwrap();
        let err = registry.close_package_chain(&icon).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(registry.storage().close_count(), 2);
    }
}
