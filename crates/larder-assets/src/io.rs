//! Physical package storage.
//!
//! A [`PackageStorage`] opens packages by name, reads named asset entries out
//! of an open package, and closes it again. These are the only operations
//! that touch the filesystem.

use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{AssetError, AssetResult};

/// Future type for async byte loading.
pub type BytesFuture = Pin<Box<dyn Future<Output = AssetResult<Vec<u8>>> + Send + 'static>>;

/// Backend that holds the physical packages.
pub trait PackageStorage {
    /// An open package.
    type Package;

    /// Open a package by name.
    fn open_package(&self, name: &str) -> AssetResult<Self::Package>;

    /// Close a package previously returned by `open_package`.
    fn close_package(&self, name: &str, package: Self::Package) -> AssetResult<()>;

    /// Read the raw bytes of an asset entry.
    fn read_asset(&self, package: &Self::Package, asset_name: &str) -> AssetResult<Vec<u8>>;

    /// Read an asset entry without blocking the caller.
    ///
    /// The default performs the read eagerly and wraps the result in a ready
    /// future.
    fn read_asset_async(&self, package: &Self::Package, asset_name: &str) -> BytesFuture {
        let result = self.read_asset(package, asset_name);
        Box::pin(async move { result })
    }
}

/// An open zip package held in memory.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    name: String,
    archive: ZipArchive<Cursor<Arc<[u8]>>>,
}

impl PackageArchive {
    /// Parse a zip archive from bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> AssetResult<Self> {
        let name = name.into();
        let archive = ZipArchive::new(Cursor::new(bytes.into()))
            .map_err(|e| AssetError::package(&name, e))?;
        Ok(Self { name, archive })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Read one entry by name.
    pub fn read_entry(&self, asset_name: &str) -> AssetResult<Vec<u8>> {
        // Cloning shares the backing buffer; only the cursor is copied.
        let mut archive = self.archive.clone();
        let mut entry = archive.by_name(asset_name).map_err(|e| match e {
            ZipError::FileNotFound => AssetError::NotFound {
                path: format!("{}/{}", self.name, asset_name),
            },
            other => AssetError::package(&self.name, other),
        })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| AssetError::package(&self.name, e))?;
        Ok(bytes)
    }
}

/// Storage for zip packages in a directory on disk.
///
/// Opening a package reads the whole archive into memory; the file handle is
/// not kept.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    /// Create a storage rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a package name to its file path.
    pub fn package_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl PackageStorage for DirectoryStorage {
    type Package = PackageArchive;

    fn open_package(&self, name: &str) -> AssetResult<PackageArchive> {
        let full_path = self.package_path(name);
        let bytes = std::fs::read(&full_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound {
                    path: full_path.display().to_string(),
                }
            } else {
                AssetError::IoError {
                    path: full_path.clone(),
                    source: e,
                }
            }
        })?;
        tracing::debug!("Opened package '{}' ({} bytes)", name, bytes.len());
        PackageArchive::from_bytes(name, bytes)
    }

    fn close_package(&self, name: &str, package: PackageArchive) -> AssetResult<()> {
        tracing::debug!("Closed package '{}'", name);
        drop(package);
        Ok(())
    }

    fn read_asset(&self, package: &PackageArchive, asset_name: &str) -> AssetResult<Vec<u8>> {
        package.read_entry(asset_name)
    }

    fn read_asset_async(&self, package: &PackageArchive, asset_name: &str) -> BytesFuture {
        let package = package.clone();
        let asset_name = asset_name.to_string();
        Box::pin(async move { package.read_entry(&asset_name) })
    }
}

type AssetTable = HashMap<String, Arc<[u8]>>;

/// An open in-memory package.
#[derive(Debug, Clone)]
pub struct MemoryPackage {
    name: String,
    assets: Arc<AssetTable>,
}

impl MemoryPackage {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory package storage for embedded packages and tests.
///
/// Counts opens, closes and reads so callers can verify how often the
/// physical layer was hit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    packages: HashMap<String, Arc<AssetTable>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a package with the given entries.
    pub fn insert_package<N, B>(&mut self, name: impl Into<String>, entries: impl IntoIterator<Item = (N, B)>)
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        let table: AssetTable = entries
            .into_iter()
            .map(|(entry, bytes)| {
                let bytes: Vec<u8> = bytes.into();
                (entry.into(), Arc::from(bytes))
            })
            .collect();
        self.packages.insert(name.into(), Arc::new(table));
    }

    /// Builder form of [`MemoryStorage::insert_package`].
    pub fn with_package<N, B>(mut self, name: impl Into<String>, entries: impl IntoIterator<Item = (N, B)>) -> Self
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        self.insert_package(name, entries);
        self
    }

    /// Remove a package.
    pub fn remove_package(&mut self, name: &str) -> bool {
        self.packages.remove(name).is_some()
    }

    pub fn contains_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Number of successful `open_package` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    /// Number of `close_package` calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    /// Number of asset reads, successful or not.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl PackageStorage for MemoryStorage {
    type Package = MemoryPackage;

    fn open_package(&self, name: &str) -> AssetResult<MemoryPackage> {
        let assets = self.packages.get(name).ok_or_else(|| AssetError::NotFound {
            path: format!("memory://{}", name),
        })?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryPackage {
            name: name.to_string(),
            assets: Arc::clone(assets),
        })
    }

    fn close_package(&self, _name: &str, _package: MemoryPackage) -> AssetResult<()> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_asset(&self, package: &MemoryPackage, asset_name: &str) -> AssetResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        package
            .assets
            .get(asset_name)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| AssetError::NotFound {
                path: format!("memory://{}/{}", package.name, asset_name),
            })
    }
}

impl<S: PackageStorage + ?Sized> PackageStorage for &S {
    type Package = S::Package;

    fn open_package(&self, name: &str) -> AssetResult<Self::Package> {
        (**self).open_package(name)
    }

    fn close_package(&self, name: &str, package: Self::Package) -> AssetResult<()> {
        (**self).close_package(name, package)
    }

    fn read_asset(&self, package: &Self::Package, asset_name: &str) -> AssetResult<Vec<u8>> {
        (**self).read_asset(package, asset_name)
    }

    fn read_asset_async(&self, package: &Self::Package, asset_name: &str) -> BytesFuture {
        (**self).read_asset_async(package, asset_name)
    }
}
