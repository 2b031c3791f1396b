//! Package manifest: which package holds each asset, and what it depends on.
//!
//! The manifest is produced offline by the package builder. At runtime it is
//! a flat list of records, one per asset, keyed by the fingerprint of the
//! asset's logical path.

use serde::{Deserialize, Serialize};

use larder_core::{Fingerprint, fingerprint};

use crate::error::{AssetError, AssetResult};

/// Metadata for one asset in the manifest.
///
/// `dependencies` lists every package that must be open before the asset can
/// be decoded, already flattened by the builder. Lists are acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Fingerprint of the asset's logical path.
    pub fingerprint: Fingerprint,
    /// Entry name of the asset inside its package.
    pub asset_name: String,
    /// Name of the package holding the asset.
    pub package_name: String,
    /// Packages this asset depends on, in open order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Logical path the fingerprint was computed from, when the builder
    /// recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PackageRecord {
    /// Build a record for `path`, computing its fingerprint.
    pub fn for_path(
        path: impl Into<String>,
        asset_name: impl Into<String>,
        package_name: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            fingerprint: fingerprint(&path),
            asset_name: asset_name.into(),
            package_name: package_name.into(),
            dependencies: Vec::new(),
            path: Some(path),
        }
    }

    /// Add a dependency package.
    pub fn depends_on(mut self, package: impl Into<String>) -> Self {
        self.dependencies.push(package.into());
        self
    }

    /// Every package this record needs, its own first.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.package_name.as_str()).chain(self.dependencies.iter().map(String::as_str))
    }

    /// Path for diagnostics, falling back to the asset name.
    pub fn display_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.asset_name)
    }
}

/// The serialized manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub packages: Vec<PackageRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest from JSON.
    pub fn from_json(bytes: &[u8]) -> AssetResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> AssetResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Append a record.
    pub fn push(&mut self, record: PackageRecord) {
        self.packages.push(record);
    }

    /// Builder form of [`Manifest::push`].
    pub fn with(mut self, record: PackageRecord) -> Self {
        self.push(record);
        self
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// A record dropped because its fingerprint was already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub fingerprint: Fingerprint,
    /// Asset name of the record that was kept.
    pub kept: String,
    /// The record that was dropped.
    pub dropped: PackageRecord,
}

impl DuplicateRecord {
    /// The integrity error describing this duplicate.
    pub fn to_error(&self) -> AssetError {
        AssetError::DuplicateFingerprint {
            fingerprint: self.fingerprint,
            kept: self.kept.clone(),
            dropped: self.dropped.asset_name.clone(),
            dropped_package: self.dropped.package_name.clone(),
        }
    }
}

/// Outcome of installing a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestReport {
    /// Records indexed.
    pub loaded: usize,
    /// Records skipped because of a fingerprint collision.
    pub duplicates: Vec<DuplicateRecord>,
}

impl ManifestReport {
    /// Returns `true` if no duplicates were found.
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
    }

    /// The duplicates as integrity errors.
    pub fn integrity_errors(&self) -> Vec<AssetError> {
        self.duplicates.iter().map(DuplicateRecord::to_error).collect()
    }
}
