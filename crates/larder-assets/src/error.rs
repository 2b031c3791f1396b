//! Error types for the package cache.

use std::any::TypeId;
use std::fmt;
use std::path::PathBuf;

use larder_core::Fingerprint;

/// Errors that can occur while indexing, loading, caching or releasing.
#[derive(Debug)]
pub enum AssetError {
    /// The path, fingerprint or package entry is not known.
    NotFound {
        /// The path or identifier that was looked up.
        path: String,
    },

    /// Failed to read from disk.
    IoError {
        /// The path that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The manifest could not be parsed.
    Manifest {
        /// Description of the parse failure.
        message: String,
    },

    /// Two manifest records share a fingerprint. The first one is kept.
    DuplicateFingerprint {
        fingerprint: Fingerprint,
        /// Asset name of the record that was kept.
        kept: String,
        /// Asset name of the record that was dropped.
        dropped: String,
        /// Package of the record that was dropped.
        dropped_package: String,
    },

    /// A physical package could not be opened, read or closed.
    PackageLoad {
        /// The package name.
        package: String,
        /// Description of the failure.
        message: String,
    },

    /// No loader registered for this asset type and extension.
    NoLoader {
        /// The type ID of the requested asset.
        type_id: TypeId,
        /// Human-readable type name.
        type_name: &'static str,
        /// Extension of the asset name, if any.
        extension: Option<String>,
    },

    /// The loader failed to decode the asset.
    LoaderError {
        /// The asset being decoded.
        path: String,
        /// Description of the error.
        message: String,
    },

    /// The cached object is not of the requested type.
    TypeMismatch {
        /// Requested type name.
        expected: &'static str,
        /// Type name of the cached object.
        actual: &'static str,
    },

    /// A caller broke a usage contract (double release, unknown object,
    /// unbalanced package close). Indicates a bug in the caller.
    InvariantViolation {
        /// What went wrong.
        message: String,
    },
}

impl AssetError {
    /// Build an [`AssetError::InvariantViolation`].
    pub fn invariant(message: impl Into<String>) -> Self {
        AssetError::InvariantViolation {
            message: message.into(),
        }
    }

    /// Build an [`AssetError::PackageLoad`].
    pub fn package(package: impl Into<String>, message: impl fmt::Display) -> Self {
        AssetError::PackageLoad {
            package: package.into(),
            message: message.to_string(),
        }
    }

    /// Returns `true` for [`AssetError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound { .. })
    }

    /// Returns `true` for [`AssetError::InvariantViolation`].
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, AssetError::InvariantViolation { .. })
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound { path } => {
                write!(f, "Asset not found: {}", path)
            }
            AssetError::IoError { path, source } => {
                write!(f, "IO error loading '{}': {}", path.display(), source)
            }
            AssetError::Manifest { message } => {
                write!(f, "Invalid manifest: {}", message)
            }
            AssetError::DuplicateFingerprint {
                fingerprint,
                kept,
                dropped,
                dropped_package,
            } => {
                write!(
                    f,
                    "Duplicate fingerprint {:#010x}: kept '{}', dropped '{}' (package '{}')",
                    fingerprint, kept, dropped, dropped_package
                )
            }
            AssetError::PackageLoad { package, message } => {
                write!(f, "Package '{}' failed: {}", package, message)
            }
            AssetError::NoLoader {
                type_name,
                extension,
                ..
            } => match extension {
                Some(ext) => write!(f, "No loader registered for {} with extension .{}", type_name, ext),
                None => write!(f, "No loader registered for {}", type_name),
            },
            AssetError::LoaderError { path, message } => {
                write!(f, "Failed to load '{}': {}", path, message)
            }
            AssetError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, cached as {}", expected, actual)
            }
            AssetError::InvariantViolation { message } => {
                write!(f, "Invariant violation: {}", message)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::Manifest {
            message: err.to_string(),
        }
    }
}

/// Result type alias for cache operations.
pub type AssetResult<T> = Result<T, AssetError>;
