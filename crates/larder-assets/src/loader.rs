//! Asset loaders: turn the raw bytes of a package entry into a typed object.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{AssetError, AssetResult};
use crate::manifest::PackageRecord;

/// Extension key that matches any asset name.
pub const ANY_EXTENSION: &str = "*";

/// Context provided to asset loaders during decoding.
pub struct LoadContext<'a> {
    /// The logical path the caller asked for.
    pub path: &'a str,
    /// The manifest record of the asset.
    pub record: &'a PackageRecord,
    /// The raw bytes of the package entry.
    pub bytes: &'a [u8],
    /// Extension of the entry name (without the dot), if any.
    pub extension: Option<&'a str>,
}

impl<'a> LoadContext<'a> {
    /// Create a new load context.
    pub fn new(path: &'a str, record: &'a PackageRecord, bytes: &'a [u8]) -> Self {
        Self {
            path,
            record,
            bytes,
            extension: extension_of(&record.asset_name),
        }
    }

    /// Build a [`AssetError::LoaderError`] for this asset.
    pub fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::LoaderError {
            path: self.path.to_string(),
            message: message.into(),
        }
    }
}

fn extension_of(asset_name: &str) -> Option<&str> {
    Path::new(asset_name).extension().and_then(|e| e.to_str())
}

/// Default priority for loaders.
pub const DEFAULT_LOADER_PRIORITY: i32 = 0;

/// Trait for decoding assets from package entries.
///
/// # Example
///
/// ```ignore
/// struct ConfigLoader;
///
/// impl AssetLoader for ConfigLoader {
///     type Asset = GameConfig;
///
///     fn extensions(&self) -> &[&str] {
///         &["cfg"]
///     }
///
///     fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
///         GameConfig::parse(ctx.bytes).map_err(|e| ctx.error(e.to_string()))
///     }
/// }
/// ```
pub trait AssetLoader: Send + Sync + 'static {
    /// The asset type this loader produces.
    type Asset: crate::Asset;

    /// The entry extensions this loader handles (without dots).
    /// Use [`ANY_EXTENSION`] to accept every entry.
    fn extensions(&self) -> &[&str];

    /// Decode an asset.
    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset>;

    /// Higher priority loaders win when several handle the same type and
    /// extension.
    fn priority(&self) -> i32 {
        DEFAULT_LOADER_PRIORITY
    }
}

/// Type-erased asset loader for dynamic dispatch.
pub trait ErasedAssetLoader: Send + Sync {
    fn asset_type_id(&self) -> TypeId;

    fn asset_type_name(&self) -> &'static str;

    fn extensions(&self) -> &[&str];

    fn priority(&self) -> i32;

    fn load_erased(&self, ctx: LoadContext<'_>) -> AssetResult<Box<dyn Any + Send + Sync>>;
}

impl<L: AssetLoader> ErasedAssetLoader for L {
    fn asset_type_id(&self) -> TypeId {
        TypeId::of::<L::Asset>()
    }

    fn asset_type_name(&self) -> &'static str {
        <L::Asset as crate::Asset>::type_name()
    }

    fn extensions(&self) -> &[&str] {
        AssetLoader::extensions(self)
    }

    fn priority(&self) -> i32 {
        AssetLoader::priority(self)
    }

    fn load_erased(&self, ctx: LoadContext<'_>) -> AssetResult<Box<dyn Any + Send + Sync>> {
        let asset = self.load(ctx)?;
        Ok(Box::new(asset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LoaderKey {
    type_id: TypeId,
    extension: String,
}

struct LoaderEntry {
    loader: Arc<dyn ErasedAssetLoader>,
    priority: i32,
}

/// Registry of asset loaders, indexed by asset type and extension.
///
/// Lookup tries the exact `(type, extension)` pair first and then the
/// type's [`ANY_EXTENSION`] loaders. Among matches the highest priority wins;
/// on a tie the loader registered first wins.
#[derive(Default)]
pub struct LoaderRegistry {
    by_type_and_ext: HashMap<LoaderKey, Vec<LoaderEntry>>,
    type_names: HashMap<TypeId, &'static str>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for its declared extensions.
    pub fn register<L: AssetLoader>(&mut self, loader: L) {
        let loader: Arc<dyn ErasedAssetLoader> = Arc::new(loader);
        let type_id = loader.asset_type_id();
        let priority = loader.priority();

        for ext in loader.extensions() {
            let key = LoaderKey {
                type_id,
                extension: ext.to_lowercase(),
            };
            let entries = self.by_type_and_ext.entry(key).or_default();
            entries.push(LoaderEntry {
                loader: Arc::clone(&loader),
                priority,
            });
            // Stable sort keeps registration order among equal priorities.
            entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        self.type_names.insert(type_id, loader.asset_type_name());
        tracing::debug!(
            "Registered loader for {} ({:?})",
            loader.asset_type_name(),
            loader.extensions()
        );
    }

    /// The best loader for a type and extension.
    pub fn get(&self, type_id: TypeId, extension: Option<&str>) -> Option<&Arc<dyn ErasedAssetLoader>> {
        let exact = extension.and_then(|ext| {
            self.by_type_and_ext.get(&LoaderKey {
                type_id,
                extension: ext.to_lowercase(),
            })
        });
        exact
            .or_else(|| {
                self.by_type_and_ext.get(&LoaderKey {
                    type_id,
                    extension: ANY_EXTENSION.to_string(),
                })
            })
            .and_then(|entries| entries.first())
            .map(|entry| &entry.loader)
    }

    /// Check if a loader is registered for a type and extension.
    pub fn has_loader_for<T: 'static>(&self, extension: &str) -> bool {
        self.get(TypeId::of::<T>(), Some(extension)).is_some()
    }

    /// Check if any loader is registered for a type.
    pub fn has_loader_for_type<T: 'static>(&self) -> bool {
        self.type_names.contains_key(&TypeId::of::<T>())
    }

    /// Decode an asset of type `T`.
    pub fn load_typed<T: crate::Asset>(&self, ctx: LoadContext<'_>) -> AssetResult<T> {
        let boxed = self.load_erased(TypeId::of::<T>(), T::type_name(), ctx)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| AssetError::TypeMismatch {
                expected: T::type_name(),
                actual: "unknown",
            })
    }

    /// Decode an asset for a type known only by its `TypeId`.
    pub fn load_erased(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        ctx: LoadContext<'_>,
    ) -> AssetResult<Box<dyn Any + Send + Sync>> {
        let loader = self
            .get(type_id, ctx.extension)
            .ok_or_else(|| AssetError::NoLoader {
                type_id,
                type_name,
                extension: ctx.extension.map(str::to_string),
            })?;
        loader.load_erased(ctx)
    }
}

/// Loads UTF-8 text entries.
pub struct TextLoader;

impl AssetLoader for TextLoader {
    type Asset = String;

    fn extensions(&self) -> &[&str] {
        &["txt", "text", "md", "json", "xml", "csv"]
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        String::from_utf8(ctx.bytes.to_vec()).map_err(|e| ctx.error(format!("Invalid UTF-8: {}", e)))
    }
}

/// Loads any entry as raw bytes.
pub struct BytesLoader;

impl AssetLoader for BytesLoader {
    type Asset = Vec<u8>;

    fn extensions(&self) -> &[&str] {
        &[ANY_EXTENSION]
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        Ok(ctx.bytes.to_vec())
    }
}
