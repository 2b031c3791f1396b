//! Package cache walkthrough.
//!
//! This example shows:
//! - Writing zip packages and a manifest to a directory
//! - Opening a cache from a `LarderConfig`
//! - Shared `get`/`release` with dependency packages
//! - Prioritized async requests through the `LoadScheduler`
//! - Processing cache events
//!
//! Run with `RUST_LOG=debug` to see package opens and closes.

use std::io::{Cursor, Write};
use std::sync::Arc;

use larder_assets::prelude::*;
use larder_assets::{CacheEvent, LarderConfig};

/// A JSON settings document.
#[derive(Debug)]
struct Settings {
    data: serde_json::Value,
}

impl Asset for Settings {
    fn type_name() -> &'static str {
        "Settings"
    }
}

struct SettingsLoader;

impl AssetLoader for SettingsLoader {
    type Asset = Settings;

    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        let data = serde_json::from_slice(ctx.bytes).map_err(|e| ctx.error(format!("JSON parse error: {}", e)))?;
        Ok(Settings { data })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    larder_core::logging::init();

    let temp_dir = tempfile::tempdir()?;
    println!("Package root: {}", temp_dir.path().display());
    create_packages(temp_dir.path())?;

    let config = LarderConfig {
        package_root: temp_dir.path().to_path_buf(),
        cache: CacheConfig::new().max_idle_entries(1),
        ..Default::default()
    };
    let mut cache = ObjectCache::from_config(&config)?;
    cache.register_loader(SettingsLoader);
    cache.register_loader(TextLoader);

    println!("\n=== Synchronous Gets ===\n");

    let settings: Arc<Settings> = cache.get("Config/settings.json")?;
    let story: Arc<String> = cache.get("Text/story.txt")?;
    let again: Arc<String> = cache.get("Text/story.txt")?;

    println!("Settings: {}", settings.data);
    println!("Story: {}", story);
    println!("Story references: {}", cache.ref_count("Text/story.txt"));
    for package in cache.registry().open_packages() {
        println!(
            "  open package {} (refs {})",
            package,
            cache.registry().package_ref_count(package)
        );
    }

    cache.release(&story, false)?;
    cache.release(&again, false)?;
    cache.release(&settings, false)?;
    println!("Idle after release: {:?}", cache.idle_paths());

    println!("\n=== Scheduled Loads ===\n");

    let mut scheduler = LoadScheduler::new(config.scheduler.clone());
    for (path, priority) in [
        ("Text/credits.txt", LoadPriority::Low),
        ("Text/story.txt", LoadPriority::High),
        ("Text/credits.txt", LoadPriority::High),
    ] {
        let status = scheduler.request_load(&mut cache, path, priority, |path, text: Option<Arc<String>>| match text {
            Some(text) => println!("Loaded {}: {}", path, text),
            None => println!("Failed to load {}", path),
        });
        println!("Request {} at {:?}: {:?}", path, priority, status);
    }

    while scheduler.pump_blocking(&mut cache) == PumpStatus::Yielded {
        println!("Yielded with {} requests pending", scheduler.pending_count());
    }

    println!("\n=== Events ===\n");
    for event in cache.drain_events() {
        match event {
            CacheEvent::Loaded { path, type_name, .. } => println!("Loaded {} as {}", path, type_name),
            CacheEvent::Evicted { path, .. } => println!("Evicted {}", path),
            CacheEvent::LoadFailed { path, error, .. } => println!("Failed {}: {}", path, error),
        }
    }

    println!("\n=== Done ===");
    Ok(())
}

fn create_packages(root: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    write_package(
        &root.join("config.pkg"),
        &[("settings.json", br#"{ "volume": 0.8, "fullscreen": false }"#.as_slice())],
    )?;
    write_package(
        &root.join("text.pkg"),
        &[
            ("story.txt", b"Once upon a time".as_slice()),
            ("credits.txt", b"Made with larder".as_slice()),
        ],
    )?;

    let manifest = Manifest::new()
        .with(PackageRecord::for_path("Config/settings.json", "settings.json", "config.pkg"))
        .with(PackageRecord::for_path("Text/story.txt", "story.txt", "text.pkg").depends_on("config.pkg"))
        .with(PackageRecord::for_path("Text/credits.txt", "credits.txt", "text.pkg").depends_on("config.pkg"));
    std::fs::write(root.join("manifest.json"), manifest.to_json()?)?;
    Ok(())
}

fn write_package(path: &std::path::Path, entries: &[(&str, &[u8])]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options)?;
        writer.write_all(bytes)?;
    }
    std::fs::write(path, writer.finish()?.into_inner())?;
    Ok(())
}
