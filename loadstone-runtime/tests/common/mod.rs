//! Test Utilities
//!
//! Fake platform and package backends plus a registry harness, so lifecycle
//! behavior can be driven without real dynamic libraries or zip archives.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use semver::{Version, VersionReq};
use serde_json::Value;

use loadstone_runtime::mods::api::*;

/// Counters and recordings shared between a harness and its fakes.
#[derive(Default)]
pub struct Recorder {
    /// Paths passed to the platform loader, in order
    pub loads: Mutex<Vec<PathBuf>>,
    /// Total entry point invocations across all loaded binaries
    pub entry_calls: Mutex<u32>,
    /// Lifecycle events observed on the bus, in order
    pub events: Mutex<Vec<(String, ModEventKind)>>,
}

impl Recorder {
    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    pub fn entry_count(&self) -> u32 {
        *self.entry_calls.lock().unwrap()
    }

    pub fn events(&self) -> Vec<(String, ModEventKind)> {
        self.events.lock().unwrap().clone()
    }
}

struct FakeBinary {
    recorder: Arc<Recorder>,
}

impl LoadedBinary for FakeBinary {
    fn invoke_entry(&self) -> ModResult<()> {
        *self.recorder.entry_calls.lock().unwrap() += 1;
        Ok(())
    }
}

/// Platform loader that hands out stub binaries and records every load.
pub struct FakePlatformLoader {
    recorder: Arc<Recorder>,
}

impl PlatformLoader for FakePlatformLoader {
    fn load(&mut self, path: &Path) -> ModResult<Box<dyn LoadedBinary>> {
        self.recorder.loads.lock().unwrap().push(path.to_path_buf());
        Ok(Box::new(FakeBinary {
            recorder: self.recorder.clone(),
        }))
    }
}

/// Package source whose archives contain a fixed set of entry names.
pub struct FakePackageSource {
    pub entries: Vec<String>,
}

impl FakePackageSource {
    pub fn with_binary() -> Self {
        Self {
            entries: vec![BINARY_NAME.to_string()],
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl PackageSource for FakePackageSource {
    fn open(&self, _path: &Path) -> ModResult<Box<dyn PackageArchive>> {
        Ok(Box::new(FakePackage {
            entries: self.entries.clone(),
        }))
    }
}

struct FakePackage {
    entries: Vec<String>,
}

impl PackageArchive for FakePackage {
    fn has_entry(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry == name)
    }

    fn extract_all_to(&mut self, dir: &Path) -> ModResult<()> {
        for entry in &self.entries {
            fs::write(dir.join(entry), b"stub")
                .map_err(|e| ModError::extraction(format!("unable to write entry: {}", e)))?;
        }
        Ok(())
    }
}

/// Binary entry name every fake package carries.
pub const BINARY_NAME: &str = "mod.bin";

/// Host memory image base used by every harness.
pub const MEMORY_BASE: u32 = 0x8000_0000;

/// A registry wired to fake backends over a temporary directory tree.
pub struct Harness {
    pub registry: ModRegistry,
    pub recorder: Arc<Recorder>,
    root: tempfile::TempDir,
}

/// Build a registry over `root` wired to fake backends reporting into
/// `recorder`.
pub fn session(root: &Path, recorder: Arc<Recorder>) -> ModRegistry {
    let dirs = LoaderDirs::under(root);
    let memory = HostMemory::new(MEMORY_BASE, 0x1000);
    let mut registry = ModRegistry::new(dirs, memory);
    registry.set_platform_loader(Box::new(FakePlatformLoader {
        recorder: recorder.clone(),
    }));
    registry.set_package_source(Box::new(FakePackageSource::with_binary()));

    registry.subscribe(Box::new(move |event| {
        recorder
            .events
            .lock()
            .unwrap()
            .push((event.mod_id.clone(), event.kind));
    }));
    registry
}

impl Harness {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let root = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let registry = session(root.path(), recorder.clone());

        Self {
            registry,
            recorder,
            root,
        }
    }

    /// Discard the registry and start a fresh one over the same directories,
    /// as a process restart would. Installed mods must be re-registered.
    pub fn restart(&mut self) {
        self.registry = session(self.root.path(), self.recorder.clone());
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Metadata for a mod whose package would live under the harness root.
    pub fn info(&self, id: &str, version: &str) -> ModInfo {
        ModInfo {
            id: id.to_string(),
            name: id.to_uppercase(),
            developer: "tester".to_string(),
            version: Version::parse(version).unwrap(),
            description: None,
            dependencies: Vec::new(),
            supports_disabling: true,
            supports_unloading: true,
            package_path: self.root.path().join(format!("{}.zip", id)),
            binary_name: BINARY_NAME.to_string(),
        }
    }

    /// Install a mod with no declared settings.
    pub fn install(&mut self, info: ModInfo) {
        self.registry.install_mod(info, Vec::new()).unwrap();
    }

    /// Write a settings.json fixture into a mod's save directory before the
    /// mod is installed.
    pub fn write_settings(&self, id: &str, value: &Value) {
        self.write_save_file(id, "settings.json", value);
    }

    /// Write a saved.json fixture into a mod's save directory before the mod
    /// is installed.
    pub fn write_saved(&self, id: &str, value: &Value) {
        self.write_save_file(id, "saved.json", value);
    }

    fn write_save_file(&self, id: &str, file: &str, value: &Value) {
        let dir = self.root.path().join("save").join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), serde_json::to_string(value).unwrap()).unwrap();
    }

    /// Parse a JSON file back out of a mod's save directory.
    pub fn read_save_file(&self, id: &str, file: &str) -> Value {
        let path = self.root.path().join("save").join(id).join(file);
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }
}

/// Declare a dependency on `id` within a parsed version range.
pub fn dep(id: &str, range: &str) -> Dependency {
    Dependency::new(id, VersionReq::parse(range).unwrap())
}

/// Assert the registry-wide invariant: every loaded mod has all of its
/// declared dependencies resolved and loaded.
pub fn assert_loaded_mods_resolved(registry: &ModRegistry) {
    for id in registry.mod_ids() {
        if registry.is_loaded(&id) {
            assert!(
                !registry.has_unresolved_dependencies(&id).unwrap(),
                "loaded mod '{}' has unresolved dependencies",
                id
            );
            for dependency in &registry.get_mod(&id).unwrap().info().dependencies {
                assert!(
                    registry.is_loaded(&dependency.id),
                    "mod '{}' is loaded but its dependency '{}' is not",
                    id,
                    dependency.id
                );
            }
        }
    }
}
