//! Mod System Infrastructure
//!
//! This module provides the mod lifecycle manager: external binary mods are
//! loaded into the host process, their inter-mod dependencies resolved, their
//! hooks and patches applied and reversed, and their configuration persisted.
//!
//! # Overview
//!
//! A mod consists of:
//! 1. **Package archive** - contains the platform binary plus resources
//! 2. **Metadata** ([`ModInfo`]) - identity, version, dependencies, capability flags
//! 3. **Persisted data** - `settings.json` and `saved.json` in the mod's save directory
//!
//! The [`registry::ModRegistry`] is the process-wide entry point: it owns all
//! known mods, the host memory image, and the hook table, and it drives every
//! lifecycle transition. A mod is always in one of four states along two
//! axes: binary loaded/unloaded, and enabled/disabled. Loading requires every
//! declared dependency to be resolved; any load or unload anywhere triggers a
//! registry-wide re-resolution pass, because one mod's state can unblock or
//! break others.
//!
//! # Ownership
//!
//! A mod owns its [`Hook`]s and [`Patch`]es exclusively. Unloading the binary
//! tears both collections down and releases every owned resource; no two mods
//! ever share a hook or a patch.

pub mod api;
pub mod hooks;
pub mod loader;
pub mod package;
pub mod patch;
pub mod registry;
pub mod settings;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModError, ModResult};
use hooks::Hook;
use loader::LoadedBinary;
use patch::Patch;
use registry::LoaderDirs;
use settings::{to_pretty_json, Setting, SettingValue};

fn default_supports_disabling() -> bool {
    true
}

/// Metadata for a mod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModInfo {
    /// Unique mod id
    pub id: String,
    /// Display name
    pub name: String,
    /// Mod developer
    pub developer: String,
    /// Mod version (semver)
    pub version: Version,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Declared dependencies, in declaration order
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Whether the mod can be disabled after loading
    #[serde(default = "default_supports_disabling")]
    pub supports_disabling: bool,
    /// Whether the mod's binary can be unloaded from the process
    #[serde(default)]
    pub supports_unloading: bool,
    /// On-disk package archive path
    pub package_path: PathBuf,
    /// Name of the platform binary entry inside the package
    pub binary_name: String,
}

/// A declared dependency on another mod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Id of the required mod
    pub id: String,
    /// Acceptable version range
    pub version: VersionReq,
    /// Cached id of the mod that satisfied this dependency last pass.
    ///
    /// Non-owning and never assumed stable: every resolution pass recomputes
    /// it against the registry.
    #[serde(skip)]
    pub(crate) resolved: Option<String>,
}

impl Dependency {
    /// Declare a dependency on `id` within `version`.
    pub fn new(id: impl Into<String>, version: VersionReq) -> Self {
        Self {
            id: id.into(),
            version,
            resolved: None,
        }
    }

    /// Id of the mod that satisfied this dependency, if resolution cached one.
    pub fn resolved_id(&self) -> Option<&str> {
        self.resolved.as_deref()
    }
}

/// A known mod and its lifecycle state.
///
/// Constructed by the registry when a mod is installed; lives for the rest of
/// the process (uninstalling deletes the package from disk but keeps the
/// in-memory object until restart).
pub struct Mod {
    pub(crate) info: ModInfo,
    save_dir: PathBuf,
    config_dir: PathBuf,
    pub(crate) temp_dir: Option<PathBuf>,
    pub(crate) enabled: bool,
    pub(crate) binary_loaded: bool,
    pub(crate) binary: Option<Box<dyn LoadedBinary>>,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) patches: Vec<Patch>,
    settings: HashMap<String, Box<dyn SettingValue>>,
    /// Raw settings.json from the last load; source for unknown-key passthrough
    saved_settings_data: Value,
    /// Arbitrary saved data blob (saved.json)
    saved: Value,
}

impl Mod {
    pub(crate) fn new(info: ModInfo, dirs: &LoaderDirs) -> ModResult<Self> {
        let save_dir = dirs.save_root.join(&info.id);
        fs::create_dir_all(&save_dir).map_err(|e| {
            ModError::filesystem(
                format!("unable to create save directory {:?}: {}", save_dir, e),
                "check permissions on the mods save directory",
            )
        })?;
        let config_dir = dirs.config_root.join(&info.id);
        Ok(Self {
            info,
            save_dir,
            config_dir,
            temp_dir: None,
            enabled: false,
            binary_loaded: false,
            binary: None,
            hooks: Vec::new(),
            patches: Vec::new(),
            settings: HashMap::new(),
            saved_settings_data: Value::Null,
            saved: Value::Object(serde_json::Map::new()),
        })
    }

    /// Create default value handlers for every declared setting.
    pub(crate) fn setup_settings(&mut self, definitions: Vec<(String, Box<dyn Setting>)>) {
        for (key, setting) in definitions {
            if let Some(value) = setting.create_default_value() {
                self.settings.insert(key, value);
            }
        }
    }

    // Getters

    /// Unique mod id.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Mod developer.
    pub fn developer(&self) -> &str {
        &self.info.developer
    }

    /// Human-readable description.
    pub fn description(&self) -> Option<&str> {
        self.info.description.as_deref()
    }

    /// Mod version.
    pub fn version(&self) -> &Version {
        &self.info.version
    }

    /// Full metadata.
    pub fn info(&self) -> &ModInfo {
        &self.info
    }

    /// Private save directory for persisted data.
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Per-mod configuration directory.
    ///
    /// Created on demand when `create` is set.
    pub fn config_dir(&self, create: bool) -> &Path {
        if create {
            if let Err(e) = fs::create_dir_all(&self.config_dir) {
                log::warn!("Unable to create config directory for '{}': {}", self.info.id, e);
            }
        }
        &self.config_dir
    }

    /// Extraction directory for the packaged binary; `None` until first load.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    /// Path of the extracted platform binary; `None` until first load.
    pub fn binary_path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|dir| dir.join(&self.info.binary_name))
    }

    /// On-disk package archive path.
    pub fn package_path(&self) -> &Path {
        &self.info.package_path
    }

    /// Whether the mod is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the mod's binary is resident in the process.
    pub fn is_loaded(&self) -> bool {
        self.binary_loaded
    }

    /// Whether the mod can be disabled after loading.
    pub fn supports_disabling(&self) -> bool {
        self.info.supports_disabling
    }

    /// Whether the mod's binary can be unloaded.
    pub fn supports_unloading(&self) -> bool {
        self.info.supports_unloading
    }

    /// A mod loaded successfully when it is either loaded or never asked for.
    pub fn was_successfully_loaded(&self) -> bool {
        !self.enabled || self.binary_loaded
    }

    /// Hooks owned by this mod.
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Patches owned by this mod.
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Whether this mod declares a dependency on `id`.
    pub fn depends(&self, id: &str) -> bool {
        self.info.dependencies.iter().any(|dep| dep.id == id)
    }

    // Settings and saved values

    /// Whether the mod has any settings with live handlers.
    pub fn has_settings(&self) -> bool {
        !self.settings.is_empty()
    }

    /// Keys of settings with live handlers.
    pub fn setting_keys(&self) -> Vec<&str> {
        self.settings.keys().map(String::as_str).collect()
    }

    /// Whether a live handler exists for `key`.
    pub fn has_setting(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    /// Value handler for `key`.
    pub fn setting(&self, key: &str) -> Option<&dyn SettingValue> {
        self.settings.get(key).map(|value| &**value)
    }

    /// Mutable value handler for `key`.
    pub fn setting_mut(&mut self, key: &str) -> Option<&mut (dyn SettingValue + 'static)> {
        self.settings.get_mut(key).map(|value| &mut **value)
    }

    /// Register a setting handler that was not declared up front.
    ///
    /// If a value for `key` was present in the last loaded `settings.json`,
    /// it is fed into the handler before registration. A handler already
    /// registered for `key` is kept.
    pub fn register_custom_setting(&mut self, key: impl Into<String>, mut value: Box<dyn SettingValue>) {
        let key = key.into();
        if self.settings.contains_key(&key) {
            return;
        }
        if let Some(previous) = self.saved_settings_data.get(&key) {
            value.load(previous);
        }
        self.settings.insert(key, value);
    }

    /// A previously saved arbitrary value.
    pub fn saved_value(&self, key: &str) -> Option<&Value> {
        self.saved.get(key)
    }

    /// Store an arbitrary value to be persisted in `saved.json`.
    pub fn set_saved_value(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(map) = &mut self.saved {
            map.insert(key.into(), value);
        }
    }

    // Persistence

    pub(crate) fn load_data(&mut self) -> ModResult<()> {
        let settings_path = self.save_dir.join("settings.json");
        if settings_path.exists() {
            let data = fs::read_to_string(&settings_path).map_err(|e| {
                ModError::filesystem(
                    format!("unable to read settings.json: {}", e),
                    "check permissions on the mod save directory",
                )
            })?;
            let json: Value = serde_json::from_str(&data)
                .map_err(|e| ModError::parse(format!("unable to parse settings: {}", e)))?;
            self.saved_settings_data = json.clone();

            if let Value::Object(map) = &json {
                for (key, value) in map {
                    if let Some(setting) = self.settings.get_mut(key) {
                        if !setting.load(value) {
                            log::error!(
                                "{}: Unable to load value for setting \"{}\"",
                                self.info.id,
                                key
                            );
                        }
                    } else {
                        log::warn!(
                            "{}: Encountered unknown setting \"{}\" while loading settings",
                            self.info.id,
                            key
                        );
                    }
                }
            }
        }

        let saved_path = self.save_dir.join("saved.json");
        if saved_path.exists() {
            let data = fs::read_to_string(&saved_path).map_err(|e| {
                ModError::filesystem(
                    format!("unable to read saved.json: {}", e),
                    "check permissions on the mod save directory",
                )
            })?;
            self.saved = serde_json::from_str(&data)
                .map_err(|e| ModError::parse(format!("unable to parse saved values: {}", e)))?;
            // The lifecycle persists the enabled flag alongside the mod's own
            // saved values; restore it here so a mod enabled last session
            // loads again on the next resolution pass.
            if let Some(Value::Bool(enabled)) = self.saved.get("enabled") {
                self.enabled = *enabled;
            }
        }

        Ok(())
    }

    pub(crate) fn save_data(&self) -> ModResult<()> {
        // Data saving is fail-safe: every step is attempted, failures logged.

        let mut covered: Vec<&str> = Vec::new();
        let mut json = serde_json::Map::new();
        for (key, value) in &self.settings {
            covered.push(key.as_str());
            let mut out = Value::Null;
            if !value.save(&mut out) {
                log::error!("Unable to save setting \"{}\"", key);
            }
            json.insert(key.clone(), out);
        }

        // Settings without a live handler (for example because the mod never
        // loaded this session) keep their previous state instead of being
        // silently dropped.
        if let Value::Object(previous) = &self.saved_settings_data {
            for (key, value) in previous {
                if !covered.contains(&key.as_str()) {
                    json.insert(key.clone(), value.clone());
                }
            }
        }
        self.write_json("settings.json", &Value::Object(json));

        let mut saved = self.saved.clone();
        if let Value::Object(map) = &mut saved {
            map.insert("enabled".to_string(), Value::Bool(self.enabled));
        }
        self.write_json("saved.json", &saved);

        Ok(())
    }

    fn write_json(&self, file: &str, value: &Value) {
        let path = self.save_dir.join(file);
        match to_pretty_json(value) {
            Ok(text) => {
                if let Err(e) = fs::write(&path, text) {
                    log::error!("Unable to save {} for '{}': {}", file, self.info.id, e);
                }
            }
            Err(e) => log::error!("Unable to serialize {} for '{}': {}", file, self.info.id, e),
        }
    }

    /// JSON snapshot of the mod's runtime state, for diagnostics and tooling.
    pub fn runtime_info(&self) -> Value {
        serde_json::json!({
            "id": self.info.id,
            "name": self.info.name,
            "version": self.info.version.to_string(),
            "enabled": self.enabled,
            "loaded": self.binary_loaded,
            "hooks": self.hooks.iter().map(|hook| serde_json::json!({
                "name": hook.name(),
                "address": hook.address(),
                "enabled": hook.is_enabled(),
            })).collect::<Vec<_>>(),
            "patches": self.patches.iter().map(|patch| serde_json::json!({
                "address": patch.address(),
                "length": patch.replacement().len(),
            })).collect::<Vec<_>>(),
            "save-dir": self.save_dir,
            "temp-dir": self.temp_dir,
            "config-dir": self.config_dir,
        })
    }
}
