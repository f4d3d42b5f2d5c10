//! Mod Registry and Lifecycle Driver
//!
//! The [`ModRegistry`] is the process-wide table of all known mods and the
//! entry point for every lifecycle transition. It owns the host memory
//! image, the hook installation table, and the event bus, so a single
//! `&mut ModRegistry` is enough to drive any operation.
//!
//! # Lifecycle
//!
//! A mod moves between four states along two axes: binary loaded/unloaded
//! and enabled/disabled. `load_binary` refuses to run while any declared
//! dependency is unresolved; every completed load or unload triggers
//! [`ModRegistry::update_all_dependencies`], the registry-wide re-resolution
//! pass, because one mod's state can unblock or break others.
//!
//! # Resolution
//!
//! Resolution is recursive and bottom-up: a mod's dependencies are settled
//! before the mod itself. The recursion carries the current resolution path
//! and reports a cycle in the declarations as
//! [`ModError::CyclicDependency`] instead of recursing forever. All
//! lifecycle operations are expected to run on one control thread; the pass
//! is synchronous and must not be re-entered from listener callbacks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use semver::VersionReq;

use crate::error::{ModError, ModResult};
use crate::events::{EventBus, ModEventKind, ModEventListener};
use loadstone_core::memory::HostMemory;

use super::hooks::{Hook, HookManager};
use super::loader::{DynamicLibraryLoader, PlatformLoader};
use super::package::{PackageSource, ZipPackageSource};
use super::patch::Patch;
use super::settings::Setting;
use super::{Dependency, Mod, ModInfo};

/// Root directories the registry places per-mod data under.
#[derive(Debug, Clone)]
pub struct LoaderDirs {
    /// Per-mod save directories live under here
    pub save_root: PathBuf,
    /// Per-mod binary extraction directories live under here
    pub runtime_root: PathBuf,
    /// Per-mod configuration directories live under here
    pub config_root: PathBuf,
}

impl LoaderDirs {
    /// Standard layout under a single root directory.
    pub fn under(root: &Path) -> Self {
        Self {
            save_root: root.join("save"),
            runtime_root: root.join("temp"),
            config_root: root.join("config"),
        }
    }
}

/// An unresolved dependency, reported per declaring mod.
#[derive(Debug, Clone)]
pub struct LoadProblem {
    /// Mod whose dependency is unresolved
    pub mod_id: String,
    /// Id of the missing or incompatible dependency
    pub dependency: String,
    /// Version range the declaring mod requires
    pub requirement: VersionReq,
}

/// Process-wide table of all known mods.
pub struct ModRegistry {
    dirs: LoaderDirs,
    memory: HostMemory,
    mods: HashMap<String, Mod>,
    hooks: HookManager,
    events: EventBus,
    platform: Box<dyn PlatformLoader>,
    packages: Box<dyn PackageSource>,
    /// Hooks queue here until the host's hooking subsystem comes up
    pending_hooks: Vec<(String, Hook)>,
    ready_to_hook: bool,
}

impl ModRegistry {
    /// Create a registry over the given directories and host memory image.
    ///
    /// Uses the production backends (dynamic library loading, zip packages);
    /// see [`ModRegistry::set_platform_loader`] and
    /// [`ModRegistry::set_package_source`] to substitute them.
    pub fn new(dirs: LoaderDirs, memory: HostMemory) -> Self {
        Self {
            dirs,
            memory,
            mods: HashMap::new(),
            hooks: HookManager::new(),
            events: EventBus::new(),
            platform: Box::new(DynamicLibraryLoader),
            packages: Box::new(ZipPackageSource),
            pending_hooks: Vec::new(),
            ready_to_hook: false,
        }
    }

    /// Replace the platform binary loader.
    pub fn set_platform_loader(&mut self, loader: Box<dyn PlatformLoader>) {
        self.platform = loader;
    }

    /// Replace the package source.
    pub fn set_package_source(&mut self, source: Box<dyn PackageSource>) {
        self.packages = source;
    }

    /// Host memory image mods patch and hook into.
    pub fn memory(&self) -> &HostMemory {
        &self.memory
    }

    /// Mutable host memory image.
    pub fn memory_mut(&mut self) -> &mut HostMemory {
        &mut self.memory
    }

    /// Installed-interception table.
    pub fn hook_manager(&self) -> &HookManager {
        &self.hooks
    }

    /// Subscribe to lifecycle events. Fire-and-forget; listeners can observe
    /// but never block the lifecycle.
    pub fn subscribe(&mut self, listener: ModEventListener) {
        self.events.subscribe(listener);
    }

    // Installation & queries

    /// Register a mod with the registry.
    ///
    /// Creates the mod's save directory, sets up declared settings, and loads
    /// persisted data (restoring the enabled flag from the previous session;
    /// data-load failures are logged, never fatal). The mod's binary is not
    /// loaded until a resolution pass or an explicit `load_binary` call.
    ///
    /// Installing an id that is already registered keeps the existing mod and
    /// logs a warning.
    pub fn install_mod(
        &mut self,
        info: ModInfo,
        settings: Vec<(String, Box<dyn Setting>)>,
    ) -> ModResult<()> {
        let id = info.id.clone();
        if self.mods.contains_key(&id) {
            log::warn!("Mod '{}' is already installed; keeping the existing mod", id);
            return Ok(());
        }

        let mut m = Mod::new(info, &self.dirs)?;
        m.setup_settings(settings);
        self.mods.insert(id.clone(), m);

        // The mod is registered before the event fires, so observers reacting
        // to the notification can already look it up.
        self.events.post(&id, ModEventKind::DataLoaded);
        if let Err(e) = self.mod_mut(&id)?.load_data() {
            log::warn!("Unable to load data for \"{}\": {}", id, e);
        }
        Ok(())
    }

    /// A known mod by id.
    pub fn get_mod(&self, id: &str) -> Option<&Mod> {
        self.mods.get(id)
    }

    /// A known mod by id, mutably.
    pub fn get_mod_mut(&mut self, id: &str) -> Option<&mut Mod> {
        self.mods.get_mut(id)
    }

    /// A mod by id, but only if its binary is currently loaded.
    pub fn get_loaded_mod(&self, id: &str) -> Option<&Mod> {
        self.mods.get(id).filter(|m| m.binary_loaded)
    }

    /// Whether a mod is known and currently loaded.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.get_loaded_mod(id).is_some()
    }

    /// Iterate over all known mods.
    pub fn mods(&self) -> impl Iterator<Item = &Mod> {
        self.mods.values()
    }

    /// Ids of all known mods.
    pub fn mod_ids(&self) -> Vec<String> {
        self.mods.keys().cloned().collect()
    }

    fn mod_ref(&self, id: &str) -> ModResult<&Mod> {
        self.mods.get(id).ok_or_else(|| ModError::unknown_mod(id))
    }

    fn mod_mut(&mut self, id: &str) -> ModResult<&mut Mod> {
        self.mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))
    }

    // Loading & toggling

    /// Load a mod's binary into the process and enable it.
    ///
    /// No-op success if already loaded. Fails with [`ModError::Dependency`]
    /// before any side effect while a declared dependency is unresolved. On
    /// success the package is extracted (once), the binary loaded, the entry
    /// point invoked, a `Loaded` event posted, a registry-wide re-resolution
    /// pass run, and the mod enabled. A failure after the binary is resident
    /// leaves it resident; there is no automatic rollback of a successful
    /// load.
    pub fn load_binary(&mut self, id: &str) -> ModResult<()> {
        if self.mod_ref(id)?.binary_loaded {
            return Ok(());
        }
        if self.has_unresolved_dependencies(id)? {
            return Err(ModError::dependency(id));
        }

        self.ensure_runtime_dir(id)?;

        let binary_path = self
            .mod_ref(id)?
            .binary_path()
            .ok_or_else(|| ModError::extraction(format!("mod '{}' has no extracted binary", id)))?;
        let binary = self.platform.load(&binary_path)?;

        {
            let m = self.mod_mut(id)?;
            m.binary = Some(binary);
            m.binary_loaded = true;
        }

        // Single entry point, invoked exactly once per load; this is where
        // the mod installs its hooks and registers custom settings.
        {
            let m = self.mod_ref(id)?;
            if let Some(binary) = &m.binary {
                binary.invoke_entry()?;
            }
        }

        self.events.post(id, ModEventKind::Loaded);
        self.update_all_dependencies();
        self.enable(id)
    }

    /// Unload a mod's binary from the process.
    ///
    /// No-op success if not loaded. Fails with
    /// [`ModError::UnsupportedOperation`] if the mod opted out of unloading,
    /// leaving state unchanged. Persists data best-effort (a failed save must
    /// never block an unload), disables the mod (propagating failure), tears
    /// down every owned hook and patch best-effort, drops the binary, and
    /// triggers a registry-wide re-resolution pass.
    pub fn unload_binary(&mut self, id: &str) -> ModResult<()> {
        {
            let m = self.mod_ref(id)?;
            if !m.binary_loaded {
                return Ok(());
            }
            if !m.info.supports_unloading {
                return Err(ModError::unsupported(id, "unloading"));
            }
        }

        self.events.post(id, ModEventKind::DataSaved);
        if let Err(e) = self.mod_ref(id)?.save_data() {
            log::error!("Unable to save data for \"{}\": {}", id, e);
        }

        self.disable(id)?;
        self.events.post(id, ModEventKind::Unloaded);

        // Teardown of owned resources is best-effort: leaking them would be
        // worse than a failed restore.
        self.pending_hooks.retain(|(owner, _)| owner != id);
        let m = self
            .mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))?;
        for hook in m.hooks.drain(..) {
            self.hooks.remove(id, hook.address());
        }
        for patch in m.patches.drain(..).collect::<Vec<Patch>>() {
            if let Err(e) = patch.restore(&mut self.memory) {
                log::warn!(
                    "Unable to restore patch at 0x{:08X} while unloading '{}': {}",
                    patch.address(),
                    id,
                    e
                );
            }
        }
        m.binary = None;
        m.binary_loaded = false;

        self.update_all_dependencies();
        Ok(())
    }

    /// Enable a mod.
    ///
    /// Delegates to [`ModRegistry::load_binary`] when the binary is not
    /// loaded. Otherwise re-installs every owned hook and re-applies every
    /// owned patch, failing fast on the first failure; hooks enabled before
    /// the failure stay enabled, and that partial state is the reported
    /// condition.
    pub fn enable(&mut self, id: &str) -> ModResult<()> {
        if !self.mod_ref(id)?.binary_loaded {
            return self.load_binary(id);
        }

        let m = self
            .mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))?;
        for hook in m.hooks.iter_mut() {
            self.hooks.install(&self.memory, id, hook.address())?;
            hook.set_enabled(true);
        }
        for patch in m.patches.iter() {
            patch.apply(&mut self.memory)?;
        }
        m.enabled = true;

        self.events.post(id, ModEventKind::Enabled);
        Ok(())
    }

    /// Disable a mod.
    ///
    /// No-op success if already disabled. Fails with
    /// [`ModError::UnsupportedOperation`] if the mod opted out. The
    /// `Disabled` event fires before teardown so observers see intent before
    /// effect. Hooks are uninstalled, then patches restored; the first patch
    /// failure aborts the loop and propagates, leaving the partial state
    /// visible.
    pub fn disable(&mut self, id: &str) -> ModResult<()> {
        {
            let m = self.mod_ref(id)?;
            if !m.enabled {
                return Ok(());
            }
            if !m.info.supports_disabling {
                return Err(ModError::unsupported(id, "disabling"));
            }
        }

        self.events.post(id, ModEventKind::Disabled);

        let m = self
            .mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))?;
        for hook in m.hooks.iter_mut() {
            self.hooks.remove(id, hook.address());
            hook.set_enabled(false);
        }
        for patch in m.patches.iter() {
            patch.restore(&mut self.memory)?;
        }
        m.enabled = false;
        Ok(())
    }

    /// Uninstall a mod: disable (if supported), unload (if supported), and
    /// delete the package file.
    ///
    /// Mods that do not support disabling are deleted from disk while still
    /// resident; the in-memory mod persists until process restart.
    pub fn uninstall(&mut self, id: &str) -> ModResult<()> {
        let (supports_disabling, supports_unloading, package_path) = {
            let m = self.mod_ref(id)?;
            (
                m.info.supports_disabling,
                m.info.supports_unloading,
                m.info.package_path.clone(),
            )
        };

        if supports_disabling {
            self.disable(id)?;
            if supports_unloading {
                self.unload_binary(id)?;
            }
        }

        fs::remove_file(&package_path).map_err(|e| {
            ModError::filesystem(
                format!("unable to delete mod package {:?}: {}", package_path, e),
                "the package may be in use or access denied; try running the host with elevated permissions",
            )
        })?;
        Ok(())
    }

    /// Whether a mod's package file has been deleted from disk.
    pub fn is_uninstalled(&self, id: &str) -> ModResult<bool> {
        Ok(!self.mod_ref(id)?.info.package_path.exists())
    }

    /// Ensure the mod's binary has been extracted from its package.
    ///
    /// Idempotent: once the extraction directory exists for this session,
    /// later calls return immediately.
    fn ensure_runtime_dir(&mut self, id: &str) -> ModResult<()> {
        if self.mod_ref(id)?.temp_dir.is_some() {
            return Ok(());
        }

        let (package_path, binary_name) = {
            let m = self.mod_ref(id)?;
            (m.info.package_path.clone(), m.info.binary_name.clone())
        };

        fs::create_dir_all(&self.dirs.runtime_root).map_err(|e| {
            ModError::filesystem(
                format!("unable to create mod runtime directory: {}", e),
                "check permissions on the runtime directory",
            )
        })?;
        let temp_path = self.dirs.runtime_root.join(id);
        fs::create_dir_all(&temp_path).map_err(|e| {
            ModError::filesystem(
                format!("unable to create runtime directory for '{}': {}", id, e),
                "check permissions on the runtime directory",
            )
        })?;

        let mut package = self.packages.open(&package_path)?;
        if !package.has_entry(&binary_name) {
            return Err(ModError::extraction(format!(
                "unable to find platform binary under the name \"{}\"",
                binary_name
            )));
        }
        package.extract_all_to(&temp_path)?;

        self.mod_mut(id)?.temp_dir = Some(temp_path);
        Ok(())
    }

    // Dependencies

    /// Re-resolve every known mod's dependencies.
    ///
    /// Runs after any load or unload completes. Per-mod failures (including
    /// cyclic declarations) are logged and do not stop the sweep.
    pub fn update_all_dependencies(&mut self) {
        for id in self.mod_ids() {
            let mut path = Vec::new();
            if let Err(e) = self.update_mod_dependencies(&id, &mut path) {
                log::error!("Dependency resolution failed for '{}': {}", id, e);
            }
        }
    }

    /// Recursively resolve one mod's dependencies, bottom-up.
    ///
    /// `path` is the chain of mods currently being resolved; revisiting a
    /// member of the chain means the declarations form a cycle.
    fn update_mod_dependencies(&mut self, id: &str, path: &mut Vec<String>) -> ModResult<()> {
        if path.iter().any(|entry| entry == id) {
            return Err(ModError::CyclicDependency { id: id.to_string() });
        }
        self.mod_ref(id)?;
        path.push(id.to_string());
        let result = self.resolve_dependencies(id, path);
        path.pop();
        result
    }

    fn resolve_dependencies(&mut self, id: &str, path: &mut Vec<String>) -> ModResult<()> {
        let dependency_count = self.mod_ref(id)?.info.dependencies.len();
        let mut has_unresolved = false;

        for index in 0..dependency_count {
            let (dep_id, requirement) = {
                let dep = &self.mod_ref(id)?.info.dependencies[index];
                (dep.id.clone(), dep.version.clone())
            };

            // Recompute the cached resolution; it is never assumed stable
            // across passes.
            let candidate = self
                .mods
                .get(&dep_id)
                .map(|dep| requirement.matches(&dep.info.version))
                .unwrap_or(false);
            if let Some(m) = self.mods.get_mut(id) {
                m.info.dependencies[index].resolved =
                    if candidate { Some(dep_id.clone()) } else { None };
            }

            // Settle the dependency before judging it, then load it if it is
            // able to run. A failure to settle (such as a cyclic declaration)
            // leaves this dependency unresolved; the remaining siblings are
            // still evaluated every pass.
            if candidate {
                match self.update_mod_dependencies(&dep_id, path) {
                    Ok(()) => {
                        let dep_ready = !self.has_unresolved_dependencies(&dep_id)?
                            && self.mod_ref(&dep_id)?.enabled;
                        if dep_ready {
                            if let Err(e) = self.load_binary(&dep_id) {
                                log::error!("Unable to load dependency '{}': {}", dep_id, e);
                            }
                        }
                    }
                    Err(e) => {
                        log::error!(
                            "Unable to settle dependency '{}' for '{}': {}",
                            dep_id,
                            id,
                            e
                        );
                    }
                }
            }

            // A dependency that stayed unresolved forces this mod out of the
            // process; the remaining dependencies are still evaluated.
            let resolved = {
                let dep = &self.mod_ref(id)?.info.dependencies[index];
                self.is_dependency_resolved(dep)
            };
            if !resolved {
                if let Err(e) = self.unload_binary(id) {
                    log::error!("Unable to unload mod '{}': {}", id, e);
                }
                has_unresolved = true;
            }
        }

        if !has_unresolved {
            log::debug!("All dependencies for '{}' found", id);
            if self.mod_ref(id)?.enabled {
                log::debug!("Resolved & loading '{}'", id);
                self.load_binary(id)?;
            } else {
                log::debug!("Resolved '{}', however not loading it as it is disabled", id);
            }
        }
        Ok(())
    }

    fn is_dependency_resolved(&self, dep: &Dependency) -> bool {
        match &dep.resolved {
            Some(dep_id) => self
                .mods
                .get(dep_id)
                .map(|m| dep.version.matches(&m.info.version) && m.binary_loaded)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Whether any of a mod's declared dependencies is unresolved.
    pub fn has_unresolved_dependencies(&self, id: &str) -> ModResult<bool> {
        let m = self.mod_ref(id)?;
        Ok(m.info
            .dependencies
            .iter()
            .any(|dep| !self.is_dependency_resolved(dep)))
    }

    /// The unresolved subset of a mod's declared dependencies.
    pub fn unresolved_dependencies(&self, id: &str) -> ModResult<Vec<Dependency>> {
        let m = self.mod_ref(id)?;
        Ok(m.info
            .dependencies
            .iter()
            .filter(|dep| !self.is_dependency_resolved(dep))
            .cloned()
            .collect())
    }

    /// Unresolved dependencies across every known mod, for diagnostics/UI.
    pub fn load_problems(&self) -> Vec<LoadProblem> {
        let mut problems = Vec::new();
        for (id, m) in &self.mods {
            for dep in &m.info.dependencies {
                if !self.is_dependency_resolved(dep) {
                    problems.push(LoadProblem {
                        mod_id: id.clone(),
                        dependency: dep.id.clone(),
                        requirement: dep.version.clone(),
                    });
                }
            }
        }
        problems
    }

    // Hooks

    /// Whether the host's hooking subsystem has come up.
    pub fn is_ready_to_hook(&self) -> bool {
        self.ready_to_hook
    }

    /// Mark the hooking subsystem ready and bulk-install every queued hook.
    ///
    /// Installation failures are logged; the queue is drained either way.
    pub fn set_ready_to_hook(&mut self) {
        self.ready_to_hook = true;
        let pending = std::mem::take(&mut self.pending_hooks);
        for (id, hook) in pending {
            if let Err(e) = self.enable_hook(&id, hook) {
                log::error!("Unable to install queued hook for '{}': {}", id, e);
            }
        }
    }

    /// Add a hook owned by a mod.
    ///
    /// If the hooking subsystem is not yet ready, the hook is queued for
    /// bulk installation instead of being enabled immediately. On an
    /// installation failure nothing is added to the owning set.
    pub fn add_hook(&mut self, id: &str, hook: Hook) -> ModResult<()> {
        self.mod_ref(id)?;
        if !self.ready_to_hook {
            log::debug!(
                "Queueing hook '{}' for '{}' until the hooking subsystem is ready",
                hook.name(),
                id
            );
            self.pending_hooks.push((id.to_string(), hook));
            return Ok(());
        }
        self.enable_hook(id, hook)
    }

    fn enable_hook(&mut self, id: &str, mut hook: Hook) -> ModResult<()> {
        self.hooks.install(&self.memory, id, hook.address())?;
        hook.set_enabled(true);
        self.mod_mut(id)?.hooks.push(hook);
        Ok(())
    }

    /// Uninstall a mod's interception at `address`, keeping the hook in the
    /// owned set so a later enable can re-install it.
    pub fn disable_hook(&mut self, id: &str, address: u32) -> ModResult<()> {
        let m = self
            .mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))?;
        if let Some(hook) = m.hooks.iter_mut().find(|hook| hook.address() == address) {
            hook.set_enabled(false);
            self.hooks.remove(id, address);
        }
        Ok(())
    }

    /// Disable and permanently remove a mod's hook at `address`.
    pub fn remove_hook(&mut self, id: &str, address: u32) -> ModResult<()> {
        self.disable_hook(id, address)?;
        self.mod_mut(id)?
            .hooks
            .retain(|hook| hook.address() != address);
        Ok(())
    }

    // Patches

    /// Create and apply a patch owned by a mod.
    ///
    /// The original bytes are captured now, at creation time. If the apply
    /// fails the patch is discarded and nothing is added to the owning set.
    pub fn patch(&mut self, id: &str, address: u32, bytes: Vec<u8>) -> ModResult<()> {
        self.mod_ref(id)?;
        let patch = Patch::capture(&self.memory, address, bytes)?;
        patch.apply(&mut self.memory)?;
        self.mod_mut(id)?.patches.push(patch);
        Ok(())
    }

    /// Restore and remove a mod's patch at `address`.
    ///
    /// Only a successful restore removes the patch; a failed restore leaves
    /// it owned so a later attempt can retry. Unpatching an address the mod
    /// does not own is a no-op.
    pub fn unpatch(&mut self, id: &str, address: u32) -> ModResult<()> {
        let m = self
            .mods
            .get_mut(id)
            .ok_or_else(|| ModError::unknown_mod(id))?;
        let Some(position) = m.patches.iter().position(|p| p.address() == address) else {
            return Ok(());
        };
        m.patches[position].restore(&mut self.memory)?;
        m.patches.remove(position);
        Ok(())
    }

    // Persistence

    /// Reload a mod's persisted settings and saved data.
    pub fn load_data(&mut self, id: &str) -> ModResult<()> {
        self.mod_ref(id)?;
        self.events.post(id, ModEventKind::DataLoaded);
        self.mod_mut(id)?.load_data()
    }

    /// Persist a mod's settings and saved data.
    pub fn save_data(&self, id: &str) -> ModResult<()> {
        let m = self.mod_ref(id)?;
        self.events.post(id, ModEventKind::DataSaved);
        m.save_data()
    }

    /// Persist every known mod's data, best-effort.
    pub fn save_all(&self) {
        for (id, m) in &self.mods {
            self.events.post(id, ModEventKind::DataSaved);
            if let Err(e) = m.save_data() {
                log::error!("Unable to save data for \"{}\": {}", id, e);
            }
        }
    }
}
