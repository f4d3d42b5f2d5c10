//! Hook System for Function Interception
//!
//! A [`Hook`] represents one intercepted function, owned by exactly one mod.
//! The [`HookManager`] is the process-wide installation table: it knows which
//! addresses are currently intercepted and on whose behalf, and validates
//! targets against host memory before an interception goes live.
//!
//! Dispatching intercepted calls is the host's concern; the runtime only
//! guarantees that installation and removal are paired correctly with the
//! owning mod's lifecycle.

use std::collections::HashMap;

use crate::error::{ModError, ModResult};
use loadstone_core::memory::HostMemory;

/// One intercepted function, owned by a single mod.
///
/// Carries enough state to re-derive enable/disable: the target address and
/// whether the interception is currently installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    name: String,
    address: u32,
    enabled: bool,
}

impl Hook {
    /// Create a hook for the function at `address`.
    ///
    /// The hook is not installed until its owning mod enables it.
    pub fn new(name: impl Into<String>, address: u32) -> Self {
        Self {
            name: name.into(),
            address,
            enabled: false,
        }
    }

    /// Display name of the hooked function.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target address of the interception.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Whether the interception is currently installed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Process-wide table of installed interceptions.
///
/// Multiple mods may hook the same address; each installation is tracked
/// against its owner so teardown removes exactly the owner's interceptions.
#[derive(Debug, Default)]
pub struct HookManager {
    /// Installed interceptions by target address (owner mod ids)
    installed: HashMap<u32, Vec<String>>,
}

impl HookManager {
    /// Create an empty hook manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an interception at `address` on behalf of `owner`.
    ///
    /// Installing a hook the owner already has at that address is a no-op.
    ///
    /// # Errors
    /// [`ModError::Hook`] if the target address is outside host memory.
    pub fn install(&mut self, memory: &HostMemory, owner: &str, address: u32) -> ModResult<()> {
        if !memory.contains(address, 1) {
            return Err(ModError::hook(format!(
                "hook target 0x{:08X} is outside host memory",
                address
            )));
        }
        let owners = self.installed.entry(address).or_default();
        if !owners.iter().any(|o| o == owner) {
            owners.push(owner.to_string());
        }
        Ok(())
    }

    /// Remove `owner`'s interception at `address`.
    ///
    /// Removing an interception that is not installed is a no-op.
    pub fn remove(&mut self, owner: &str, address: u32) {
        if let Some(owners) = self.installed.get_mut(&address) {
            owners.retain(|o| o != owner);
            if owners.is_empty() {
                self.installed.remove(&address);
            }
        }
    }

    /// Remove every interception installed on behalf of `owner`.
    pub fn remove_owner(&mut self, owner: &str) {
        self.installed.retain(|_, owners| {
            owners.retain(|o| o != owner);
            !owners.is_empty()
        });
    }

    /// Whether any interception is installed at `address`.
    pub fn is_hooked(&self, address: u32) -> bool {
        self.installed.contains_key(&address)
    }

    /// Mods currently intercepting `address`.
    pub fn owners(&self, address: u32) -> &[String] {
        self.installed.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of addresses with at least one installed interception.
    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }

    /// Clear all interceptions.
    pub fn clear(&mut self) {
        self.installed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_remove() {
        let memory = HostMemory::new(0x0040_0000, 64);
        let mut hooks = HookManager::new();

        hooks.install(&memory, "alpha", 0x0040_0010).unwrap();
        assert!(hooks.is_hooked(0x0040_0010));

        hooks.remove("alpha", 0x0040_0010);
        assert!(!hooks.is_hooked(0x0040_0010));
    }

    #[test]
    fn test_install_outside_memory_fails() {
        let memory = HostMemory::new(0x0040_0000, 64);
        let mut hooks = HookManager::new();

        let err = hooks.install(&memory, "alpha", 0xDEAD_0000).unwrap_err();
        assert!(matches!(err, ModError::Hook { .. }));
        assert!(!hooks.is_hooked(0xDEAD_0000));
    }

    #[test]
    fn test_shared_address_tracks_owners() {
        let memory = HostMemory::new(0x0040_0000, 64);
        let mut hooks = HookManager::new();

        hooks.install(&memory, "alpha", 0x0040_0010).unwrap();
        hooks.install(&memory, "beta", 0x0040_0010).unwrap();
        assert_eq!(hooks.owners(0x0040_0010).len(), 2);

        hooks.remove_owner("alpha");
        assert_eq!(hooks.owners(0x0040_0010), ["beta".to_string()]);
        assert!(hooks.is_hooked(0x0040_0010));
    }

    #[test]
    fn test_double_install_is_idempotent() {
        let memory = HostMemory::new(0x0040_0000, 64);
        let mut hooks = HookManager::new();

        hooks.install(&memory, "alpha", 0x0040_0010).unwrap();
        hooks.install(&memory, "alpha", 0x0040_0010).unwrap();
        assert_eq!(hooks.owners(0x0040_0010).len(), 1);
    }
}
