// Hook and patch ownership tests against the registry
mod common;

#[cfg(test)]
mod tests {
    use crate::common::{Harness, MEMORY_BASE};
    use loadstone_runtime::mods::api::*;

    fn loaded_harness(id: &str) -> Harness {
        let mut h = Harness::new();
        let info = h.info(id, "1.0.0");
        h.install(info);
        h.registry.enable(id).unwrap();
        h
    }

    #[test]
    fn test_patch_applies_and_unpatch_restores() {
        let mut h = loaded_harness("patcher");
        let address = MEMORY_BASE + 0x200;
        h.registry
            .memory_mut()
            .write_bytes(address, &[0x55, 0x8B])
            .unwrap();

        h.registry.patch("patcher", address, vec![0x90, 0x90]).unwrap();
        assert_eq!(
            h.registry.memory().read_bytes(address, 2).unwrap(),
            vec![0x90, 0x90]
        );
        assert_eq!(h.registry.get_mod("patcher").unwrap().patches().len(), 1);

        h.registry.unpatch("patcher", address).unwrap();
        assert_eq!(
            h.registry.memory().read_bytes(address, 2).unwrap(),
            vec![0x55, 0x8B]
        );
        assert!(h.registry.get_mod("patcher").unwrap().patches().is_empty());
    }

    #[test]
    fn test_unpatch_unowned_address_is_a_noop() {
        let mut h = loaded_harness("patcher");
        h.registry.unpatch("patcher", MEMORY_BASE + 0x300).unwrap();
    }

    #[test]
    fn test_patch_outside_memory_adds_nothing() {
        let mut h = loaded_harness("patcher");
        let result = h.registry.patch("patcher", 0x1000_0000, vec![0x90]);
        assert!(matches!(result, Err(ModError::Patch { .. })));
        assert!(h.registry.get_mod("patcher").unwrap().patches().is_empty());
    }

    #[test]
    fn test_hooks_queue_until_subsystem_ready() {
        let mut h = loaded_harness("hooker");
        let address = MEMORY_BASE + 0x40;

        assert!(!h.registry.is_ready_to_hook());
        h.registry
            .add_hook("hooker", Hook::new("update", address))
            .unwrap();
        assert!(!h.registry.hook_manager().is_hooked(address));
        assert!(h.registry.get_mod("hooker").unwrap().hooks().is_empty());

        h.registry.set_ready_to_hook();
        assert!(h.registry.hook_manager().is_hooked(address));
        let hooks = h.registry.get_mod("hooker").unwrap().hooks();
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].is_enabled());
    }

    #[test]
    fn test_failed_hook_install_adds_nothing() {
        let mut h = loaded_harness("hooker");
        h.registry.set_ready_to_hook();

        let result = h
            .registry
            .add_hook("hooker", Hook::new("bad", 0x1000_0000));
        assert!(matches!(result, Err(ModError::Hook { .. })));
        assert!(h.registry.get_mod("hooker").unwrap().hooks().is_empty());
    }

    #[test]
    fn test_disable_hook_keeps_ownership_for_reenable() {
        let mut h = loaded_harness("hooker");
        h.registry.set_ready_to_hook();
        let address = MEMORY_BASE + 0x40;
        h.registry
            .add_hook("hooker", Hook::new("update", address))
            .unwrap();

        h.registry.disable_hook("hooker", address).unwrap();
        assert!(!h.registry.hook_manager().is_hooked(address));
        let hooks = h.registry.get_mod("hooker").unwrap().hooks();
        assert_eq!(hooks.len(), 1);
        assert!(!hooks[0].is_enabled());

        // Re-enabling the mod re-installs every owned hook.
        h.registry.enable("hooker").unwrap();
        assert!(h.registry.hook_manager().is_hooked(address));
        assert!(h.registry.get_mod("hooker").unwrap().hooks()[0].is_enabled());
    }

    #[test]
    fn test_remove_hook_forgets_it() {
        let mut h = loaded_harness("hooker");
        h.registry.set_ready_to_hook();
        let address = MEMORY_BASE + 0x40;
        h.registry
            .add_hook("hooker", Hook::new("update", address))
            .unwrap();

        h.registry.remove_hook("hooker", address).unwrap();
        assert!(!h.registry.hook_manager().is_hooked(address));
        assert!(h.registry.get_mod("hooker").unwrap().hooks().is_empty());

        h.registry.enable("hooker").unwrap();
        assert!(!h.registry.hook_manager().is_hooked(address));
    }

    #[test]
    fn test_shared_address_tracked_per_owner() {
        let mut h = Harness::new();
        for id in ["first", "second"] {
            let info = h.info(id, "1.0.0");
            h.install(info);
            h.registry.enable(id).unwrap();
        }
        h.registry.set_ready_to_hook();

        let address = MEMORY_BASE + 0x40;
        h.registry.add_hook("first", Hook::new("f", address)).unwrap();
        h.registry.add_hook("second", Hook::new("s", address)).unwrap();

        h.registry.remove_hook("first", address).unwrap();
        // The other owner's interception survives.
        assert!(h.registry.hook_manager().is_hooked(address));

        h.registry.remove_hook("second", address).unwrap();
        assert!(!h.registry.hook_manager().is_hooked(address));
    }

    #[test]
    fn test_disable_reverses_hooks_and_patches() {
        let mut h = loaded_harness("toggler");
        h.registry.set_ready_to_hook();
        let hook_addr = MEMORY_BASE + 0x40;
        let patch_addr = MEMORY_BASE + 0x200;
        h.registry
            .memory_mut()
            .write_bytes(patch_addr, &[0x55, 0x8B])
            .unwrap();
        h.registry
            .add_hook("toggler", Hook::new("update", hook_addr))
            .unwrap();
        h.registry
            .patch("toggler", patch_addr, vec![0x90, 0x90])
            .unwrap();

        h.registry.disable("toggler").unwrap();
        assert!(!h.registry.hook_manager().is_hooked(hook_addr));
        assert_eq!(
            h.registry.memory().read_bytes(patch_addr, 2).unwrap(),
            vec![0x55, 0x8B]
        );
        // Ownership survives a disable; enable brings everything back.
        let m = h.registry.get_mod("toggler").unwrap();
        assert_eq!(m.hooks().len(), 1);
        assert_eq!(m.patches().len(), 1);

        h.registry.enable("toggler").unwrap();
        assert!(h.registry.hook_manager().is_hooked(hook_addr));
        assert_eq!(
            h.registry.memory().read_bytes(patch_addr, 2).unwrap(),
            vec![0x90, 0x90]
        );
    }
}
