//! Platform Binary Loading
//!
//! This module handles loading mod binaries into the host process. In
//! production a binary is a dynamic library (`.so`, `.dylib`, `.dll`) loaded
//! with `libloading`; the [`PlatformLoader`] trait is the seam that lets the
//! lifecycle be driven without touching the OS loader.
//!
//! # Binary Requirements
//!
//! A mod binary must export one entry point:
//!
//! ```text
//! #[no_mangle]
//! pub extern "C" fn mod_main() { /* install hooks, register settings */ }
//! ```
//!
//! The entry point is invoked exactly once, immediately after the binary is
//! loaded. Unloading drops the library handle, which unmaps the binary.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{ModError, ModResult};

/// Exported entry point signature.
pub type ModEntryFn = unsafe extern "C" fn();

/// Name of the symbol every mod binary must export.
pub const MOD_ENTRY_SYMBOL: &[u8] = b"mod_main";

/// A mod binary resident in the host process.
///
/// Dropping the handle unloads the binary.
pub trait LoadedBinary: Send {
    /// Invoke the mod's entry point.
    fn invoke_entry(&self) -> ModResult<()>;
}

/// Loads mod binaries into the process.
pub trait PlatformLoader: Send {
    /// Load the binary at `path` and return its handle.
    fn load(&mut self, path: &Path) -> ModResult<Box<dyn LoadedBinary>>;
}

/// Production loader backed by `libloading`.
#[derive(Debug, Default)]
pub struct DynamicLibraryLoader;

impl PlatformLoader for DynamicLibraryLoader {
    fn load(&mut self, path: &Path) -> ModResult<Box<dyn LoadedBinary>> {
        log::info!("Loading mod binary from: {:?}", path);
        // Safety: loading a mod binary executes its initializers. That is the
        // entire point of a binary mod system; the host trusts installed
        // packages.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            ModError::extraction(format!("unable to load binary {:?}: {}", path, e))
        })?;
        Ok(Box::new(DynamicBinary { library }))
    }
}

struct DynamicBinary {
    library: Library,
}

impl LoadedBinary for DynamicBinary {
    fn invoke_entry(&self) -> ModResult<()> {
        // Safety: the symbol signature is part of the mod ABI contract.
        unsafe {
            let entry: Symbol<ModEntryFn> = self.library.get(MOD_ENTRY_SYMBOL).map_err(|e| {
                ModError::extraction(format!("binary does not export mod_main: {}", e))
            })?;
            entry();
        }
        Ok(())
    }
}
