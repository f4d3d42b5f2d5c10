//! Public Modding API
//!
//! Re-exports all the types and traits needed to embed the mod runtime in a
//! host, or to build tooling around it:
//!
//! ```rust,no_run
//! use loadstone_runtime::mods::api::*;
//! ```

pub use crate::error::{ModError, ModResult};
pub use crate::events::{ModEvent, ModEventKind, ModEventListener};
pub use crate::mods::hooks::{Hook, HookManager};
pub use crate::mods::loader::{
    DynamicLibraryLoader, LoadedBinary, ModEntryFn, PlatformLoader, MOD_ENTRY_SYMBOL,
};
pub use crate::mods::package::{PackageArchive, PackageSource, ZipPackageSource};
pub use crate::mods::patch::Patch;
pub use crate::mods::registry::{LoadProblem, LoaderDirs, ModRegistry};
pub use crate::mods::settings::{RawSetting, RawSettingValue, Setting, SettingValue};
pub use crate::mods::{Dependency, Mod, ModInfo};

/// Re-export of the host memory image for mod convenience.
pub use loadstone_core::memory::HostMemory;
