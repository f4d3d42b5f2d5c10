//! loadstone-runtime: the mod lifecycle manager.
//!
//! Loads third-party binary mods into a running host process, resolves
//! inter-mod dependencies, applies and reverses in-memory patches and
//! function hooks, and persists per-mod configuration.
//!
//! Start at [`mods::registry::ModRegistry`], the process-wide entry point,
//! or [`mods::api`] for the full public surface.

pub mod error;
pub mod events;
pub mod mods;

pub use error::{ModError, ModResult};
pub use mods::registry::ModRegistry;
