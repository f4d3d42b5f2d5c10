//! Core substrate for the loadstone mod runtime.
//!
//! This crate holds the pieces of the runtime that do not depend on the mod
//! lifecycle itself. Currently that is the host memory image that mods patch
//! and hook into.

pub mod memory;

pub use memory::HostMemory;
