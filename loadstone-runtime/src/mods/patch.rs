//! Reversible Byte Patches
//!
//! A [`Patch`] tracks a single byte-range modification of host memory: the
//! target address, the replacement bytes, and the original bytes captured
//! when the patch was created. Restoring always writes back that original
//! capture, so a restore is idempotent regardless of how many apply/restore
//! cycles happened in between.

use crate::error::{ModError, ModResult};
use loadstone_core::memory::HostMemory;

/// A single reversible byte-range modification.
///
/// Owned exclusively by one mod; dropping the owning mod's patch collection
/// drops the patch. Creation captures the original bytes at that moment,
/// not at enable time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    address: u32,
    original: Vec<u8>,
    replacement: Vec<u8>,
}

impl Patch {
    /// Capture the bytes currently at `address` and build a patch that
    /// replaces them with `replacement`.
    ///
    /// Does not apply the patch.
    ///
    /// # Errors
    /// [`ModError::Patch`] if the target range is not readable.
    pub fn capture(memory: &HostMemory, address: u32, replacement: Vec<u8>) -> ModResult<Self> {
        let original = memory
            .read_bytes(address, replacement.len())
            .map_err(|_| ModError::patch_apply(address))?;
        Ok(Self {
            address,
            original,
            replacement,
        })
    }

    /// Target address of the patch.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// The bytes that were at the target when the patch was created.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// The replacement bytes.
    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Write the replacement bytes over the target.
    ///
    /// # Errors
    /// [`ModError::Patch`] naming the target address if the write fails.
    pub fn apply(&self, memory: &mut HostMemory) -> ModResult<()> {
        memory
            .write_bytes(self.address, &self.replacement)
            .map_err(|_| ModError::patch_apply(self.address))
    }

    /// Write the original capture back over the target.
    ///
    /// Safe to call even if `apply` was never called since the last restore.
    ///
    /// # Errors
    /// [`ModError::Patch`] naming the target address if the write fails.
    pub fn restore(&self, memory: &mut HostMemory) -> ModResult<()> {
        memory
            .write_bytes(self.address, &self.original)
            .map_err(|_| ModError::patch_restore(self.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_returns_original_capture() {
        let mut memory = HostMemory::new(0x0040_0000, 16);
        memory.write_bytes(0x0040_0000, &[0x55, 0x8B]).unwrap();

        let patch = Patch::capture(&memory, 0x0040_0000, vec![0x90, 0x90]).unwrap();
        patch.apply(&mut memory).unwrap();
        assert_eq!(memory.read_bytes(0x0040_0000, 2).unwrap(), vec![0x90, 0x90]);

        patch.restore(&mut memory).unwrap();
        assert_eq!(memory.read_bytes(0x0040_0000, 2).unwrap(), vec![0x55, 0x8B]);
    }

    #[test]
    fn test_restore_without_apply_is_idempotent() {
        let mut memory = HostMemory::new(0x0040_0000, 16);
        memory.write_bytes(0x0040_0000, &[0xAA, 0xBB]).unwrap();

        let patch = Patch::capture(&memory, 0x0040_0000, vec![0x00, 0x00]).unwrap();
        // restore before any apply writes the original capture back
        patch.restore(&mut memory).unwrap();
        assert_eq!(memory.read_bytes(0x0040_0000, 2).unwrap(), vec![0xAA, 0xBB]);

        // repeated cycles always converge on the original capture
        patch.apply(&mut memory).unwrap();
        patch.restore(&mut memory).unwrap();
        patch.restore(&mut memory).unwrap();
        assert_eq!(memory.read_bytes(0x0040_0000, 2).unwrap(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_capture_out_of_bounds_fails() {
        let memory = HostMemory::new(0x0040_0000, 4);
        let err = Patch::capture(&memory, 0x0040_0003, vec![0, 0]).unwrap_err();
        assert!(matches!(err, ModError::Patch { address: 0x0040_0003, .. }));
    }
}
