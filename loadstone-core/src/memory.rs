//! Host Memory Image
//!
//! This module provides the writable view of host process memory that mod
//! patches and hooks operate against. It handles address translation and
//! bounds-checked reads/writes.
//!
//! # Address Model
//! The image is mapped at a fixed base address chosen by the host. Addresses
//! are 32-bit; an address is valid when it falls inside
//! `[base, base + len)`. Reads and writes never touch memory outside the
//! image.
//!
//! # API Reference
//!
//! ```rust,no_run
//! use loadstone_core::memory::HostMemory;
//!
//! let mut memory = HostMemory::new(0x0040_0000, 0x10000);
//! memory.write_bytes(0x0040_0000, &[0x55, 0x8B])?;
//! let original = memory.read_bytes(0x0040_0000, 2)?;
//! # anyhow::Ok(())
//! ```

use anyhow::{Context, Result};

/// Writable image of host memory.
///
/// The mod runtime hands out patch and hook targets as addresses into this
/// image. All accesses are bounds-checked; a failed access leaves the image
/// untouched.
#[derive(Debug)]
pub struct HostMemory {
    /// Base address the image is mapped at
    base: u32,
    /// Backing bytes
    image: Vec<u8>,
}

impl HostMemory {
    /// Create a zero-filled memory image of `size` bytes mapped at `base`.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            image: vec![0u8; size],
        }
    }

    /// Create a memory image from existing bytes mapped at `base`.
    pub fn from_image(base: u32, image: Vec<u8>) -> Self {
        Self { base, image }
    }

    /// Base address of the image.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Size of the image in bytes.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Whether the image is empty.
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Check whether `len` bytes starting at `address` fall inside the image.
    #[inline]
    pub fn contains(&self, address: u32, len: usize) -> bool {
        match self.translate(address) {
            Some(offset) => offset.checked_add(len).is_some_and(|end| end <= self.image.len()),
            None => false,
        }
    }

    /// Translate a host address to an offset into the image.
    #[inline(always)]
    fn translate(&self, address: u32) -> Option<usize> {
        let offset = address.checked_sub(self.base)? as usize;
        if offset < self.image.len() {
            Some(offset)
        } else {
            None
        }
    }

    /// Read a single byte.
    ///
    /// # Errors
    /// Returns an error if the address is outside the image.
    #[inline]
    pub fn read_u8(&self, address: u32) -> Result<u8> {
        let offset: usize = self
            .translate(address)
            .with_context(|| format!("Invalid memory address 0x{:08X}", address))?;
        Ok(self.image[offset])
    }

    /// Write a single byte.
    ///
    /// # Errors
    /// Returns an error if the address is outside the image.
    #[inline]
    pub fn write_u8(&mut self, address: u32, value: u8) -> Result<()> {
        let offset: usize = self
            .translate(address)
            .with_context(|| format!("Invalid memory address 0x{:08X}", address))?;
        self.image[offset] = value;
        Ok(())
    }

    /// Read `len` bytes starting at `address`.
    ///
    /// # Errors
    /// Returns an error if any part of the range is outside the image.
    pub fn read_bytes(&self, address: u32, len: usize) -> Result<Vec<u8>> {
        let offset: usize = self
            .translate(address)
            .with_context(|| format!("Invalid memory address 0x{:08X}", address))?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.image.len())
            .with_context(|| {
                format!("Memory read of {} bytes at 0x{:08X} out of bounds", len, address)
            })?;
        Ok(self.image[offset..end].to_vec())
    }

    /// Write `data` starting at `address`.
    ///
    /// The write is all-or-nothing: if any part of the range is outside the
    /// image, nothing is written.
    ///
    /// # Errors
    /// Returns an error if any part of the range is outside the image.
    pub fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let offset: usize = self
            .translate(address)
            .with_context(|| format!("Invalid memory address 0x{:08X}", address))?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.image.len())
            .with_context(|| {
                format!(
                    "Memory write of {} bytes at 0x{:08X} out of bounds",
                    data.len(),
                    address
                )
            })?;
        self.image[offset..end].copy_from_slice(data);
        Ok(())
    }
}
