//! Package Archive Access
//!
//! Mods ship as archive packages containing the platform binary plus any
//! resources. The lifecycle only needs two operations from a package: check
//! that the named binary entry exists, and extract everything into the mod's
//! runtime directory. Those two operations are the [`PackageArchive`] trait;
//! [`ZipPackageSource`] is the production implementation over `zip`.

use std::fs::File;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{ModError, ModResult};

/// An opened mod package.
pub trait PackageArchive {
    /// Whether the archive contains an entry with this exact name.
    fn has_entry(&self, name: &str) -> bool;

    /// Extract every entry into `dir`.
    fn extract_all_to(&mut self, dir: &Path) -> ModResult<()>;
}

/// Opens package files from disk.
///
/// A seam for tests and alternative package formats; the registry holds one
/// source and opens every mod package through it.
pub trait PackageSource {
    /// Open the package at `path`.
    fn open(&self, path: &Path) -> ModResult<Box<dyn PackageArchive>>;
}

/// Zip-backed package source.
#[derive(Debug, Default)]
pub struct ZipPackageSource;

impl PackageSource for ZipPackageSource {
    fn open(&self, path: &Path) -> ModResult<Box<dyn PackageArchive>> {
        let file = File::open(path).map_err(|e| {
            ModError::extraction(format!("unable to open package {:?}: {}", path, e))
        })?;
        let archive = ZipArchive::new(file).map_err(|e| {
            ModError::extraction(format!("unable to read package {:?}: {}", path, e))
        })?;
        Ok(Box::new(ZipPackage { archive }))
    }
}

struct ZipPackage {
    archive: ZipArchive<File>,
}

impl PackageArchive for ZipPackage {
    fn has_entry(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    fn extract_all_to(&mut self, dir: &Path) -> ModResult<()> {
        self.archive
            .extract(dir)
            .map_err(|e| ModError::extraction(format!("unable to extract package: {}", e)))
    }
}
