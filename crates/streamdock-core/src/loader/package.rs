//! Reading installed provider packages.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use zip::ZipArchive;

use crate::error::LoadError;
use crate::package::{PackageManifest, MANIFEST_ENTRY};

/// An opened package archive.
pub struct PackageReader {
    archive: ZipArchive<File>,
    manifest: PackageManifest,
}

impl PackageReader {
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|e| LoadError::Open(e.to_string()))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| LoadError::InvalidPackage(e.to_string()))?;

        let manifest = match archive.by_name(MANIFEST_ENTRY) {
            Ok(entry) => serde_json::from_reader(entry).map_err(|e| {
                LoadError::InvalidPackage(format!("{}: {}", MANIFEST_ENTRY, e))
            })?,
            Err(zip::result::ZipError::FileNotFound) => PackageManifest::default(),
            Err(e) => return Err(LoadError::InvalidPackage(e.to_string())),
        };

        Ok(Self { archive, manifest })
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Entries to probe for a provider, in probing order.
    ///
    /// The manifest's `providers` list when it has one, otherwise every file
    /// entry in archive order (the manifest itself excluded).
    pub fn candidates(&mut self) -> Vec<String> {
        if !self.manifest.providers.is_empty() {
            return self.manifest.providers.clone();
        }

        (0..self.archive.len())
            .filter_map(|i| {
                let entry = self.archive.by_index_raw(i).ok()?;
                (!entry.is_dir() && entry.name() != MANIFEST_ENTRY).then(|| entry.name().to_string())
            })
            .collect()
    }

    /// Read an entry fully into memory.
    pub fn read(&mut self, entry: &str) -> Result<Vec<u8>, LoadError> {
        let mut file = self
            .archive
            .by_name(entry)
            .map_err(|e| LoadError::InvalidPackage(format!("{}: {}", entry, e)))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|e| LoadError::InvalidPackage(format!("{}: {}", entry, e)))?;
        Ok(bytes)
    }
}
