//! Format normalization: legacy modules into provider packages.
//!
//! A legacy download is inspected before anything is written. If it already
//! starts with the archive magic number it is kept byte for byte. Otherwise
//! it must be a native library, which gets wrapped into a package together
//! with a generated manifest. When wrapping fails the untouched bytes are
//! still staged under the package name so the download is never lost; the
//! caller receives [`Conversion::Fallback`] describing what went wrong.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::suffixes;
use crate::error::{ConversionError, Result};
use crate::package::{self, PackageManifest, MANIFEST_ENTRY};
use crate::store::ArtifactStore;

/// Format a download is declared in, judged from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Already a provider package.
    Package,
    /// Bare native module that must be normalized.
    Legacy,
}

impl SourceFormat {
    /// Classify by the URL's path suffix, ignoring query and fragment.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let is_legacy = path
            .rsplit_once('.')
            .map(|(_, ext)| {
                suffixes::LEGACY
                    .iter()
                    .any(|legacy| ext.eq_ignore_ascii_case(legacy))
            })
            .unwrap_or(false);

        if is_legacy {
            SourceFormat::Legacy
        } else {
            SourceFormat::Package
        }
    }
}

/// What the normalizer did to a download.
#[derive(Debug, Clone)]
pub enum Conversion {
    /// Declared as a package; stored as-is.
    NotNeeded,
    /// Declared legacy but already an archive; stored without transcoding.
    AlreadyArchive,
    /// Wrapped into a package.
    Transcoded,
    /// Wrapping failed; the untouched bytes were kept under the package name.
    Fallback(ConversionError),
}

impl Conversion {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Conversion::Fallback(_))
    }
}

/// A staged package ready to be committed to the store.
#[derive(Debug)]
pub struct Normalized {
    pub staged: NamedTempFile,
    pub conversion: Conversion,
}

/// Converts downloads into the loadable package format.
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Stage `input` as a package in `store`.
    ///
    /// `manifest` supplies the name and version recorded when a legacy module
    /// is wrapped.
    pub fn normalize(
        &self,
        input: &Path,
        format: SourceFormat,
        manifest: &PackageManifest,
        store: &ArtifactStore,
    ) -> Result<Normalized> {
        if format == SourceFormat::Package {
            let mut staged = store.stage()?;
            std::io::copy(&mut File::open(input)?, staged.as_file_mut())?;
            return Ok(Normalized {
                staged,
                conversion: Conversion::NotNeeded,
            });
        }

        let bytes = std::fs::read(input)?;

        if package::is_archive(&bytes) {
            tracing::info!("{} is already a package, skipping conversion", input.display());
            let staged = stage_bytes(store, &bytes)?;
            return Ok(Normalized {
                staged,
                conversion: Conversion::AlreadyArchive,
            });
        }

        match transcode(&bytes, manifest, store) {
            Ok(staged) => Ok(Normalized {
                staged,
                conversion: Conversion::Transcoded,
            }),
            Err(err) => {
                tracing::warn!(
                    "Conversion of {} failed: {}; keeping the original bytes",
                    input.display(),
                    err
                );
                let staged = stage_bytes(store, &bytes).map_err(|e| ConversionError::Fallback {
                    path: fallback_target(input, manifest, store),
                    reason: format!("{} (after: {})", e, err),
                })?;
                Ok(Normalized {
                    staged,
                    conversion: Conversion::Fallback(err),
                })
            }
        }
    }
}

/// Where the untouched bytes would have been stored.
fn fallback_target(input: &Path, manifest: &PackageManifest, store: &ArtifactStore) -> PathBuf {
    let name = manifest.name.clone().unwrap_or_else(|| {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    store.path_for(&ArtifactStore::final_name(&name))
}

fn stage_bytes(store: &ArtifactStore, bytes: &[u8]) -> Result<NamedTempFile> {
    let mut staged = store.stage()?;
    staged.write_all(bytes)?;
    staged.flush()?;
    Ok(staged)
}

/// Wrap a native library into a freshly staged package.
fn transcode(
    bytes: &[u8],
    manifest: &PackageManifest,
    store: &ArtifactStore,
) -> std::result::Result<NamedTempFile, ConversionError> {
    if bytes.is_empty() {
        return Err(ConversionError::Empty);
    }
    if package::native_format(bytes).is_none() {
        return Err(ConversionError::UnknownFormat {
            magic: package::magic_hex(bytes),
        });
    }

    let name = manifest.name.clone().unwrap_or_else(|| "provider".to_string());
    let entry = package::library_entry_name(&sanitize_entry(&name));
    let manifest = PackageManifest {
        name: Some(name),
        version: manifest.version.clone(),
        providers: vec![entry.clone()],
        legacy: true,
    };
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).map_err(|e| ConversionError::Write(e.to_string()))?;

    let mut staged = store
        .stage()
        .map_err(|e| ConversionError::Write(e.to_string()))?;
    let write_err = |e: &dyn std::fmt::Display| ConversionError::Write(e.to_string());

    let mut writer = ZipWriter::new(staged.as_file_mut());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file(MANIFEST_ENTRY, options)
        .map_err(|e| write_err(&e))?;
    writer.write_all(&manifest_json).map_err(|e| write_err(&e))?;
    writer
        .start_file(entry.as_str(), options)
        .map_err(|e| write_err(&e))?;
    writer.write_all(bytes).map_err(|e| write_err(&e))?;
    writer.finish().map_err(|e| write_err(&e))?;

    Ok(staged)
}

fn sanitize_entry(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Read the first bytes of a file, for format checks on stored artifacts.
pub fn read_header(path: &Path) -> std::io::Result<[u8; 2]> {
    let mut header = [0u8; 2];
    File::open(path)?.read_exact(&mut header)?;
    Ok(header)
}
