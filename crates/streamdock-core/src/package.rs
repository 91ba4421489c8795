//! Provider package format.
//!
//! A package is a ZIP archive holding one or more native libraries and an
//! optional `manifest.json`:
//!
//! ```text
//! anime.sdx
//! ├── manifest.json          {"name": "Anime", "version": "3", "providers": ["lib/libanime.so"]}
//! └── lib/libanime.so
//! ```

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_ARTIFACT_VERSION;

/// First two bytes of every ZIP archive ("PK").
pub const ARCHIVE_MAGIC: [u8; 2] = [0x50, 0x4B];

pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Directory inside a package holding native libraries.
pub const LIBRARY_DIR: &str = "lib";

/// Package manifest. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Semver string or a bare catalog integer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Entries to probe first, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    /// Set when the package was produced from a legacy module.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub legacy: bool,
}

impl PackageManifest {
    /// Declared version, falling back to the default.
    ///
    /// Catalog versions are integers; `7` reads as `7.0.0`.
    pub fn version(&self) -> semver::Version {
        self.version
            .as_deref()
            .map(str::trim)
            .and_then(|v| {
                semver::Version::parse(v)
                    .ok()
                    .or_else(|| v.parse::<u64>().ok().map(|n| semver::Version::new(n, 0, 0)))
            })
            .unwrap_or(DEFAULT_ARTIFACT_VERSION)
    }
}

/// Read the manifest of a package on disk, if it has a readable one.
pub fn read_manifest(path: &std::path::Path) -> Option<PackageManifest> {
    let file = std::fs::File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    let entry = archive.by_name(MANIFEST_ENTRY).ok()?;
    serde_json::from_reader(entry).ok()
}

/// Whether a payload starts with the archive magic number.
pub fn is_archive(header: &[u8]) -> bool {
    header.len() >= 2 && header[..2] == ARCHIVE_MAGIC
}

/// Native executable formats a legacy module may be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFormat {
    Elf,
    MachO,
    Pe,
}

/// Identify a native library by its magic bytes.
pub fn native_format(header: &[u8]) -> Option<NativeFormat> {
    match header {
        [0x7F, b'E', b'L', b'F', ..] => Some(NativeFormat::Elf),
        [0xFE, 0xED, 0xFA, 0xCE | 0xCF, ..]
        | [0xCE | 0xCF, 0xFA, 0xED, 0xFE, ..]
        | [0xCA, 0xFE, 0xBA, 0xBE, ..] => Some(NativeFormat::MachO),
        [b'M', b'Z', ..] => Some(NativeFormat::Pe),
        _ => None,
    }
}

/// Whether an archive entry is a native library for this platform.
pub fn is_platform_library(entry: &str) -> bool {
    entry
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
        .unwrap_or(false)
}

/// Entry name a legacy module is stored under when wrapped into a package.
pub fn library_entry_name(name: &str) -> String {
    format!(
        "{}/{}{}.{}",
        LIBRARY_DIR,
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_EXTENSION
    )
}

/// Hex rendering of the first bytes of a payload, for error messages.
pub(crate) fn magic_hex(header: &[u8]) -> String {
    header
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
