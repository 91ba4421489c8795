//! Error taxonomy for the extension lifecycle engine.

use std::path::PathBuf;

/// Errors surfaced by single-item operations.
///
/// Batch operations (reload, fan-out, startup repository resolution) never
/// return these for an individual item; they log and skip instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A catalog request (manifest or plugin list) failed.
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// An artifact download failed.
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// Normalization failed and the untouched bytes could not be kept either.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A repository reference is neither a known shortcode nor an HTTP URL.
    #[error("Invalid URL or unknown shortcode: {0}")]
    InvalidReference(String),

    /// A module could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to turn a legacy module into a provider package.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    #[error("Unrecognized legacy module format (magic {magic})")]
    UnknownFormat { magic: String },

    #[error("Legacy module is empty")]
    Empty,

    #[error("Failed to write package: {0}")]
    Write(String),

    #[error("Failed to store untouched download as {path:?}: {reason}")]
    Fallback { path: PathBuf, reason: String },
}

/// Why an artifact ended up without a provider handle.
///
/// Recorded on the registry entry; never raised by `reload`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to open artifact: {0}")]
    Open(String),

    #[error("Not a provider package: {0}")]
    InvalidPackage(String),

    #[error("No provider implementation found")]
    NoProvider,

    #[error("Incompatible ABI: expected {expected}, got {got}")]
    IncompatibleAbi { expected: u32, got: u32 },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Failed to load library: {0}")]
    Library(String),

    #[error("Provider constructor returned null")]
    NullInstance,

    #[error("Provider constructor panicked")]
    Panicked,
}
