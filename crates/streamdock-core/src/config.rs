//! Host configuration and shared defaults.
//!
//! Defaults live in constant modules so every component agrees on file
//! suffixes and locations. [`HostConfig`] layers an optional TOML file and
//! environment variables over those defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Artifact file suffixes (without the leading dot).
pub mod suffixes {
    /// Installed, loadable provider package (ZIP archive).
    pub const PACKAGE: &str = "sdx";
    /// Bare native modules accepted as download sources only.
    pub const LEGACY: [&str; 2] = ["sdm", "sdlib"];
    /// Package being written.
    pub const PARTIAL: &str = "part";
    /// Package that could not be deleted yet.
    pub const PENDING_DELETION: &str = "del";
}

/// File and directory names under the data directory.
pub mod files {
    pub const CONFIG: &str = "streamdock.toml";
    pub const REPOSITORIES: &str = "repositories.json";
    pub const EXTENSIONS_DIR: &str = "extensions";
    pub const CACHE_DIR: &str = "cache";
    pub const DATA_DIR_NAME: &str = "StreamDock";
}

/// Repository references.
pub mod repositories {
    /// Custom scheme accepted for repository links; rewritten to https.
    pub const REPO_SCHEME: &str = "streamdockrepo://";

    /// Well-known manifest aliases.
    pub const SHORTCODES: &[(&str, &str)] = &[
        (
            "cs-main",
            "https://codeberg.org/cloudstream/cloudstream-extensions/raw/branch/builds/repo.json",
        ),
        (
            "cs-english",
            "https://codeberg.org/cloudstream/cloudstream-extensions-multilingual/raw/branch/builds/repo.json",
        ),
        (
            "cs-hexated",
            "https://codeberg.org/Hexated/cloudstream-extensions-hexated/raw/branch/builds/repo.json",
        ),
        (
            "megarepo",
            "https://raw.githubusercontent.com/self-similarity/MegaRepo/builds/repo.json",
        ),
    ];
}

/// Default user agent for catalog and download requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Version assumed for artifacts that do not declare one.
pub const DEFAULT_ARTIFACT_VERSION: semver::Version = semver::Version::new(1, 0, 0);

/// Environment variable names
pub mod env_vars {
    pub const HOME: &str = "STREAMDOCK_HOME";
    pub const USER_AGENT: &str = "STREAMDOCK_USER_AGENT";
    pub const CONNECT_TIMEOUT_SECS: &str = "STREAMDOCK_CONNECT_TIMEOUT_SECS";
    pub const LOG_JSON: &str = "STREAMDOCK_LOG_JSON";

    /// Data directory override, if set and non-empty.
    pub fn home() -> Option<std::path::PathBuf> {
        std::env::var_os(HOME)
            .filter(|v| !v.is_empty())
            .map(std::path::PathBuf::from)
    }

    pub fn user_agent() -> Option<String> {
        std::env::var(USER_AGENT).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn connect_timeout_secs() -> Option<u64> {
        std::env::var(CONNECT_TIMEOUT_SECS)
            .ok()
            .and_then(|s| s.parse().ok())
    }

    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

/// Resolved locations and network settings for a host instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    pub extensions_dir: PathBuf,
    /// Native libraries extracted from packages.
    pub cache_dir: PathBuf,
    /// In-flight downloads.
    pub temp_dir: PathBuf,
    pub repositories_file: PathBuf,
    pub user_agent: String,
    /// No timeout is applied when `None`.
    pub connect_timeout_secs: Option<u64>,
}

/// On-disk form of [`HostConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    extensions_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    repositories_file: Option<PathBuf>,
    user_agent: Option<String>,
    connect_timeout_secs: Option<u64>,
}

impl HostConfig {
    /// Lay out every location under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            extensions_dir: data_dir.join(files::EXTENSIONS_DIR),
            cache_dir: data_dir.join(files::CACHE_DIR),
            temp_dir: std::env::temp_dir(),
            repositories_file: data_dir.join(files::REPOSITORIES),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: None,
            data_dir,
        }
    }

    /// Platform data directory (`$STREAMDOCK_HOME`, else `<data dir>/StreamDock`).
    pub fn default_data_dir() -> PathBuf {
        env_vars::home().unwrap_or_else(|| {
            dirs::data_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(files::DATA_DIR_NAME)
        })
    }

    /// Defaults, then `config_path` (or `<data dir>/streamdock.toml` when it
    /// exists), then environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::with_data_dir(Self::default_data_dir());

        let path = match config_path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = config.data_dir.join(files::CONFIG);
                candidate.exists().then_some(candidate)
            }
        };

        if let Some(path) = path {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            config = config.merge_toml(&content)?;
            tracing::debug!("Loaded configuration from {}", path.display());
        }

        Ok(config.apply_env())
    }

    /// Overlay the fields present in a TOML document.
    pub fn merge_toml(self, content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        // A new data_dir relocates every derived path not set explicitly.
        let mut config = match file.data_dir {
            Some(dir) => Self {
                user_agent: self.user_agent,
                connect_timeout_secs: self.connect_timeout_secs,
                temp_dir: self.temp_dir,
                ..Self::with_data_dir(dir)
            },
            None => self,
        };

        if let Some(dir) = file.extensions_dir {
            config.extensions_dir = dir;
        }
        if let Some(dir) = file.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(dir) = file.temp_dir {
            config.temp_dir = dir;
        }
        if let Some(path) = file.repositories_file {
            config.repositories_file = path;
        }
        if let Some(agent) = file.user_agent {
            config.user_agent = agent;
        }
        if file.connect_timeout_secs.is_some() {
            config.connect_timeout_secs = file.connect_timeout_secs;
        }

        Ok(config)
    }

    fn apply_env(mut self) -> Self {
        if let Some(agent) = env_vars::user_agent() {
            self.user_agent = agent;
        }
        if let Some(secs) = env_vars::connect_timeout_secs() {
            self.connect_timeout_secs = Some(secs);
        }
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Build the HTTP client shared by catalog and download requests.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.clone());
        if let Some(timeout) = self.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        Ok(builder.build()?)
    }
}
