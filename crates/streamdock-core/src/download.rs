//! Downloader: fetch an artifact, normalize it and install it in the store.

use std::path::PathBuf;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::catalog::CatalogEntry;
use crate::error::{Error, Result};
use crate::normalize::{Conversion, Normalizer, SourceFormat};
use crate::package::PackageManifest;
use crate::store::{Artifact, ArtifactStore};

/// Prefix of in-flight download files.
const DOWNLOAD_PREFIX: &str = "plugin_download";

/// Result of a successful download.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub artifact: Artifact,
    pub conversion: Conversion,
    /// Hex SHA-256 of the bytes as received.
    pub sha256: String,
}

/// Downloads artifacts into an [`ArtifactStore`].
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    store: ArtifactStore,
    temp_dir: PathBuf,
    normalizer: Normalizer,
}

impl Downloader {
    pub fn new(http: reqwest::Client, store: ArtifactStore, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            store,
            temp_dir: temp_dir.into(),
            normalizer: Normalizer::new(),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Download `url` and install it as `suggested_name`.
    pub async fn download(&self, url: &str, suggested_name: &str) -> Result<Downloaded> {
        self.fetch_and_install(url, suggested_name, None).await
    }

    /// Download a catalog entry under its internal name.
    pub async fn install(&self, entry: &CatalogEntry) -> Result<Downloaded> {
        self.fetch_and_install(&entry.url, &entry.internal_name, Some(entry.version.to_string()))
            .await
    }

    async fn fetch_and_install(
        &self,
        url: &str,
        suggested_name: &str,
        version: Option<String>,
    ) -> Result<Downloaded> {
        let format = SourceFormat::from_url(url);
        let final_name = ArtifactStore::final_name(suggested_name);
        tracing::info!("Downloading {} from {}", final_name, url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(url, e))?;
        if !response.status().is_success() {
            return Err(Error::download(url, format!("status {}", response.status())));
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        // Removed on drop, whichever way this function exits.
        let temp = tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .tempfile_in(&self.temp_dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::download(url, e))?;
            hasher.update(&chunk);
            received += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if received == 0 {
            return Err(Error::download(url, "empty body"));
        }
        let sha256 = format!("{:x}", hasher.finalize());
        tracing::debug!("Received {} bytes from {} (sha256 {})", received, url, sha256);

        let manifest = PackageManifest {
            name: Some(Artifact::from_path(&final_name).name().to_string()),
            version,
            ..Default::default()
        };
        let normalizer = self.normalizer.clone();
        let store = self.store.clone();

        let (artifact, conversion) = tokio::task::spawn_blocking(move || {
            let normalized = normalizer.normalize(temp.path(), format, &manifest, &store)?;
            drop(temp);
            let artifact = store.commit(normalized.staged, &final_name)?;
            Ok::<_, Error>((artifact, normalized.conversion))
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        if let Conversion::Fallback(reason) = &conversion {
            tracing::warn!("{} stored unconverted: {}", artifact.name(), reason);
        }

        Ok(Downloaded {
            artifact,
            conversion,
            sha256,
        })
    }
}
