//! The host container: owns every component for one data directory.
//!
//! Lifecycle is `init`, any number of reloads and mutations, then
//! `shutdown`. Components are reachable through accessors; nothing is global.

use std::sync::Arc;

use crate::catalog::{CatalogClient, CatalogEntry};
use crate::config::HostConfig;
use crate::download::{Downloaded, Downloader};
use crate::error::Result;
use crate::loader::{ExtensionLoader, LoadedProvider, ModuleResolver, NativeResolver};
use crate::repository::RepositoryRegistry;
use crate::store::ArtifactStore;

pub struct Host {
    config: HostConfig,
    repositories: RepositoryRegistry,
    downloader: Downloader,
    loader: ExtensionLoader,
}

impl Host {
    /// Start a host that loads native provider libraries.
    pub async fn init(config: HostConfig) -> Result<Self> {
        let native: Arc<dyn ModuleResolver> = Arc::new(NativeResolver::new(&config.cache_dir));
        Self::with_resolvers(config, vec![native]).await
    }

    /// Start a host with an explicit resolver chain.
    ///
    /// Opens the store, restores repository subscriptions and performs the
    /// first load.
    pub async fn with_resolvers(
        config: HostConfig,
        resolvers: Vec<Arc<dyn ModuleResolver>>,
    ) -> Result<Self> {
        tracing::info!("Starting host in {}", config.data_dir.display());

        let store = ArtifactStore::open(&config.extensions_dir)?;
        let http = config.http_client()?;
        let repositories =
            RepositoryRegistry::load(CatalogClient::new(http.clone()), &config.repositories_file)
                .await?;
        let downloader = Downloader::new(http, store.clone(), &config.temp_dir);
        let loader = ExtensionLoader::new(store, resolvers);

        let host = Self {
            config,
            repositories,
            downloader,
            loader,
        };
        host.reload().await?;
        Ok(host)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        self.loader.store()
    }

    pub fn repositories(&self) -> &RepositoryRegistry {
        &self.repositories
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn loader(&self) -> &ExtensionLoader {
        &self.loader
    }

    pub async fn reload(&self) -> Result<Vec<LoadedProvider>> {
        self.loader.reload().await
    }

    /// Download a catalog entry and reload so it becomes invocable.
    pub async fn install(&self, entry: &CatalogEntry) -> Result<Downloaded> {
        let downloaded = self.downloader.install(entry).await?;
        self.reload().await?;
        Ok(downloaded)
    }

    /// Retry deletion of artifacts pending deletion. Returns how many remain.
    pub async fn sweep(&self) -> Result<usize> {
        let store = self.store().clone();
        tokio::task::spawn_blocking(move || store.sweep_pending())
            .await
            .map_err(|e| crate::Error::Io(std::io::Error::other(e)))
    }

    /// Persist subscriptions and release every provider.
    pub async fn shutdown(self) -> Result<()> {
        self.repositories.save().await?;
        self.loader.clear().await;
        tracing::info!("Host stopped");
        Ok(())
    }
}
