//! Extension loader: turns installed packages into a provider registry.
//!
//! Every reload rebuilds the registry from scratch. Each artifact in the
//! store yields exactly one [`LoadedProvider`] entry, whether or not a
//! provider could be instantiated from it, so a broken package is visible in
//! listings without affecting the others. The new registry replaces the old
//! one under a single write lock.
//!
//! Locating a provider inside a package is delegated to [`ModuleResolver`]s:
//! [`NativeResolver`] loads shared libraries, [`InProcessResolver`] serves
//! providers linked into the host.

mod in_process;
mod native;
mod package;

pub use in_process::InProcessResolver;
pub use native::NativeResolver;
pub use package::PackageReader;

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use streamdock_provider_sdk::Provider;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Error, LoadError, Result};
use crate::store::{Artifact, ArtifactState, ArtifactStore};

/// Shared handle to an instantiated provider.
pub type ProviderHandle = Arc<dyn Provider>;

/// A candidate entry inside a package, offered to resolvers.
pub struct Candidate<'a> {
    artifact: &'a Artifact,
    entry: &'a str,
    package: &'a mut PackageReader,
}

impl<'a> Candidate<'a> {
    pub fn artifact(&self) -> &Artifact {
        self.artifact
    }

    /// Entry name inside the package.
    pub fn entry(&self) -> &str {
        self.entry
    }

    pub fn read(&mut self) -> std::result::Result<Vec<u8>, LoadError> {
        self.package.read(self.entry)
    }
}

/// Decides whether a package entry is a provider and instantiates it.
pub trait ModuleResolver: Send + Sync {
    /// `Ok(None)` means the entry is not a provider this resolver knows.
    /// Errors are candidate-level and do not stop the scan.
    fn resolve(
        &self,
        candidate: &mut Candidate<'_>,
    ) -> std::result::Result<Option<ProviderHandle>, LoadError>;

    /// Release any per-artifact state (extracted files). Called on uninstall.
    fn forget(&self, _artifact: &Artifact) {}
}

/// Outcome of loading one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// The package opened but no entry qualified.
    NoProvider,
    Failed(LoadError),
}

/// One registry entry per installed artifact.
#[derive(Clone)]
pub struct LoadedProvider {
    pub name: String,
    pub version: semver::Version,
    pub artifact: Artifact,
    pub status: LoadStatus,
    pub handle: Option<ProviderHandle>,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedProvider {
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    fn failed(artifact: Artifact, error: LoadError) -> Self {
        Self {
            name: artifact.name().to_string(),
            version: crate::config::DEFAULT_ARTIFACT_VERSION,
            artifact,
            status: LoadStatus::Failed(error),
            handle: None,
            loaded_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for LoadedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProvider")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("artifact", &self.artifact)
            .field("status", &self.status)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Result of [`ExtensionLoader::uninstall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Deleted,
    /// The file was renamed aside and will be removed by a later sweep.
    PendingDeletion,
}

/// Loads the store's packages and owns the resulting registry.
pub struct ExtensionLoader {
    store: ArtifactStore,
    resolvers: Arc<Vec<Arc<dyn ModuleResolver>>>,
    registry: RwLock<Arc<Vec<LoadedProvider>>>,
    /// Serializes reload and uninstall.
    lifecycle: Mutex<()>,
}

impl ExtensionLoader {
    pub fn new(store: ArtifactStore, resolvers: Vec<Arc<dyn ModuleResolver>>) -> Self {
        Self {
            store,
            resolvers: Arc::new(resolvers),
            registry: RwLock::new(Arc::new(Vec::new())),
            lifecycle: Mutex::new(()),
        }
    }

    /// Loader with only the native resolver, extracting into `cache_dir`.
    pub fn native(store: ArtifactStore, cache_dir: impl Into<std::path::PathBuf>) -> Self {
        Self::new(store, vec![Arc::new(NativeResolver::new(cache_dir))])
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Rebuild the registry from the store.
    pub async fn reload(&self) -> Result<Vec<LoadedProvider>> {
        let _lifecycle = self.lifecycle.lock().await;

        let store = self.store.clone();
        let artifacts = tokio::task::spawn_blocking(move || {
            let remaining = store.sweep_pending();
            if remaining > 0 {
                tracing::debug!("{} artifacts still pending deletion", remaining);
            }
            store.list()
        })
        .await
        .map_err(join_error)??;

        let tasks = artifacts.into_iter().map(|artifact| {
            let resolvers = Arc::clone(&self.resolvers);
            let fallback = artifact.clone();
            async move {
                tokio::task::spawn_blocking(move || load_artifact(artifact, &resolvers))
                    .await
                    .unwrap_or_else(|_| LoadedProvider::failed(fallback, LoadError::Panicked))
            }
        });
        let loaded: Vec<LoadedProvider> = join_all(tasks).await;

        let ok = loaded.iter().filter(|p| p.is_loaded()).count();
        tracing::info!("Loaded {} of {} extensions", ok, loaded.len());

        *self.registry.write().await = Arc::new(loaded.clone());
        Ok(loaded)
    }

    /// Remove an artifact by provider name, artifact name or path.
    pub async fn uninstall(&self, name_or_path: &str) -> Result<UninstallOutcome> {
        let _lifecycle = self.lifecycle.lock().await;

        let removed = {
            let mut registry = self.registry.write().await;
            match registry.iter().position(|p| matches_reference(p, name_or_path)) {
                Some(index) => {
                    let mut entries: Vec<LoadedProvider> = registry.iter().cloned().collect();
                    let entry = entries.remove(index);
                    *registry = Arc::new(entries);
                    Some(entry)
                }
                None => None,
            }
        };

        let artifact = match removed {
            Some(entry) => entry.artifact,
            None => self
                .store
                .list()?
                .into_iter()
                .find(|a| a.name() == name_or_path || a.path() == Path::new(name_or_path))
                .ok_or_else(|| Error::NotFound(format!("extension {}", name_or_path)))?,
        };

        let store = self.store.clone();
        let resolvers = Arc::clone(&self.resolvers);
        let state = tokio::task::spawn_blocking(move || {
            let state = store.retire(&artifact);
            for resolver in resolvers.iter() {
                resolver.forget(&artifact);
            }
            tracing::info!("Uninstalled {} ({:?})", artifact.name(), state);
            state
        })
        .await
        .map_err(join_error)?;

        Ok(match state {
            ArtifactState::PendingDeletion => UninstallOutcome::PendingDeletion,
            ArtifactState::Active | ArtifactState::Deleted => UninstallOutcome::Deleted,
        })
    }

    /// Registry snapshot in load order.
    pub async fn list(&self) -> Vec<LoadedProvider> {
        self.snapshot().await.iter().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<LoadedProvider> {
        self.snapshot()
            .await
            .iter()
            .find(|p| matches_reference(p, name))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub(crate) async fn snapshot(&self) -> Arc<Vec<LoadedProvider>> {
        Arc::clone(&*self.registry.read().await)
    }

    /// Drop every provider handle.
    pub async fn clear(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        *self.registry.write().await = Arc::new(Vec::new());
    }
}

fn matches_reference(provider: &LoadedProvider, reference: &str) -> bool {
    provider.name == reference
        || provider.artifact.name() == reference
        || provider.artifact.path() == Path::new(reference)
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}

/// Open one artifact and instantiate the first qualifying candidate.
fn load_artifact(artifact: Artifact, resolvers: &[Arc<dyn ModuleResolver>]) -> LoadedProvider {
    let mut package = match PackageReader::open(artifact.path()) {
        Ok(package) => package,
        Err(e) => {
            tracing::warn!("Failed to load {}: {}", artifact.path().display(), e);
            return LoadedProvider::failed(artifact, e);
        }
    };

    let manifest = package.manifest().clone();
    let version = manifest.version();
    let mut first_error: Option<LoadError> = None;
    let mut handle: Option<ProviderHandle> = None;

    'candidates: for entry in package.candidates() {
        for resolver in resolvers {
            let mut candidate = Candidate {
                artifact: &artifact,
                entry: &entry,
                package: &mut package,
            };
            let resolved = std::panic::catch_unwind(AssertUnwindSafe(|| {
                resolver.resolve(&mut candidate)
            }))
            .unwrap_or(Err(LoadError::Panicked));

            match resolved {
                Ok(Some(provider)) => {
                    tracing::debug!("{}: provider found in {}", artifact.name(), entry);
                    handle = Some(provider);
                    break 'candidates;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("{}: skipping {}: {}", artifact.name(), entry, e);
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    let (name, status) = match &handle {
        Some(provider) => (provider.name().to_string(), LoadStatus::Loaded),
        None => {
            let name = manifest
                .name
                .clone()
                .unwrap_or_else(|| artifact.name().to_string());
            let status = match first_error {
                Some(e) => LoadStatus::Failed(e),
                None => LoadStatus::NoProvider,
            };
            tracing::warn!("{}: no provider loaded ({:?})", artifact.name(), status);
            (name, status)
        }
    };

    LoadedProvider {
        name,
        version,
        artifact,
        status,
        handle,
        loaded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use streamdock_provider_sdk::{ProviderResult, SearchResult};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    struct Named(&'static str);

    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn search(&self, _query: &str) -> ProviderResult<Vec<SearchResult>> {
            Ok(Vec::new())
        }
    }

    fn package(store: &ArtifactStore, name: &str, entries: &[(&str, &[u8])]) {
        let mut bytes = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut bytes);
            for (entry, content) in entries {
                writer.start_file(*entry, SimpleFileOptions::default()).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        store.install(name, &bytes.into_inner()).unwrap();
    }

    fn loader(tmp: &TempDir) -> (ExtensionLoader, Arc<InProcessResolver>) {
        let store = ArtifactStore::open(tmp.path().join("extensions")).unwrap();
        let resolver = Arc::new(InProcessResolver::new());
        resolver.register("alpha", || Arc::new(Named("Alpha")) as ProviderHandle);
        resolver.register("panics", || panic!("constructor failure"));
        let loader = ExtensionLoader::new(store, vec![resolver.clone() as Arc<dyn ModuleResolver>]);
        (loader, resolver)
    }

    #[tokio::test]
    async fn test_each_artifact_yields_one_entry() {
        let tmp = TempDir::new().unwrap();
        let (loader, _) = loader(&tmp);
        package(loader.store(), "a.sdx", &[("alpha", b"")]);
        package(loader.store(), "b.sdx", &[("unrelated", b"")]);
        std::fs::write(loader.store().path_for("c.sdx"), b"corrupt").unwrap();

        let loaded = loader.reload().await.unwrap();
        assert_eq!(loaded.len(), 3);

        assert_eq!(loaded[0].name, "Alpha");
        assert_eq!(loaded[0].status, LoadStatus::Loaded);
        assert_eq!(loaded[1].name, "b");
        assert_eq!(loaded[1].status, LoadStatus::NoProvider);
        assert!(matches!(loaded[2].status, LoadStatus::Failed(LoadError::InvalidPackage(_))));
        assert_eq!(loaded.iter().filter(|p| p.is_loaded()).count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_constructor_is_contained() {
        let tmp = TempDir::new().unwrap();
        let (loader, _) = loader(&tmp);
        package(loader.store(), "a.sdx", &[("panics", b""), ("alpha", b"")]);

        let loaded = loader.reload().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Alpha");
    }

    #[tokio::test]
    async fn test_manifest_name_and_version() {
        let tmp = TempDir::new().unwrap();
        let (loader, _) = loader(&tmp);
        package(
            loader.store(),
            "a.sdx",
            &[(crate::package::MANIFEST_ENTRY, br#"{"name":"Manifest Name","version":"9"}"#)],
        );

        let loaded = loader.reload().await.unwrap();
        assert_eq!(loaded[0].name, "Manifest Name");
        assert_eq!(loaded[0].version, semver::Version::new(9, 0, 0));
        assert_eq!(loaded[0].status, LoadStatus::NoProvider);
    }

    #[tokio::test]
    async fn test_uninstall_removes_entry_and_file() {
        let tmp = TempDir::new().unwrap();
        let (loader, _) = loader(&tmp);
        package(loader.store(), "a.sdx", &[("alpha", b"")]);
        loader.reload().await.unwrap();

        let outcome = loader.uninstall("Alpha").await.unwrap();
        assert_eq!(outcome, UninstallOutcome::Deleted);
        assert_eq!(loader.len().await, 0);
        assert!(loader.store().list().unwrap().is_empty());

        let err = loader.uninstall("Alpha").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_uninstall_unloaded_artifact_by_name() {
        let tmp = TempDir::new().unwrap();
        let (loader, _) = loader(&tmp);
        package(loader.store(), "a.sdx", &[("alpha", b"")]);

        assert_eq!(loader.uninstall("a").await.unwrap(), UninstallOutcome::Deleted);
        assert!(loader.store().list().unwrap().is_empty());
    }
}
