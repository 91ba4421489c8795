//! Repository registry: subscribed catalogs and their persisted list.
//!
//! Subscriptions are the identity of the registry: a list of resolved manifest
//! URLs, persisted as a JSON array and overwritten wholesale on every change.
//! Manifest metadata is never persisted; it is re-fetched on load. A
//! subscription whose manifest cannot be fetched stays subscribed (and is
//! retried by [`RepositoryRegistry::refresh`] or the next load) but is not
//! listed.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::catalog::{CatalogClient, CatalogEntry, Repository};
use crate::config::repositories::{REPO_SCHEME, SHORTCODES};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct State {
    /// Persisted order.
    subscriptions: Vec<String>,
    resolved: HashMap<String, Repository>,
}

impl State {
    fn is_subscribed(&self, url: &str) -> bool {
        self.subscriptions.iter().any(|s| s == url)
    }
}

/// In-memory set of subscribed repositories backed by a JSON file.
pub struct RepositoryRegistry {
    client: CatalogClient,
    file: PathBuf,
    state: RwLock<State>,
    save_lock: Mutex<()>,
}

impl RepositoryRegistry {
    /// Read the persisted subscriptions and resolve every manifest
    /// concurrently. A missing file is an empty registry.
    pub async fn load(client: CatalogClient, subscriptions_file: impl Into<PathBuf>) -> Result<Self> {
        let file = subscriptions_file.into();
        let subscriptions = read_subscriptions(&file).await?;

        let registry = Self {
            client,
            file,
            state: RwLock::new(State {
                subscriptions,
                resolved: HashMap::new(),
            }),
            save_lock: Mutex::new(()),
        };
        let resolved = registry.refresh().await;
        tracing::info!(
            "Loaded {} of {} subscribed repositories",
            resolved,
            registry.subscriptions().len()
        );
        Ok(registry)
    }

    /// Map a shortcode or custom-scheme link to a manifest URL.
    ///
    /// Unknown tokens are returned trimmed and otherwise unchanged.
    pub fn resolve_shortcode(token: &str) -> String {
        let token = token.trim();
        if let Some((_, url)) = SHORTCODES.iter().find(|(code, _)| *code == token) {
            return (*url).to_string();
        }
        match token.strip_prefix(REPO_SCHEME) {
            Some(rest) => format!("https://{}", rest),
            None => token.to_string(),
        }
    }

    /// Subscribe to a repository by URL or shortcode.
    ///
    /// Subscribing twice is a no-op; the existing repository is returned
    /// without a network request.
    pub async fn add(&self, url_or_shortcode: &str) -> Result<Repository> {
        let url = Self::resolve_shortcode(url_or_shortcode);
        if !url.starts_with("http") {
            return Err(Error::InvalidReference(url_or_shortcode.trim().to_string()));
        }

        if let Some(existing) = self.state.read().resolved.get(&url) {
            tracing::debug!("Repository {} already subscribed", url);
            return Ok(existing.clone());
        }

        let repository = self.client.fetch_repository(&url).await?;

        let appended = {
            let mut state = self.state.write();
            state.resolved.insert(url.clone(), repository.clone());
            if state.is_subscribed(&url) {
                false
            } else {
                state.subscriptions.push(url.clone());
                true
            }
        };

        if appended {
            // Nothing is subscribed that is not also on disk.
            if let Err(e) = self.save().await {
                let mut state = self.state.write();
                state.subscriptions.retain(|s| *s != url);
                state.resolved.remove(&url);
                return Err(e);
            }
            tracing::info!("Added repository {} ({})", repository.name, url);
        }
        Ok(repository)
    }

    /// Unsubscribe. Returns whether the repository was subscribed.
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let url = Self::resolve_shortcode(url);
        let removed = {
            let mut state = self.state.write();
            state.resolved.remove(&url);
            let before = state.subscriptions.len();
            state.subscriptions.retain(|s| *s != url);
            state.subscriptions.len() != before
        };

        if removed {
            self.save().await?;
            tracing::info!("Removed repository {}", url);
        }
        Ok(removed)
    }

    /// Resolved repositories in subscription order.
    pub fn list(&self) -> Vec<Repository> {
        let state = self.state.read();
        state
            .subscriptions
            .iter()
            .filter_map(|url| state.resolved.get(url).cloned())
            .collect()
    }

    /// Every subscribed URL, resolved or not.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.read().subscriptions.clone()
    }

    pub fn get(&self, url: &str) -> Option<Repository> {
        self.state.read().resolved.get(&Self::resolve_shortcode(url)).cloned()
    }

    /// Persist the subscription list (write to a temp file, then replace).
    pub async fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let json = serde_json::to_vec_pretty(&self.subscriptions())?;
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || write_replace(&file, &json))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Re-fetch manifests of subscriptions that are not resolved.
    ///
    /// Returns how many were newly resolved. Failures are logged and kept
    /// subscribed.
    pub async fn refresh(&self) -> usize {
        let pending: Vec<String> = {
            let state = self.state.read();
            state
                .subscriptions
                .iter()
                .filter(|url| !state.resolved.contains_key(*url))
                .cloned()
                .collect()
        };

        let fetches = pending.iter().map(|url| self.client.fetch_repository(url));
        let results = join_all(fetches).await;

        let mut state = self.state.write();
        let mut resolved = 0;
        for (url, result) in pending.into_iter().zip(results) {
            match result {
                // Removed while the fetch was in flight.
                Ok(_) if !state.is_subscribed(&url) => {}
                Ok(repository) => {
                    state.resolved.insert(url, repository);
                    resolved += 1;
                }
                Err(e) => tracing::warn!("Failed to resolve repository {}: {}", url, e),
            }
        }
        resolved
    }

    /// Plugin list of a subscribed, resolved repository.
    pub async fn plugins(&self, url: &str) -> Result<Vec<CatalogEntry>> {
        let repository = self
            .get(url)
            .ok_or_else(|| Error::NotFound(format!("repository {}", url.trim())))?;
        self.client.fetch_plugin_list(&repository).await
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }
}

async fn read_subscriptions(file: &Path) -> Result<Vec<String>> {
    let content = match tokio::fs::read(file).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let urls: Vec<String> = match serde_json::from_slice(&content) {
        Ok(urls) => urls,
        Err(e) => {
            let backup = backup_path(file);
            tracing::warn!(
                "Ignoring unreadable subscription list {}: {}; moved to {}",
                file.display(),
                e,
                backup.display()
            );
            if let Err(e) = tokio::fs::rename(file, &backup).await {
                tracing::warn!("Could not move {} aside: {}", file.display(), e);
            }
            return Ok(Vec::new());
        }
    };
    let mut subscriptions: Vec<String> = Vec::with_capacity(urls.len());
    for url in urls {
        if !subscriptions.contains(&url) {
            subscriptions.push(url);
        }
    }
    Ok(subscriptions)
}

fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn write_replace(file: &Path, content: &[u8]) -> Result<()> {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.flush()?;
    temp.persist(file).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_shortcode() {
        assert_eq!(
            RepositoryRegistry::resolve_shortcode(" megarepo "),
            "https://raw.githubusercontent.com/self-similarity/MegaRepo/builds/repo.json"
        );
        assert_eq!(
            RepositoryRegistry::resolve_shortcode("streamdockrepo://host/repo.json"),
            "https://host/repo.json"
        );
        assert_eq!(
            RepositoryRegistry::resolve_shortcode("https://host/repo.json"),
            "https://host/repo.json"
        );
        assert_eq!(RepositoryRegistry::resolve_shortcode("unknown"), "unknown");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_registry() {
        let tmp = TempDir::new().unwrap();
        let registry = RepositoryRegistry::load(
            CatalogClient::new(reqwest::Client::new()),
            tmp.path().join("repositories.json"),
        )
        .await
        .unwrap();
        assert!(registry.list().is_empty());
        assert!(registry.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty_and_is_kept_aside() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("repositories.json");

        for content in ["", "[\"https://host/a.json\"", "{\"not\":\"a list\"}"] {
            std::fs::write(&file, content).unwrap();
            let registry =
                RepositoryRegistry::load(CatalogClient::new(reqwest::Client::new()), &file)
                    .await
                    .unwrap();
            assert!(registry.subscriptions().is_empty());
            assert!(!file.exists());
            assert_eq!(
                std::fs::read_to_string(tmp.path().join("repositories.json.bak")).unwrap(),
                content
            );

            registry.save().await.unwrap();
            assert_eq!(std::fs::read_to_string(&file).unwrap(), "[]");
        }
    }

    #[tokio::test]
    async fn test_invalid_reference_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = RepositoryRegistry::load(
            CatalogClient::new(reqwest::Client::new()),
            tmp.path().join("repositories.json"),
        )
        .await
        .unwrap();

        let err = registry.add("not-a-shortcode").await.unwrap_err();
        assert!(matches!(err, Error::InvalidReference(ref r) if r == "not-a-shortcode"));
        assert!(!tmp.path().join("repositories.json").exists());
    }

    #[test]
    fn test_write_replace_overwrites() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("nested").join("repositories.json");
        write_replace(&file, b"[\"a\"]").unwrap();
        write_replace(&file, b"[\"b\"]").unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"[\"b\"]");
        assert_eq!(std::fs::read_dir(file.parent().unwrap()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_entries_in_file_collapse() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("repositories.json");
        std::fs::write(&file, r#"["http://127.0.0.1:9/a.json","http://127.0.0.1:9/a.json"]"#)
            .unwrap();
        let subscriptions = read_subscriptions(&file).await.unwrap();
        assert_eq!(subscriptions, vec!["http://127.0.0.1:9/a.json".to_string()]);
    }
}
