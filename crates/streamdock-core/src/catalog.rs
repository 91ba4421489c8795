//! Catalog client: repository manifests and their plugin lists.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default plugin list file next to a manifest.
const DEFAULT_PLUGIN_LIST: &str = "plugins.json";

/// A remote repository manifest.
///
/// `url` is the address the manifest was requested from and is never read
/// from the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manifest_version: Option<i32>,
    #[serde(default)]
    pub plugin_url: Option<String>,
    #[serde(default)]
    pub plugin_lists: Option<Vec<String>>,
    #[serde(skip)]
    pub url: String,
}

impl Repository {
    /// The pointer to the plugin list as declared in the manifest.
    pub fn plugin_list_pointer(&self) -> Option<&str> {
        self.plugin_url.as_deref().or_else(|| {
            self.plugin_lists
                .as_ref()
                .and_then(|lists| lists.first())
                .map(String::as_str)
        })
    }

    /// Absolute URL of the plugin list.
    ///
    /// Relative pointers and the default file resolve against the directory
    /// of the manifest URL.
    pub fn plugin_list_url(&self) -> String {
        match self.plugin_list_pointer() {
            Some(pointer) if pointer.starts_with("http") => pointer.to_string(),
            Some(pointer) => format!("{}/{}", dirname(&self.url), pointer),
            None => format!("{}/{}", dirname(&self.url), DEFAULT_PLUGIN_LIST),
        }
    }
}

fn dirname(url: &str) -> &str {
    url.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(url)
}

/// One downloadable provider as listed in a plugin list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub internal_name: String,
    pub version: i32,
    pub url: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tv_types: Option<Vec<String>>,
}

/// Alias kept for the catalog wire name.
pub type SitePlugin = CatalogEntry;

/// Fetches catalogs over HTTP.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
}

impl CatalogClient {
    /// Wrap a client built by [`crate::HostConfig::http_client`], which
    /// carries the configured user agent.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch and parse a repository manifest.
    pub async fn fetch_repository(&self, url: &str) -> Result<Repository> {
        let body = self.get_text(url).await?;
        if body.trim().is_empty() {
            return Err(Error::fetch(url, "empty manifest"));
        }

        let mut repository: Repository = serde_json::from_str(&body)
            .map_err(|e| Error::fetch(url, format!("invalid manifest: {}", e)))?;
        repository.url = url.to_string();
        Ok(repository)
    }

    /// Fetch the plugin list a repository points at.
    ///
    /// An empty body is an empty list.
    pub async fn fetch_plugin_list(&self, repository: &Repository) -> Result<Vec<CatalogEntry>> {
        let url = repository.plugin_list_url();
        let body = self.get_text(&url).await?;
        if body.trim().is_empty() {
            tracing::debug!("Plugin list {} is empty", url);
            return Ok(Vec::new());
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::fetch(url, format!("invalid plugin list: {}", e)))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(Error::fetch(url, format!("status {}", response.status())));
        }

        response.text().await.map_err(|e| Error::fetch(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(url: &str, plugin_url: Option<&str>, lists: Option<Vec<&str>>) -> Repository {
        Repository {
            name: "Test".to_string(),
            description: None,
            manifest_version: Some(1),
            plugin_url: plugin_url.map(str::to_string),
            plugin_lists: lists.map(|l| l.into_iter().map(str::to_string).collect()),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_relative_pointer_resolves_against_manifest_dir() {
        let r = repo("https://host/repo/manifest.json", Some("plugins.json"), None);
        assert_eq!(r.plugin_list_url(), "https://host/repo/plugins.json");

        let r = repo("https://host/repo/manifest.json", Some("builds/list.json"), None);
        assert_eq!(r.plugin_list_url(), "https://host/repo/builds/list.json");
    }

    #[test]
    fn test_absent_pointer_defaults_to_plugins_json() {
        let r = repo("https://host/repo/manifest.json", None, None);
        assert_eq!(r.plugin_list_url(), "https://host/repo/plugins.json");

        let r = repo("https://host/repo/manifest.json", None, Some(vec![]));
        assert_eq!(r.plugin_list_url(), "https://host/repo/plugins.json");
    }

    #[test]
    fn test_plugin_url_wins_over_plugin_lists() {
        let r = repo(
            "https://host/repo/manifest.json",
            Some("https://cdn.example/a.json"),
            Some(vec!["b.json"]),
        );
        assert_eq!(r.plugin_list_url(), "https://cdn.example/a.json");

        let r = repo("https://host/repo/manifest.json", None, Some(vec!["b.json", "c.json"]));
        assert_eq!(r.plugin_list_url(), "https://host/repo/b.json");
    }

    #[test]
    fn test_manifest_ignores_unknown_fields() {
        let json = r#"{"name":"R","manifestVersion":2,"pluginLists":["p.json"],"extra":{"x":1}}"#;
        let r: Repository = serde_json::from_str(json).unwrap();
        assert_eq!(r.name, "R");
        assert_eq!(r.manifest_version, Some(2));
        assert!(r.url.is_empty());
    }

    #[test]
    fn test_catalog_entry_wire_names() {
        let json = r#"[{"internalName":"Anime","version":3,"url":"https://h/a.sdm","tvTypes":["Anime"],"status":1}]"#;
        let entries: Vec<CatalogEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].internal_name, "Anime");
        assert_eq!(entries[0].version, 3);
        assert_eq!(entries[0].tv_types.as_deref(), Some(&["Anime".to_string()][..]));
    }
}
