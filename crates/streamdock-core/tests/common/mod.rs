//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use parking_lot::RwLock;
use streamdock_core::sdk::{Provider, ProviderError, ProviderResult, SearchResult, MediaKind};
use streamdock_core::ArtifactStore;
use zip::write::SimpleFileOptions;

#[derive(Default)]
struct Routes {
    responses: RwLock<HashMap<String, (StatusCode, Vec<u8>)>>,
    hits: RwLock<HashMap<String, usize>>,
    total: AtomicUsize,
}

/// A local HTTP server answering fixed responses per path.
#[derive(Clone)]
pub struct CatalogServer {
    base: String,
    routes: Arc<Routes>,
}

impl CatalogServer {
    pub async fn start() -> Self {
        let routes = Arc::new(Routes::default());
        let app = Router::new().fallback(respond).with_state(routes.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            routes,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) -> String {
        self.respond(path, StatusCode::OK, body)
    }

    pub fn respond(&self, path: &str, status: StatusCode, body: impl Into<Vec<u8>>) -> String {
        self.routes
            .responses
            .write()
            .insert(path.to_string(), (status, body.into()));
        self.url(path)
    }

    /// Serve a repository manifest at `path` pointing at `plugin_url`.
    pub fn serve_manifest(&self, path: &str, name: &str, plugin_url: Option<&str>) -> String {
        let manifest = serde_json::json!({
            "name": name,
            "manifestVersion": 1,
            "pluginUrl": plugin_url,
        });
        self.serve(path, manifest.to_string())
    }

    pub fn hits(&self, path: &str) -> usize {
        self.routes.hits.read().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.routes.total.load(Ordering::SeqCst)
    }
}

async fn respond(State(routes): State<Arc<Routes>>, uri: Uri) -> (StatusCode, Vec<u8>) {
    let path = uri.path().to_string();
    routes.total.fetch_add(1, Ordering::SeqCst);
    *routes.hits.write().entry(path.clone()).or_default() += 1;

    routes
        .responses
        .read()
        .get(&path)
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, Vec::new()))
}

/// Build a package archive in memory.
pub fn package_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut bytes);
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    bytes.into_inner()
}

pub fn install_package(store: &ArtifactStore, name: &str, entries: &[(&str, &[u8])]) {
    store.install(name, &package_bytes(entries)).unwrap();
}

/// Minimal native library header for format detection.
pub const ELF_HEADER: &[u8] = b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00";

/// Provider answering every query with `count` results named after itself.
pub struct Fixed {
    pub name: &'static str,
    pub count: usize,
}

impl Provider for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn search(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
        Ok((0..self.count)
            .map(|i| {
                SearchResult::new(
                    format!("{} {} #{}", self.name, query, i),
                    format!("https://{}.example/{}", self.name, i),
                    MediaKind::Movie,
                )
            })
            .collect())
    }
}

/// Provider whose search always fails.
pub struct Failing;

impl Provider for Failing {
    fn name(&self) -> &str {
        "Failing"
    }

    fn search(&self, _query: &str) -> ProviderResult<Vec<SearchResult>> {
        Err(ProviderError::Network("connection reset".to_string()))
    }
}

/// Provider whose search panics.
pub struct Panicking;

impl Provider for Panicking {
    fn name(&self) -> &str {
        "Panicking"
    }

    fn search(&self, _query: &str) -> ProviderResult<Vec<SearchResult>> {
        panic!("provider bug")
    }
}
