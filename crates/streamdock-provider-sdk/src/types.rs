//! The provider capability contract.

use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Kind of media a search result points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum MediaKind {
    #[default]
    Movie,
    AnimeMovie,
    TvSeries,
    Cartoon,
    Anime,
    #[serde(rename = "OVA")]
    Ova,
    Torrent,
    Documentary,
    AsianDrama,
    Live,
    Music,
    AudioBook,
    Podcast,
    Others,
}

/// One record returned by a provider query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_url: Option<String>,
}

impl SearchResult {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            poster_url: None,
        }
    }

    pub fn with_poster(mut self, poster_url: impl Into<String>) -> Self {
        self.poster_url = Some(poster_url.into());
        self
    }
}

/// A media source the host can query.
///
/// The host never depends on what a provider does internally; it only calls
/// these methods, possibly from several threads at once.
pub trait Provider: Send + Sync {
    /// Display name of the provider.
    fn name(&self) -> &str;

    /// Run a query and return matching records in relevance order.
    fn search(&self, query: &str) -> ProviderResult<Vec<SearchResult>>;
}
