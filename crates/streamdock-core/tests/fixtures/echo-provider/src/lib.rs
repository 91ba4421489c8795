//! Test provider that echoes the query back as a single result.

use streamdock_provider_sdk::prelude::*;

#[derive(Default)]
pub struct Echo;

impl Provider for Echo {
    fn name(&self) -> &str {
        "Echo"
    }

    fn search(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
        Ok(vec![SearchResult::new(
            query,
            format!("echo://{}", query),
            MediaKind::Others,
        )])
    }
}

export_provider!(Echo);
