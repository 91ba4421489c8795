//! Invocation fan-out: one call across every loaded provider.

use std::sync::Arc;

use futures::future::join_all;
use streamdock_provider_sdk::{Provider, ProviderResult, SearchResult};

use crate::loader::ExtensionLoader;

impl ExtensionLoader {
    /// Run `op` on every loaded provider concurrently.
    ///
    /// Results are concatenated in registry order, each provider's own order
    /// preserved. A provider that errors or panics is logged and skipped;
    /// nothing propagates to the caller.
    pub async fn invoke<T, F>(&self, op: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(&dyn Provider) -> ProviderResult<Vec<T>> + Send + Sync + 'static,
    {
        let snapshot = self.snapshot().await;
        let op = Arc::new(op);

        let calls = snapshot
            .iter()
            .filter_map(|entry| entry.handle.clone().map(|h| (entry.name.clone(), h)))
            .map(|(name, provider)| {
                let op = Arc::clone(&op);
                async move {
                    let outcome =
                        tokio::task::spawn_blocking(move || (*op)(provider.as_ref())).await;
                    match outcome {
                        Ok(Ok(items)) => items,
                        Ok(Err(e)) => {
                            tracing::warn!("Provider {} failed: {}", name, e);
                            Vec::new()
                        }
                        Err(e) => {
                            tracing::warn!("Provider {} panicked: {}", name, e);
                            Vec::new()
                        }
                    }
                }
            });

        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Search every loaded provider.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.to_string();
        self.invoke(move |provider| provider.search(&query)).await
    }
}
