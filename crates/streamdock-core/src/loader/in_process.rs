//! Providers linked into the host, addressed by package entry name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use streamdock_provider_sdk::Provider;

use super::{Candidate, ModuleResolver, ProviderHandle};
use crate::error::LoadError;

type Constructor = Arc<dyn Fn() -> ProviderHandle + Send + Sync>;

/// Resolver backed by constructors registered at run time.
///
/// A package qualifies when one of its entries names a registered
/// constructor; the entry's bytes are not inspected.
#[derive(Default)]
pub struct InProcessResolver {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl InProcessResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, entry: impl Into<String>, constructor: F)
    where
        F: Fn() -> ProviderHandle + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(entry.into(), Arc::new(constructor));
    }

    /// Register a provider type constructed through `Default`.
    pub fn register_default<P>(&self, entry: impl Into<String>)
    where
        P: Provider + Default + 'static,
    {
        self.register(entry, || Arc::new(P::default()) as ProviderHandle);
    }

    pub fn unregister(&self, entry: &str) -> bool {
        self.constructors.write().remove(entry).is_some()
    }

    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.constructors.read().keys().cloned().collect();
        entries.sort();
        entries
    }
}

impl ModuleResolver for InProcessResolver {
    fn resolve(&self, candidate: &mut Candidate<'_>) -> Result<Option<ProviderHandle>, LoadError> {
        let constructor = self.constructors.read().get(candidate.entry()).cloned();
        Ok(constructor.map(|construct| construct()))
    }
}

impl std::fmt::Debug for InProcessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessResolver")
            .field("entries", &self.entries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamdock_provider_sdk::{ProviderResult, SearchResult};

    #[derive(Default)]
    struct Empty;

    impl Provider for Empty {
        fn name(&self) -> &str {
            "Empty"
        }

        fn search(&self, _query: &str) -> ProviderResult<Vec<SearchResult>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let resolver = InProcessResolver::new();
        resolver.register_default::<Empty>("b");
        resolver.register_default::<Empty>("a");
        assert_eq!(resolver.entries(), vec!["a".to_string(), "b".to_string()]);

        assert!(resolver.unregister("a"));
        assert!(!resolver.unregister("a"));
        assert_eq!(resolver.entries(), vec!["b".to_string()]);
    }
}
