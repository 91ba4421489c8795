//! Native resolver: provider libraries loaded with `libloading`.
//!
//! Library entries are extracted under `<cache>/<artifact>/<digest>/` before
//! loading. The digest directory keeps a reload from overwriting a library
//! that an earlier registry snapshot still has mapped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use sha2::{Digest, Sha256};
use streamdock_provider_sdk::{
    AbiVersionFn, Provider, ProviderBox, ProviderCreateFn, ProviderDestroyFn, ProviderResult,
    SearchResult, ABI_VERSION_SYMBOL, CREATE_SYMBOL, DESTROY_SYMBOL, PROVIDER_ABI_VERSION,
};

use super::{Candidate, ModuleResolver, ProviderHandle};
use crate::config::suffixes;
use crate::error::LoadError;
use crate::package::is_platform_library;
use crate::store::Artifact;

/// Resolves entries that are shared libraries for the current platform.
#[derive(Debug, Clone)]
pub struct NativeResolver {
    cache_dir: PathBuf,
}

impl NativeResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn artifact_cache(&self, artifact: &Artifact) -> PathBuf {
        self.cache_dir.join(artifact.name())
    }

    /// Write `bytes` to the cache, reusing an identical earlier extraction.
    fn extract(&self, artifact: &Artifact, entry: &str, bytes: &[u8]) -> Result<PathBuf, LoadError> {
        let digest = format!("{:x}", Sha256::digest(bytes));
        let file_name = Path::new(entry)
            .file_name()
            .ok_or_else(|| LoadError::InvalidPackage(format!("bad entry name {}", entry)))?;
        let dir = self.artifact_cache(artifact).join(&digest[..16]);
        let target = dir.join(file_name);
        if target.is_file() {
            return Ok(target);
        }

        let io_err = |e: std::io::Error| LoadError::Open(format!("{}: {}", target.display(), e));
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut partial = target.clone().into_os_string();
        partial.push(".");
        partial.push(suffixes::PARTIAL);
        let partial = PathBuf::from(partial);

        let guard = scopeguard::guard(partial.clone(), |path| {
            let _ = std::fs::remove_file(path);
        });
        let mut file = std::fs::File::create(&partial).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        std::fs::rename(&partial, &target).map_err(io_err)?;
        scopeguard::ScopeGuard::into_inner(guard);

        Ok(target)
    }
}

impl ModuleResolver for NativeResolver {
    fn resolve(&self, candidate: &mut Candidate<'_>) -> Result<Option<ProviderHandle>, LoadError> {
        if !is_platform_library(candidate.entry()) {
            return Ok(None);
        }

        let bytes = candidate.read()?;
        let path = self.extract(candidate.artifact(), candidate.entry(), &bytes)?;

        // SAFETY: loading runs the library's initializers; packages are
        // trusted once installed.
        match unsafe { NativeProvider::open(&path)? } {
            Some(provider) => Ok(Some(Arc::new(provider))),
            None => {
                tracing::debug!("{} does not export a provider ABI", path.display());
                Ok(None)
            }
        }
    }

    fn forget(&self, artifact: &Artifact) {
        let dir = self.artifact_cache(artifact);
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::debug!("Could not remove {}: {}", dir.display(), e);
            }
        }
    }
}

/// A provider instance living in a loaded library.
///
/// The library outlives the instance: fields drop after `Drop::drop` has
/// destroyed the instance.
struct NativeProvider {
    instance: *mut ProviderBox,
    destroy: ProviderDestroyFn,
    _library: Library,
}

// SAFETY: `Provider: Send + Sync`, and the instance pointer is owned
// exclusively by this wrapper.
unsafe impl Send for NativeProvider {}
unsafe impl Sync for NativeProvider {}

impl NativeProvider {
    /// `Ok(None)` when the library has no ABI version symbol.
    unsafe fn open(path: &Path) -> Result<Option<Self>, LoadError> {
        let library = Library::new(path).map_err(|e| LoadError::Library(e.to_string()))?;

        let abi_version = match library.get::<AbiVersionFn>(ABI_VERSION_SYMBOL) {
            Ok(symbol) => symbol(),
            Err(_) => return Ok(None),
        };
        if abi_version != PROVIDER_ABI_VERSION {
            return Err(LoadError::IncompatibleAbi {
                expected: PROVIDER_ABI_VERSION,
                got: abi_version,
            });
        }

        let create: ProviderCreateFn = *library
            .get::<ProviderCreateFn>(CREATE_SYMBOL)
            .map_err(|_| symbol_not_found(CREATE_SYMBOL))?;
        let destroy: ProviderDestroyFn = *library
            .get::<ProviderDestroyFn>(DESTROY_SYMBOL)
            .map_err(|_| symbol_not_found(DESTROY_SYMBOL))?;

        let instance = create();
        if instance.is_null() {
            return Err(LoadError::NullInstance);
        }

        Ok(Some(Self {
            instance,
            destroy,
            _library: library,
        }))
    }

    fn inner(&self) -> &dyn Provider {
        // SAFETY: non-null and valid until drop.
        unsafe { &**self.instance }
    }
}

fn symbol_not_found(symbol: &[u8]) -> LoadError {
    LoadError::SymbolNotFound(String::from_utf8_lossy(symbol).into_owned())
}

impl Provider for NativeProvider {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn search(&self, query: &str) -> ProviderResult<Vec<SearchResult>> {
        self.inner().search(query)
    }
}

impl Drop for NativeProvider {
    fn drop(&mut self) {
        // SAFETY: produced by the library's create function, destroyed once.
        unsafe { (self.destroy)(self.instance) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_reuses_identical_payload() {
        let tmp = TempDir::new().unwrap();
        let resolver = NativeResolver::new(tmp.path());
        let artifact = Artifact::from_path(tmp.path().join("anime.sdx"));

        let first = resolver.extract(&artifact, "lib/libanime.so", b"one").unwrap();
        let again = resolver.extract(&artifact, "lib/libanime.so", b"one").unwrap();
        let changed = resolver.extract(&artifact, "lib/libanime.so", b"two").unwrap();

        assert_eq!(first, again);
        assert_ne!(first, changed);
        assert_eq!(std::fs::read(&changed).unwrap(), b"two");
        assert!(first.starts_with(tmp.path().join("anime")));
    }

    #[test]
    fn test_forget_removes_cache() {
        let tmp = TempDir::new().unwrap();
        let resolver = NativeResolver::new(tmp.path());
        let artifact = Artifact::from_path(tmp.path().join("anime.sdx"));
        resolver.extract(&artifact, "lib/libanime.so", b"one").unwrap();

        resolver.forget(&artifact);
        assert!(!tmp.path().join("anime").exists());
    }

    #[test]
    fn test_invalid_library_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bogus.so");
        std::fs::write(&path, b"not a library").unwrap();

        let result = unsafe { NativeProvider::open(&path) };
        assert!(matches!(result, Err(LoadError::Library(_))));
    }
}
