//! Artifact store: the directory holding installed provider packages.
//!
//! Only files with the package suffix are visible. In-progress writes carry a
//! `.part` suffix and retired packages a `.del` suffix, so neither is ever
//! enumerated.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::{suffixes, DEFAULT_ARTIFACT_VERSION};
use crate::error::Result;
use crate::package;

/// An installed extension file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact {
    path: PathBuf,
    name: String,
}

impl Artifact {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical name (file stem).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the file carries the loadable package suffix.
    pub fn is_loadable(&self) -> bool {
        has_suffix(&self.path, suffixes::PACKAGE)
    }

    /// Version declared in the package manifest, or the default when the
    /// package has none or cannot be read.
    pub fn declared_version(&self) -> semver::Version {
        package::read_manifest(&self.path)
            .map(|manifest| manifest.version())
            .unwrap_or(DEFAULT_ARTIFACT_VERSION)
    }

    fn pending_deletion_path(&self) -> PathBuf {
        let mut file_name = self.path.file_name().unwrap_or_default().to_os_string();
        file_name.push(".");
        file_name.push(suffixes::PENDING_DELETION);
        self.path.with_file_name(file_name)
    }
}

/// Deletion lifecycle of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Active,
    /// Could not be deleted yet; a later sweep retries.
    PendingDeletion,
    Deleted,
}

/// Directory-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory on first use.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Installed packages, sorted by file name.
    pub fn list(&self) -> Result<Vec<Artifact>> {
        std::fs::create_dir_all(&self.dir)?;

        let mut artifacts: Vec<Artifact> = std::fs::read_dir(&self.dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_suffix(path, suffixes::PACKAGE))
            .map(Artifact::from_path)
            .collect();

        artifacts.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(artifacts)
    }

    /// File name an artifact is stored under, given a suggested name.
    ///
    /// Known suffixes are stripped before the package suffix is appended, so
    /// `anime.sdm`, `anime.sdx` and `anime` all map to `anime.sdx`.
    pub fn final_name(suggested: &str) -> String {
        let trimmed = suggested.trim();
        let stem = std::iter::once(suffixes::PACKAGE)
            .chain(suffixes::LEGACY)
            .find_map(|suffix| {
                let (rest, ext) = trimmed.rsplit_once('.')?;
                ext.eq_ignore_ascii_case(suffix).then_some(rest)
            })
            .unwrap_or(trimmed);
        format!("{}.{}", sanitize(stem), suffixes::PACKAGE)
    }

    pub fn path_for(&self, final_name: &str) -> PathBuf {
        self.dir.join(final_name)
    }

    /// Create an empty `.part` file in the store directory.
    ///
    /// It is removed when dropped unless passed to [`commit`](Self::commit).
    pub fn stage(&self) -> Result<NamedTempFile> {
        std::fs::create_dir_all(&self.dir)?;
        let staged = tempfile::Builder::new()
            .prefix(".staged-")
            .suffix(&format!(".{}.{}", suffixes::PACKAGE, suffixes::PARTIAL))
            .tempfile_in(&self.dir)?;
        Ok(staged)
    }

    /// Atomically move a staged file over `final_name`.
    pub fn commit(&self, staged: NamedTempFile, final_name: &str) -> Result<Artifact> {
        let target = self.path_for(final_name);
        staged.persist(&target).map_err(|e| e.error)?;
        tracing::info!("Installed artifact {}", target.display());
        Ok(Artifact::from_path(target))
    }

    /// Write `bytes` as `final_name`, replacing any existing artifact.
    pub fn install(&self, final_name: &str, bytes: &[u8]) -> Result<Artifact> {
        let mut staged = self.stage()?;
        staged.write_all(bytes)?;
        staged.flush()?;
        self.commit(staged, final_name)
    }

    /// Copy the file at `source` in as `final_name`, replacing any existing
    /// artifact.
    pub fn install_from(&self, final_name: &str, source: &Path) -> Result<Artifact> {
        let mut staged = self.stage()?;
        std::io::copy(&mut std::fs::File::open(source)?, staged.as_file_mut())?;
        staged.flush()?;
        self.commit(staged, final_name)
    }

    pub fn remove(&self, artifact: &Artifact) -> Result<()> {
        std::fs::remove_file(artifact.path())?;
        Ok(())
    }

    /// Delete an artifact, degrading to a pending-deletion marker when the
    /// file cannot be removed (for example while a library is still mapped).
    pub fn retire(&self, artifact: &Artifact) -> ArtifactState {
        match std::fs::remove_file(artifact.path()) {
            Ok(()) => ArtifactState::Deleted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} was already gone", artifact.path().display());
                ArtifactState::Deleted
            }
            Err(e) => {
                let marker = artifact.pending_deletion_path();
                tracing::warn!(
                    "Could not delete {}: {}; renaming to {}",
                    artifact.path().display(),
                    e,
                    marker.display()
                );
                if let Err(e) = std::fs::rename(artifact.path(), &marker) {
                    tracing::warn!(
                        "Could not mark {} for deletion: {}",
                        artifact.path().display(),
                        e
                    );
                }
                ArtifactState::PendingDeletion
            }
        }
    }

    /// Files waiting for deletion.
    pub fn pending(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| has_suffix(p, suffixes::PENDING_DELETION))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Retry deletion of every pending file. Returns how many remain.
    pub fn sweep_pending(&self) -> usize {
        let mut remaining = 0;
        for path in self.pending() {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!("Deleted pending artifact {}", path.display()),
                Err(e) => {
                    tracing::debug!("Pending artifact {} still locked: {}", path.display(), e);
                    remaining += 1;
                }
            }
        }
        remaining
    }
}

pub(crate) fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(suffix))
        .unwrap_or(false)
}

/// Keep names inside the store directory.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("extensions");
        let store = ArtifactStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_only_shows_packages() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();

        for name in ["b.sdx", "a.SDX", "c.sdm", "d.sdx.part", "e.sdx.del", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(tmp.path().join("dir.sdx")).unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_final_name() {
        assert_eq!(ArtifactStore::final_name("anime"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("anime.sdm"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("anime.sdlib"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("anime.sdx"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("anime.SDM"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("Anime.SdLib"), "Anime.sdx");
        assert_eq!(ArtifactStore::final_name("anime.SDX"), "anime.sdx");
        assert_eq!(ArtifactStore::final_name("../evil"), "_evil.sdx");
        assert_eq!(ArtifactStore::final_name(""), "unnamed.sdx");
    }

    #[test]
    fn test_install_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();

        store.install("p.sdx", b"first").unwrap();
        let artifact = store.install("p.sdx", b"second").unwrap();

        assert_eq!(std::fs::read(artifact.path()).unwrap(), b"second");
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(artifact.is_loadable());
    }

    #[test]
    fn test_install_from_copies_source() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path().join("store")).unwrap();
        let source = tmp.path().join("manual.sdx");
        std::fs::write(&source, b"manual").unwrap();

        let artifact = store.install_from("manual.sdx", &source).unwrap();
        assert_eq!(std::fs::read(artifact.path()).unwrap(), b"manual");
        assert!(source.exists());
        // Not an archive, so no manifest to read a version from.
        assert_eq!(artifact.declared_version(), DEFAULT_ARTIFACT_VERSION);
    }

    #[test]
    fn test_dropped_stage_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();

        let staged = store.stage().unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());
        drop(staged);

        assert!(!staged_path.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_retire_deletes_file() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let artifact = store.install("gone.sdx", b"x").unwrap();

        assert_eq!(store.retire(&artifact), ArtifactState::Deleted);
        assert!(!artifact.path().exists());
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_retire_missing_file_is_deleted() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        let artifact = Artifact::from_path(tmp.path().join("vanished.sdx"));

        assert_eq!(store.retire(&artifact), ArtifactState::Deleted);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_retire_falls_back_to_marker() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();

        // A directory cannot be removed with remove_file, which stands in for
        // a file held open by the loader.
        let locked = tmp.path().join("locked.sdx");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("inner"), b"x").unwrap();
        let artifact = Artifact::from_path(&locked);

        assert_eq!(store.retire(&artifact), ArtifactState::PendingDeletion);
        assert!(!locked.exists());
        assert!(tmp.path().join("locked.sdx.del").exists());
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.pending().len(), 1);
        assert_eq!(store.sweep_pending(), 1);
    }

    #[test]
    fn test_sweep_removes_pending_files() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("old.sdx.del"), b"x").unwrap();

        assert_eq!(store.sweep_pending(), 0);
        assert!(store.pending().is_empty());
    }
}
