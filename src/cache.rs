//! Content-addressed report cache. An artifact's identity is the SHA-1 of its
//! bytes plus its base name; identical bytes never trigger a re-analysis.

use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Non-fatal: the in-memory payload stays usable for this session.
    #[error("failed to persist cache entry: {0}")]
    PersistFailed(#[from] std::io::Error),
}

/// Stable cache key, immutable once computed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactIdentity {
    pub name: String,
    pub sha1: String,
}

impl ArtifactIdentity {
    pub fn of(name: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        Self {
            name: name.to_string(),
            sha1: hex::encode(hasher.finalize()),
        }
    }

    fn file_name(&self) -> String {
        format!("report-{}-{}.json", self.name, self.sha1)
    }
}

/// The artifact to analyze: bytes, the full file name sent in the upload
/// form, and the identity derived from the file stem.
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub identity: ArtifactIdentity,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        // everything after the first dot is extension, so a multi-suffix
        // name like archive.tar.gz identifies as "archive"
        let stem = file_name
            .split_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&file_name);
        let identity = ArtifactIdentity::of(stem, &bytes);
        Self {
            file_name,
            bytes,
            identity,
        }
    }

    pub fn from_path(path: &Path, bytes: Vec<u8>) -> Self {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        Self::new(file_name, bytes)
    }
}

/// Identity -> persisted raw payload. Sole writer of entries; never evicts,
/// a fresh analysis of the same identity overwrites in place.
pub struct ReportCache {
    dir: PathBuf,
    index: HashMap<ArtifactIdentity, PathBuf>,
}

impl ReportCache {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            index: HashMap::new(),
        })
    }

    fn path_for(&self, identity: &ArtifactIdentity) -> PathBuf {
        self.dir.join(identity.file_name())
    }

    /// Exact-match lookup; falls back to disk for entries from earlier runs.
    pub fn lookup(&mut self, identity: &ArtifactIdentity) -> Option<PathBuf> {
        if let Some(path) = self.index.get(identity) {
            return Some(path.clone());
        }
        let path = self.path_for(identity);
        if path.exists() {
            self.index.insert(identity.clone(), path.clone());
            Some(path)
        } else {
            None
        }
    }

    /// Last write wins. On disk failure no index entry is made, so later
    /// lookups see a miss instead of a dangling path; the caller keeps its
    /// in-memory payload for the session.
    pub fn store(
        &mut self,
        identity: &ArtifactIdentity,
        raw: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let path = self.path_for(identity);
        debug!("[cache] store {}", path.display());
        fs::write(&path, raw)?;
        self.index.insert(identity.clone(), path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("malq-cache-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn identity_deterministic() {
        let a = ArtifactIdentity::of("sample", b"hello world");
        let b = ArtifactIdentity::of("sample", b"hello world");
        assert_eq!(a, b);

        let c = ArtifactIdentity::of("sample", b"hello worle");
        assert_ne!(a.sha1, c.sha1);

        // well-known sha1 of "hello world"
        assert_eq!(a.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn artifact_identity_uses_file_stem() {
        let artifact = Artifact::from_path(Path::new("/tmp/evil.exe"), vec![1, 2, 3]);
        assert_eq!(artifact.file_name, "evil.exe");
        assert_eq!(artifact.identity.name, "evil");

        // stem cuts at the first dot, not the last
        let nested = Artifact::new("archive.tar.gz", vec![1, 2, 3]);
        assert_eq!(nested.identity.name, "archive");
    }

    #[test]
    fn store_then_lookup_roundtrip() {
        let mut cache = ReportCache::open(scratch_dir("roundtrip")).unwrap();
        let id = ArtifactIdentity::of("mod", b"\x4d\x5a\x90");
        assert_eq!(cache.lookup(&id), None);

        let raw = br#"{"success":true,"data":{"status":"done"}}"#;
        let path = cache.store(&id, raw).unwrap();
        assert_eq!(cache.lookup(&id), Some(path.clone()));
        assert_eq!(fs::read(&path).unwrap(), raw);

        // overwrite, same identity
        let raw2 = br#"{"success":true,"data":{"status":"redone"}}"#;
        let path2 = cache.store(&id, raw2).unwrap();
        assert_eq!(path, path2);
        assert_eq!(fs::read(&path2).unwrap(), raw2);
    }

    #[test]
    fn lookup_sees_entries_from_earlier_sessions() {
        let dir = scratch_dir("rehydrate");
        let id = ArtifactIdentity::of("mod", b"bytes");
        {
            let mut cache = ReportCache::open(&dir).unwrap();
            cache.store(&id, b"{}").unwrap();
        }
        let mut fresh = ReportCache::open(&dir).unwrap();
        assert!(fresh.lookup(&id).is_some());
    }

    #[test]
    fn persist_failure_leaves_no_index_entry() {
        let dir = scratch_dir("persistfail");
        let mut cache = ReportCache::open(&dir).unwrap();
        // make the target path unwritable by replacing the dir with a file
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a dir").unwrap();

        let id = ArtifactIdentity::of("mod", b"bytes");
        assert!(matches!(
            cache.store(&id, b"{}"),
            Err(CacheError::PersistFailed(_))
        ));
        // no dangling path: the failed entry must look like a miss
        assert!(!cache.index.contains_key(&id));
        assert_eq!(cache.lookup(&id), None);
    }
}
