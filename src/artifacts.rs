//! Durable storage for encrypted artifacts and lifecycle of the transient
//! plaintext files the retrieval pipeline decrypts into.

use std::path::{Path, PathBuf};

/// Filesystem store for encrypted artifacts. Paths are recorded on the
/// file records, so most operations take the recorded path rather than a
/// key into the base directory.
pub struct ArtifactStore {
    base_path: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Where a new encrypted artifact for `storage_name` lives.
    pub fn encrypted_path(&self, storage_name: &str) -> PathBuf {
        self.base_path.join(format!("{storage_name}.enc"))
    }

    /// Scratch path for plaintext ingested during upload, before encryption.
    pub fn ingest_path(&self, storage_name: &str) -> PathBuf {
        self.base_path.join(format!("{storage_name}.part"))
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Current artifact size in bytes, 0 when the artifact is missing.
    /// Missing bytes only become an error at retrieval time.
    pub async fn size(&self, path: &Path) -> u64 {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        }
    }

    /// Remove an artifact. Already-removed artifacts are not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), std::io::Error> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Transient plaintext path for a decryption of `encrypted`: derived from
/// the source path plus a per-request token, so concurrent requests for
/// the same artifact never share a file.
pub fn transient_path(encrypted: &Path, token: &str) -> PathBuf {
    let mut name = encrypted.as_os_str().to_os_string();
    name.push(format!(".{token}.dec"));
    PathBuf::from(name)
}

/// Deletes a request's transient plaintext artifacts when dropped.
///
/// Attached to the response stream, so every exit path — completed
/// response, client disconnect, archiving failure — runs the same cleanup.
/// Removal is idempotent; files already gone are skipped silently.
#[derive(Debug, Default)]
pub struct TransientGuard {
    paths: Vec<PathBuf>,
}

impl TransientGuard {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for TransientGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove transient artifact");
                }
            }
        }
    }
}
