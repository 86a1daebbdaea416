//! Retrieval pipeline: decrypt-on-demand downloads, single file or zip
//! bundle.
//!
//! Every download decrypts into a private transient plaintext file and
//! streams that to the caller. The transient files are owned by a
//! [`TransientGuard`] that rides inside the response stream, so they are
//! removed when the stream is dropped — whether the response completed,
//! the client disconnected, or something failed mid-transfer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use chrono::{DateTime, Utc};
use futures::Stream;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::DuplexStream;
use tokio_util::compat::FuturesAsyncWriteCompatExt;
use tokio_util::io::ReaderStream;

use super::resolver::LiveFile;
use crate::artifacts::{transient_path, ArtifactStore, TransientGuard};
use crate::crypto::cipher::{self, KEY_LEN};
use crate::crypto::{CipherError, KeyStore, KeyStoreError};
use crate::storage::models::FileRecord;
use crate::storage::{Database, DatabaseError};

/// Buffer between the zip writer task and the response body.
const BUNDLE_PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("no matching file")]
    NotFound,
    #[error("link expired")]
    Gone,
    #[error("encrypted artifact missing from storage")]
    ArtifactMissing,
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Key(#[from] KeyStoreError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("archive error: {0}")]
    Zip(#[from] async_zip::error::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A byte stream that keeps a request's transient artifacts alive until it
/// is dropped, then removes them via the guard.
pub struct CleanupStream<S> {
    inner: S,
    _guard: TransientGuard,
}

impl<S> CleanupStream<S> {
    fn new(inner: S, guard: TransientGuard) -> Self {
        Self {
            inner,
            _guard: guard,
        }
    }
}

impl<S: Stream + Unpin> Stream for CleanupStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

/// A decrypted single-file download ready to stream.
pub struct FileDownload {
    pub stream: CleanupStream<ReaderStream<File>>,
    pub original_name: String,
    /// Plaintext length (the transient file's size)
    pub content_length: u64,
}

/// A zip bundle being built on the fly.
pub struct BundleDownload {
    pub stream: CleanupStream<ReaderStream<DuplexStream>>,
}

/// Single-file download within a group. The caller must already hold an
/// `Allowed` from the access gate.
pub async fn fetch_file(
    db: &Database,
    keys: &KeyStore,
    artifacts: &ArtifactStore,
    group_id: &str,
    file_id: &str,
    now: DateTime<Utc>,
) -> Result<FileDownload, RetrieveError> {
    let record = db
        .get_file_in_group(group_id, file_id)?
        .ok_or(RetrieveError::NotFound)?;

    fetch_record(keys, artifacts, &record, now).await
}

/// Legacy direct-filename download. Pre-group links bypass the password
/// gate entirely, but expiration is still enforced.
pub async fn fetch_legacy(
    db: &Database,
    keys: &KeyStore,
    artifacts: &ArtifactStore,
    filename: &str,
    now: DateTime<Utc>,
) -> Result<FileDownload, RetrieveError> {
    let record = db
        .get_file_by_filename(filename)?
        .ok_or(RetrieveError::NotFound)?;

    fetch_record(keys, artifacts, &record, now).await
}

async fn fetch_record(
    keys: &KeyStore,
    artifacts: &ArtifactStore,
    record: &FileRecord,
    now: DateTime<Utc>,
) -> Result<FileDownload, RetrieveError> {
    if !record.is_live(now) {
        return Err(RetrieveError::Gone);
    }

    let encrypted = Path::new(&record.encrypted_path);
    if !artifacts.exists(encrypted).await {
        return Err(RetrieveError::ArtifactMissing);
    }

    let key = keys.material_for(record.key_id).await?;

    let token = uuid::Uuid::new_v4().simple().to_string();
    let plaintext = transient_path(encrypted, &token);

    // Guard registered before the decrypt so a failure below still removes
    // whatever was written.
    let guard = TransientGuard::new(vec![plaintext.clone()]);
    cipher::decrypt(encrypted, &plaintext, &key).await?;

    let file = File::open(&plaintext).await?;
    let content_length = file.metadata().await?.len();

    Ok(FileDownload {
        stream: CleanupStream::new(ReaderStream::new(file), guard),
        original_name: record.original_name.clone(),
        content_length,
    })
}

struct BundleEntry {
    plaintext_path: PathBuf,
    archive_name: String,
}

/// Bundle a resolved live set into a zip stream.
///
/// All artifacts are verified present before any work happens: a partial
/// bundle is never better than a clear failure. Every live file is then
/// decrypted to its own transient artifact up front, so the archiving task
/// that follows only ever reads files covered by the cleanup guard.
pub async fn fetch_bundle(
    keys: &KeyStore,
    artifacts: &ArtifactStore,
    live: &[LiveFile],
) -> Result<BundleDownload, RetrieveError> {
    for file in live {
        if !artifacts.exists(Path::new(&file.record.encrypted_path)).await {
            return Err(RetrieveError::ArtifactMissing);
        }
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let planned: Vec<PathBuf> = live
        .iter()
        .map(|f| transient_path(Path::new(&f.record.encrypted_path), &token))
        .collect();
    let guard = TransientGuard::new(planned.clone());

    let mut key_cache: HashMap<u64, [u8; KEY_LEN]> = HashMap::new();
    let mut entries = Vec::with_capacity(live.len());
    for (file, plaintext) in live.iter().zip(&planned) {
        let key = match key_cache.get(&file.record.key_id) {
            Some(key) => *key,
            None => {
                let key = keys.material_for(file.record.key_id).await?;
                key_cache.insert(file.record.key_id, key);
                key
            }
        };

        cipher::decrypt(Path::new(&file.record.encrypted_path), plaintext, &key).await?;
        entries.push(BundleEntry {
            plaintext_path: plaintext.clone(),
            archive_name: file.record.archive_name().to_string(),
        });
    }

    let (writer, reader) = tokio::io::duplex(BUNDLE_PIPE_CAPACITY);
    tokio::spawn(async move {
        if let Err(e) = write_bundle(entries, writer).await {
            // The response stream truncates; its guard handles cleanup.
            tracing::warn!(error = %e, "Bundle archiving aborted");
        }
    });

    Ok(BundleDownload {
        stream: CleanupStream::new(ReaderStream::new(reader), guard),
    })
}

async fn write_bundle(
    entries: Vec<BundleEntry>,
    writer: DuplexStream,
) -> Result<(), RetrieveError> {
    let mut zip = ZipFileWriter::with_tokio(writer);

    for entry in entries {
        let builder = ZipEntryBuilder::new(entry.archive_name.into(), Compression::Deflate);
        let mut sink = zip.write_entry_stream(builder).await?.compat_write();
        let mut source = File::open(&entry.plaintext_path).await?;
        tokio::io::copy(&mut source, &mut sink).await?;
        sink.into_inner().close().await?;
    }

    zip.close().await?;
    Ok(())
}
