//! secure-transfer - Encrypted file sharing with expiring group links
//!
//! This crate provides upload, listing, and download of file batches with:
//! - Files encrypted at rest (AES-256-CTR, per-file random IV, shared key)
//! - One shareable link per upload batch ("group"), optionally password-gated
//! - Expiring links and on-the-fly zip bundling for multi-file groups
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)
//! - REST API with multipart upload support

pub mod api;
pub mod artifacts;
pub mod config;
pub mod crypto;
pub mod notify;
pub mod storage;
pub mod transfer;

use std::sync::Arc;

use artifacts::ArtifactStore;
use config::Config;
use crypto::KeyStore;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub artifacts: ArtifactStore,
    pub config: Config,
    pub db: Database,
    pub keys: KeyStore,
    pub notifier: Arc<dyn notify::Notifier>,
}
