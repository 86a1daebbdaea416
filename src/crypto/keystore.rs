//! Lifecycle of the shared encryption key.
//!
//! One key is reused across all files, created lazily the first time any
//! upload needs it and cached for the rest of the process lifetime.

use thiserror::Error;
use tokio::sync::OnceCell;

use super::cipher::{self, KEY_LEN};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("stored key {id} has {len} bytes of material, expected {KEY_LEN}")]
    InvalidMaterial { id: u64, len: usize },
    #[error("no key with id {0}")]
    UnknownKey(u64),
}

/// The current key: id for record references, raw material for the cipher.
#[derive(Clone, Copy)]
pub struct CurrentKey {
    pub id: u64,
    pub material: [u8; KEY_LEN],
}

pub struct KeyStore {
    db: Database,
    current: OnceCell<CurrentKey>,
}

impl KeyStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            current: OnceCell::new(),
        }
    }

    /// Get the current key, creating one if the store has none.
    ///
    /// The cached value amortizes the lookup to once per process. The
    /// create path re-checks inside a single write transaction, so racing
    /// first-callers settle on one key (see `create_key_if_absent`).
    pub async fn current(&self) -> Result<CurrentKey, KeyStoreError> {
        let key = self
            .current
            .get_or_try_init(|| async {
                let record = match self.db.latest_key()? {
                    Some(record) => record,
                    None => {
                        let fresh = cipher::generate_key();
                        let record = self.db.create_key_if_absent(&fresh)?;
                        tracing::info!(key_id = record.id, "Initialized encryption key");
                        record
                    }
                };

                let material =
                    record
                        .material()
                        .ok_or_else(|| KeyStoreError::InvalidMaterial {
                            id: record.id,
                            len: record.key_value.len(),
                        })?;

                Ok::<_, KeyStoreError>(CurrentKey {
                    id: record.id,
                    material,
                })
            })
            .await?;

        Ok(*key)
    }

    /// Resolve the material for the key a file record references. Files
    /// only decrypt under the exact key they were encrypted with, so
    /// historical ids must keep resolving.
    pub async fn material_for(&self, key_id: u64) -> Result<[u8; KEY_LEN], KeyStoreError> {
        if let Some(current) = self.current.get() {
            if current.id == key_id {
                return Ok(current.material);
            }
        }

        let record = self
            .db
            .get_key(key_id)?
            .ok_or(KeyStoreError::UnknownKey(key_id))?;

        record
            .material()
            .ok_or_else(|| KeyStoreError::InvalidMaterial {
                id: record.id,
                len: record.key_value.len(),
            })
    }
}
