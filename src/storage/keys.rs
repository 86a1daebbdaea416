use chrono::Utc;
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::EncryptionKey;
use super::tables::ENCRYPTION_KEYS;

impl Database {
    // ========================================================================
    // Encryption key operations
    // ========================================================================

    /// Get the most recently created key (the one with the highest id).
    pub fn latest_key(&self) -> Result<Option<EncryptionKey>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ENCRYPTION_KEYS)?;

        match table.range::<u64>(..)?.next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                let key: EncryptionKey = rmp_serde::from_slice(value.value())?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    /// Get a key by id. Historical keys stay resolvable forever because
    /// stored ciphertext references them.
    pub fn get_key(&self, id: u64) -> Result<Option<EncryptionKey>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ENCRYPTION_KEYS)?;

        match table.get(id)? {
            Some(value) => {
                let key: EncryptionKey = rmp_serde::from_slice(value.value())?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    /// Insert `key_value` as a new key unless one already exists, returning
    /// whichever key ends up current. The re-check and the insert share one
    /// write transaction, so two callers racing on an empty table cannot
    /// both insert: the loser adopts the winner's key.
    pub fn create_key_if_absent(&self, key_value: &[u8]) -> Result<EncryptionKey, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: Option<EncryptionKey> = {
            let table = write_txn.open_table(ENCRYPTION_KEYS)?;
            let last = table.range::<u64>(..)?.next_back();
            match last {
                Some(entry) => {
                    let (_, value) = entry?;
                    Some(rmp_serde::from_slice(value.value())?)
                }
                None => None,
            }
        };

        if let Some(key) = existing {
            // No commit needed, nothing was written.
            return Ok(key);
        }

        let key = EncryptionKey {
            id: 1,
            key_value: key_value.to_vec(),
            created_at: Utc::now(),
        };
        {
            let mut table = write_txn.open_table(ENCRYPTION_KEYS)?;
            let data = rmp_serde::to_vec_named(&key)?;
            table.insert(key.id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(key)
    }
}
