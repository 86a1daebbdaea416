use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::cipher::KEY_LEN;

/// A symmetric encryption key row. Keys are append-only: the row with the
/// highest id is the current key, older rows are kept so that files
/// encrypted under them remain decryptable.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    pub id: u64,
    pub key_value: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl EncryptionKey {
    /// Fixed-length key material, or `None` if the stored bytes have the
    /// wrong length (a corrupt row).
    pub fn material(&self) -> Option<[u8; KEY_LEN]> {
        self.key_value.as_slice().try_into().ok()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("id", &self.id)
            .field("key_value", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A file record stored in redb, one row per uploaded file.
/// Records are immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Generated storage name (uuid + original extension)
    pub filename: String,
    /// Name the uploader supplied
    pub original_name: String,
    /// Folder-upload path, set when the supplied name contains a '/'
    #[serde(default)]
    pub relative_path: Option<String>,
    /// Absolute path of the encrypted artifact on disk
    pub encrypted_path: String,
    /// The EncryptionKey this file was encrypted under
    pub key_id: u64,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email: Option<String>,
    /// Batch identifier shared by all files of one upload
    pub group_id: String,
    /// Shared group password, compared byte-exact in cleartext
    #[serde(default)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    /// A record is live until its expiration instant; `expiration == now`
    /// counts as expired. Records without an expiration never expire.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_none_or(|exp| exp > now)
    }

    /// Entry name inside a zip bundle: the recorded relative path, falling
    /// back to the original name.
    pub fn archive_name(&self) -> &str {
        self.relative_path.as_deref().unwrap_or(&self.original_name)
    }
}
