use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Group index: group_id -> msgpack Vec of file UUIDs (insertion order)
pub const GROUP_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("group_files");

/// Storage-name index: generated filename -> uuid (for legacy /download/ lookups)
pub const FILE_NAMES: TableDefinition<&str, &str> = TableDefinition::new("file_names");

/// Encryption keys: monotonic id -> EncryptionKey (msgpack). Highest id is current.
pub const ENCRYPTION_KEYS: TableDefinition<u64, &[u8]> = TableDefinition::new("encryption_keys");
