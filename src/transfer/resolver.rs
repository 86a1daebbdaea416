//! Group resolution: which files of a group are still downloadable.

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::artifacts::ArtifactStore;
use crate::storage::models::FileRecord;
use crate::storage::{Database, DatabaseError};

/// A live record annotated with its encrypted-artifact size at resolution
/// time. The size is 0 when the artifact is missing from storage; that only
/// becomes an error once a download actually needs the bytes.
#[derive(Debug, Clone)]
pub struct LiveFile {
    pub record: FileRecord,
    pub size: u64,
}

#[derive(Debug)]
pub enum GroupLookup {
    /// At least one record is live, in insertion order.
    Live(Vec<LiveFile>),
    /// The group has no records at all.
    NotFound,
    /// Records exist but every one is past expiration.
    AllExpired,
}

/// Fetch the group's records and partition them against `now`. A record
/// with `expiration == now` is already expired.
pub async fn resolve(
    db: &Database,
    artifacts: &ArtifactStore,
    group_id: &str,
    now: DateTime<Utc>,
) -> Result<GroupLookup, DatabaseError> {
    let records = db.get_files_by_group(group_id)?;
    if records.is_empty() {
        return Ok(GroupLookup::NotFound);
    }

    let mut live = Vec::new();
    for record in records {
        if !record.is_live(now) {
            continue;
        }
        let size = artifacts.size(Path::new(&record.encrypted_path)).await;
        live.push(LiveFile { record, size });
    }

    if live.is_empty() {
        return Ok(GroupLookup::AllExpired);
    }

    Ok(GroupLookup::Live(live))
}
