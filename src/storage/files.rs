use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::FileRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // File record operations
    // ========================================================================

    /// Store a file record and update the group and storage-name indexes.
    /// Records are immutable: this is the only write path for files.
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.group_id.is_empty(), "group id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            let mut names_table = write_txn.open_table(FILE_NAMES)?;
            names_table.insert(file.filename.as_str(), file.id.as_str())?;

            // Maintain group index, preserving insertion order
            let mut group_table = write_txn.open_table(GROUP_FILES)?;
            let mut file_ids: Vec<String> = group_table
                .get(file.group_id.as_str())?
                .map(|v| rmp_serde::from_slice(v.value()).unwrap_or_default())
                .unwrap_or_default();

            if !file_ids.contains(&file.id) {
                file_ids.push(file.id.clone());
                let index_data = rmp_serde::to_vec_named(&file_ids)?;
                group_table.insert(file.group_id.as_str(), index_data.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get a file by UUID, but only if it belongs to the given group.
    pub fn get_file_in_group(
        &self,
        group_id: &str,
        file_id: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        Ok(self
            .get_file(file_id)?
            .filter(|file| file.group_id == group_id))
    }

    /// Get a file by its generated storage name (legacy download links).
    pub fn get_file_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let names_table = read_txn.open_table(FILE_NAMES)?;

        let id = match names_table.get(filename)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let files_table = read_txn.open_table(FILES)?;
        match files_table.get(id.as_str())? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get all files for a group, in insertion order.
    pub fn get_files_by_group(&self, group_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let group_table = read_txn.open_table(GROUP_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<String> = match group_table.get(group_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::new();
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Get one representative record for a group. All members of a group
    /// carry the same password value, so the first insert speaks for the
    /// whole batch.
    pub fn first_file_in_group(
        &self,
        group_id: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let group_table = read_txn.open_table(GROUP_FILES)?;

        let first_id: Option<String> = match group_table.get(group_id)? {
            Some(data) => {
                let ids: Vec<String> = rmp_serde::from_slice(data.value())?;
                ids.into_iter().next()
            }
            None => None,
        };

        let Some(id) = first_id else {
            return Ok(None);
        };

        let files_table = read_txn.open_table(FILES)?;
        match files_table.get(id.as_str())? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }
}
