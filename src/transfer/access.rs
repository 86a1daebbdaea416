//! Password gate for group reads.
//!
//! Runs before every listing and group download. The stored password is
//! compared in cleartext, byte-exact — a deliberate simplification of this
//! system, not an oversight.

use crate::storage::{Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
    GroupNotFound,
}

/// Decide whether a caller holding `supplied` may read `group_id`.
///
/// The group's password is read off one representative record; all members
/// of a group carry the same value by construction (one form field applied
/// to the whole upload batch). An unset or empty stored password leaves
/// the group open to any caller.
pub fn authorize(
    db: &Database,
    group_id: &str,
    supplied: Option<&str>,
) -> Result<Access, DatabaseError> {
    let Some(record) = db.first_file_in_group(group_id)? else {
        return Ok(Access::GroupNotFound);
    };

    match record.password.as_deref() {
        None | Some("") => Ok(Access::Allowed),
        Some(stored) => {
            if supplied == Some(stored) {
                Ok(Access::Allowed)
            } else {
                Ok(Access::Denied)
            }
        }
    }
}
