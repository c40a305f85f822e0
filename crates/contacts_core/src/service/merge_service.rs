//! Merge use-case service.
//!
//! # Responsibility
//! - Expose `merge(name)` with a structured, serializable result.
//! - Translate "nothing matched" into a normal outcome.
//! - Classify storage failures into conflict / constraint / other.
//!
//! # Invariants
//! - `MergeResult::NotFound` is returned for zero matches; it is not an error.
//! - A failed merge leaves no partial state (rolled back by the repository).
//! - Log lines carry counts and ids only, never contact field values.

use crate::model::contact::ContactId;
use crate::repo::contact_repo::RepoError;
use crate::repo::merge_repo::{MergeOutcome, MergeReport, MergeRepository};
use log::{error, info, warn};
use rusqlite::ErrorCode;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Error text reported when the name key matches nothing.
pub const CONTACT_NOT_FOUND: &str = "Contact not found";

/// Caller-facing merge result.
///
/// Serializes as `{"success": true, "master_id", "master_name",
/// "deleted_count"}` or `{"success": false, "error": "Contact not found"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Merged {
        master_id: ContactId,
        master_name: String,
        deleted_count: usize,
    },
    NotFound,
}

impl MergeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    pub fn deleted_count(&self) -> usize {
        match self {
            Self::Merged { deleted_count, .. } => *deleted_count,
            Self::NotFound => 0,
        }
    }
}

impl From<&MergeReport> for MergeResult {
    fn from(report: &MergeReport) -> Self {
        Self::Merged {
            master_id: report.master.id,
            master_name: report.master.name.clone(),
            deleted_count: report.deleted_count(),
        }
    }
}

impl Serialize for MergeResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Merged {
                master_id,
                master_name,
                deleted_count,
            } => {
                let mut state = serializer.serialize_struct("MergeResult", 4)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("master_id", master_id)?;
                state.serialize_field("master_name", master_name)?;
                state.serialize_field("deleted_count", deleted_count)?;
                state.end()
            }
            Self::NotFound => {
                let mut state = serializer.serialize_struct("MergeResult", 2)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", CONTACT_NOT_FOUND)?;
                state.end()
            }
        }
    }
}

/// Merge failure. Every variant means the transaction was rolled back.
#[derive(Debug)]
pub enum MergeError {
    /// Another transaction held the write lock past the busy timeout.
    TransactionConflict(RepoError),
    /// Referential integrity or another constraint rejected a write.
    ConstraintViolation(RepoError),
    /// Any other storage failure.
    Repo(RepoError),
}

impl MergeError {
    /// Whether the caller may retry the whole merge.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict(_))
    }

    fn code(&self) -> &'static str {
        match self {
            Self::TransactionConflict(_) => "merge_conflict",
            Self::ConstraintViolation(_) => "merge_constraint_violation",
            Self::Repo(_) => "merge_storage_failed",
        }
    }
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransactionConflict(err) => write!(f, "merge conflicted with another writer: {err}"),
            Self::ConstraintViolation(err) => write!(f, "merge violated a constraint: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TransactionConflict(err) | Self::ConstraintViolation(err) | Self::Repo(err) => {
                Some(err)
            }
        }
    }
}

impl From<RepoError> for MergeError {
    fn from(value: RepoError) -> Self {
        match value.sqlite_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::TransactionConflict(value)
            }
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value),
            _ => Self::Repo(value),
        }
    }
}

/// Merge service facade over repository implementations.
pub struct MergeService<R: MergeRepository> {
    repo: R,
}

impl<R: MergeRepository> MergeService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Merges all contacts whose name matches `name` case-insensitively.
    pub fn merge(&self, name: &str) -> Result<MergeResult, MergeError> {
        self.merge_detailed(name)
            .map(|outcome| match outcome {
                MergeOutcome::NoMatch => MergeResult::NotFound,
                MergeOutcome::Merged(report) => MergeResult::from(&report),
            })
    }

    /// Same as [`MergeService::merge`] but returns the full storage report,
    /// including relink counts and channel values that did not fit.
    pub fn merge_detailed(&self, name: &str) -> Result<MergeOutcome, MergeError> {
        let started_at = Instant::now();
        match self.repo.merge_by_name(name) {
            Ok(MergeOutcome::NoMatch) => {
                info!(
                    "event=contact_merge module=merge status=no_match duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(MergeOutcome::NoMatch)
            }
            Ok(MergeOutcome::Merged(report)) => {
                let dropped = report.dropped_phones.len() + report.dropped_emails.len();
                if dropped > 0 {
                    warn!(
                        "event=contact_merge module=merge status=channel_overflow master_id={} dropped_phones={} dropped_emails={}",
                        report.master.id,
                        report.dropped_phones.len(),
                        report.dropped_emails.len()
                    );
                }
                info!(
                    "event=contact_merge module=merge status=ok master_id={} deleted={} relinked={} duration_ms={}",
                    report.master.id,
                    report.deleted_count(),
                    report.relinked_interactions,
                    started_at.elapsed().as_millis()
                );
                Ok(MergeOutcome::Merged(report))
            }
            Err(err) => {
                let err = MergeError::from(err);
                error!(
                    "event=contact_merge module=merge status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Retries [`MergeService::merge`] on lock conflicts, up to `attempts`
    /// total tries.
    pub fn merge_with_retry(&self, name: &str, attempts: u32) -> Result<MergeResult, MergeError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.merge(name) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        "event=contact_merge module=merge status=retry attempt={} max_attempts={}",
                        attempt, attempts
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeError, MergeResult, MergeService};
    use crate::db::DbError;
    use crate::repo::contact_repo::{RepoError, RepoResult};
    use crate::repo::merge_repo::{MergeOutcome, MergeRepository};
    use std::cell::Cell;
    use uuid::Uuid;

    fn sqlite_error(code: std::os::raw::c_int) -> RepoError {
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        )))
    }

    struct FlakyRepo {
        failures_left: Cell<u32>,
    }

    impl MergeRepository for FlakyRepo {
        fn merge_by_name(&self, _name: &str) -> RepoResult<MergeOutcome> {
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(sqlite_error(rusqlite::ffi::SQLITE_BUSY));
            }
            Ok(MergeOutcome::NoMatch)
        }
    }

    #[test]
    fn not_found_serializes_with_error_text() {
        let json = serde_json::to_value(MergeResult::NotFound).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": false, "error": "Contact not found"})
        );
    }

    #[test]
    fn merged_serializes_master_fields() {
        let result = MergeResult::Merged {
            master_id: Uuid::nil(),
            master_name: "Ivan Petrov".to_string(),
            deleted_count: 1,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["master_name"], "Ivan Petrov");
        assert_eq!(json["deleted_count"], 1);
        assert_eq!(json["master_id"], Uuid::nil().to_string());
    }

    #[test]
    fn sqlite_codes_map_to_merge_error_kinds() {
        assert!(matches!(
            MergeError::from(sqlite_error(rusqlite::ffi::SQLITE_BUSY)),
            MergeError::TransactionConflict(_)
        ));
        assert!(matches!(
            MergeError::from(sqlite_error(rusqlite::ffi::SQLITE_CONSTRAINT)),
            MergeError::ConstraintViolation(_)
        ));
        assert!(matches!(
            MergeError::from(RepoError::InvalidData("bad".to_string())),
            MergeError::Repo(_)
        ));
    }

    #[test]
    fn retry_recovers_from_transient_conflicts() {
        let service = MergeService::new(FlakyRepo {
            failures_left: Cell::new(2),
        });
        assert_eq!(
            service.merge_with_retry("Ivan", 3).unwrap(),
            MergeResult::NotFound
        );

        let service = MergeService::new(FlakyRepo {
            failures_left: Cell::new(2),
        });
        let err = service.merge_with_retry("Ivan", 2).unwrap_err();
        assert!(err.is_retryable());
    }
}
