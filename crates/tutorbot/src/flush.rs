//! Persisting collected results.
//!
//! Both functions are pure with respect to engine state: they only talk to
//! the store, so callers can finish their state transition first and report
//! a storage failure separately.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::store::{
    AppendOutcome, Record, RecordKey, RecordStore, StorageError, StorageResult, Table,
};
use crate::survey::NAME_COLUMN;

/// Column of an attendance record set.
pub const ATTENDANCE_COLUMN: &str = "Attendance";

/// Sibling sets tried before a column mismatch is reported as an error.
const MAX_SIBLINGS: u32 = 20;

/// Counts from an idempotent flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub appended: usize,
    /// Records skipped because their participant was already stored.
    pub duplicates: usize,
}

/// Write a group's roster as one single-column record set.
pub async fn flush_roster(
    store: &dyn RecordStore,
    group: &str,
    roster: &[String],
    at: DateTime<Local>,
) -> StorageResult<PathBuf> {
    let key = RecordKey::attendance(group, at);
    store
        .write_table(&key, &Table::single_column(ATTENDANCE_COLUMN, roster))
        .await
}

/// Append records keyed by participant name, skipping names already stored.
///
/// A record whose columns do not fit the set under `key` (another survey on
/// the same topic flushed in the same minute) goes to the numbered sibling
/// set `{key}_2`, `{key}_3` and so on. Stops at the first other storage
/// error; records before it stay written.
pub async fn flush_records<I>(
    store: &dyn RecordStore,
    key: &RecordKey,
    records: I,
) -> StorageResult<FlushSummary>
where
    I: IntoIterator<Item = Record>,
{
    let mut summary = FlushSummary::default();
    let mut target = key.clone();
    let mut sibling = 1;
    for record in records {
        loop {
            match store.append_unique(&target, &record, NAME_COLUMN).await {
                Ok(AppendOutcome::Appended) => {
                    summary.appended += 1;
                    break;
                }
                Ok(AppendOutcome::Duplicate) => {
                    debug!(key = %target, name = record.get(NAME_COLUMN), "Record already stored");
                    summary.duplicates += 1;
                    break;
                }
                Err(StorageError::UnknownColumn { column, .. }) if sibling < MAX_SIBLINGS => {
                    sibling += 1;
                    let next = key.numbered(sibling);
                    warn!(
                        key = %target,
                        column = %column,
                        next = %next,
                        "Columns differ; using sibling record set"
                    );
                    target = next;
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(summary)
}
