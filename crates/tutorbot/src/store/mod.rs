//! Durable record storage.
//!
//! Collected results are kept as delimited record sets grouped into one
//! directory per activity:
//!
//! - `attendance/{group}_{timestamp}.csv`
//! - `exercise_feedback/{tag}_{topic}_{timestamp}.csv`
//! - `tutor_session_feedback/{group}_{timestamp}.csv`

mod error;
pub mod file;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};

pub use error::{StorageError, StorageResult};
pub use file::FileRecordStore;

/// Timestamp format used in record set names.
const NAME_TIMESTAMP: &str = "%Y-%m-%d_%H-%M";

// ============================================================================
// Keys
// ============================================================================

/// Directory a record set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordDir {
    Attendance,
    ExerciseFeedback,
    TutorSessionFeedback,
}

impl RecordDir {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::ExerciseFeedback => "exercise_feedback",
            Self::TutorSessionFeedback => "tutor_session_feedback",
        }
    }
}

impl fmt::Display for RecordDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one record set: a directory plus a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub dir: RecordDir,
    pub name: String,
}

impl RecordKey {
    /// Key for an attendance roster flushed at `at`.
    pub fn attendance(group: &str, at: DateTime<Local>) -> Self {
        Self {
            dir: RecordDir::Attendance,
            name: format!("{}_{}", sanitize(group), at.format(NAME_TIMESTAMP)),
        }
    }

    /// Key for survey results, tagged `CS` (chained) or `SS` (single view).
    pub fn survey(tag: &str, topic: &str, at: DateTime<Local>) -> Self {
        Self {
            dir: RecordDir::ExerciseFeedback,
            name: format!("{}_{}_{}", tag, sanitize(topic), at.format(NAME_TIMESTAMP)),
        }
    }

    /// Key for a tutor-session feedback form created at `at`.
    pub fn tutor_feedback(group: &str, at: DateTime<Local>) -> Self {
        Self {
            dir: RecordDir::TutorSessionFeedback,
            name: format!("{}_{}", sanitize(group), at.format(NAME_TIMESTAMP)),
        }
    }

    /// Key for a stored set by its file stem, as returned by
    /// [`RecordStore::list`]. `None` for names no key of this store could
    /// produce, which covers anything with a path separator.
    pub fn existing(dir: RecordDir, name: &str) -> Option<Self> {
        if name.is_empty() || sanitize(name) != name {
            return None;
        }
        Some(Self {
            dir,
            name: name.to_string(),
        })
    }

    /// Sibling set for records whose columns do not fit this one, e.g.
    /// `SS_loops_2024-05-06_14-30_2`.
    pub fn numbered(&self, n: u32) -> Self {
        Self {
            dir: self.dir,
            name: format!("{}_{}", self.name, n),
        }
    }

    /// Path of the record set relative to the data root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.dir.as_str()).join(format!("{}.csv", self.name))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.csv", self.dir, self.name)
    }
}

/// Replace characters that are unsafe in file names.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// Records
// ============================================================================

/// One row: ordered column/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A header plus rows, as read back from (or written to) a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Single-column table, one row per value.
    pub fn single_column(column: impl Into<String>, values: &[String]) -> Self {
        Self {
            header: vec![column.into()],
            rows: values.iter().map(|v| vec![v.clone()]).collect(),
        }
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.header.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// Result of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A row with the same identity value already exists.
    Duplicate,
}

// ============================================================================
// Store trait
// ============================================================================

/// Storage backend for collected records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write a whole record set, replacing any existing one under `key`.
    ///
    /// Returns the location written to.
    async fn write_table(&self, key: &RecordKey, table: &Table) -> StorageResult<PathBuf>;

    /// Append `record` unless a row whose `unique_column` equals the record's
    /// value for that column already exists. Creates the set (with a header
    /// taken from the record) if absent.
    async fn append_unique(
        &self,
        key: &RecordKey,
        record: &Record,
        unique_column: &str,
    ) -> StorageResult<AppendOutcome>;

    /// Read a record set back.
    async fn read_table(&self, key: &RecordKey) -> StorageResult<Table>;

    /// List record set names (file stems) in a directory, sorted.
    async fn list(&self, dir: RecordDir) -> StorageResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap()
    }

    #[test]
    fn existing_rejects_names_that_leave_the_directory() {
        let key = RecordKey::existing(RecordDir::Attendance, "g1_2024-03-05_14-07").unwrap();
        assert_eq!(key.relative_path(), PathBuf::from("attendance/g1_2024-03-05_14-07.csv"));

        for name in ["", "../secrets", "..\\secrets", "/etc/passwd", "a/b", "c:x"] {
            assert_eq!(RecordKey::existing(RecordDir::Attendance, name), None, "{name}");
        }
    }

    #[test]
    fn keys_follow_directory_layout() {
        assert_eq!(
            RecordKey::attendance("g1", at()).relative_path(),
            PathBuf::from("attendance/g1_2024-03-05_14-07.csv")
        );
        assert_eq!(
            RecordKey::survey("CS", "T01E01", at()).to_string(),
            "exercise_feedback/CS_T01E01_2024-03-05_14-07.csv"
        );
        assert_eq!(
            RecordKey::tutor_feedback("g5", at()).dir,
            RecordDir::TutorSessionFeedback
        );
    }

    #[test]
    fn key_names_are_sanitized() {
        let key = RecordKey::survey("SS", "week 3/../x", at());
        assert_eq!(key.name, "SS_week 3_.._x_2024-03-05_14-07");
    }

    #[test]
    fn record_keeps_column_order() {
        let record = Record::new().with("Name", "Ann").with("Q1", "Easy");
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["Name", "Q1"]);
        assert_eq!(record.get("Q1"), Some("Easy"));
        assert_eq!(record.get("Q2"), None);
    }
}
