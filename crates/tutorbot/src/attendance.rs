//! Attendance registry: per-group rosters and the process-wide code.
//!
//! Each configured group is either closed or open. At most one code is active
//! at a time and it belongs to exactly one open group; a participant message
//! can only ever match that group.

use thiserror::Error;

/// Longest accepted attendance code.
pub const MAX_CODE_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Incorrect group id.")]
    UnknownGroup(String),

    #[error("attendance code must be 1 to {MAX_CODE_LEN} characters, got {0:?}")]
    InvalidCode(String),
}

#[derive(Debug)]
struct Group {
    /// Id as configured (case preserved).
    id: String,
    roster: Vec<String>,
    open: bool,
    /// Code the group was last started with, for reporting.
    code: Option<String>,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub group: String,
    pub code: String,
    /// Group whose intake was closed because this one took over the code.
    pub superseded: Option<String>,
}

/// Result of a stop: the roster snapshot to report and persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stopped {
    pub group: String,
    pub code: Option<String>,
    pub roster: Vec<String>,
}

/// Outcome of offering a participant to the open group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Added { group: String },
    AlreadyListed,
    NotOpen,
}

#[derive(Debug, Default)]
pub struct AttendanceBook {
    groups: Vec<Group>,
    /// Index of the group holding the code, and the code (lower-cased).
    active: Option<(usize, String)>,
}

impl AttendanceBook {
    pub fn new<I, S>(group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: group_ids
                .into_iter()
                .map(|id| Group {
                    id: id.into(),
                    roster: Vec::new(),
                    open: false,
                    code: None,
                })
                .collect(),
            active: None,
        }
    }

    fn find(&self, group: &str) -> Result<usize, AttendanceError> {
        let wanted = group.trim();
        self.groups
            .iter()
            .position(|g| g.id.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AttendanceError::UnknownGroup(group.to_string()))
    }

    /// Open `group` and make `code` the active code.
    ///
    /// A group that held the code before loses it and stops taking entries;
    /// its roster stays until that group is stopped.
    pub fn start(&mut self, group: &str, code: &str) -> Result<Started, AttendanceError> {
        let idx = self.find(group)?;
        let code = normalize(code);
        if code.is_empty() || code.chars().count() > MAX_CODE_LEN {
            return Err(AttendanceError::InvalidCode(code));
        }

        let superseded = match self.active.take() {
            Some((prev, _)) if prev != idx => {
                self.groups[prev].open = false;
                Some(self.groups[prev].id.clone())
            }
            _ => None,
        };

        let entry = &mut self.groups[idx];
        entry.open = true;
        entry.code = Some(code.clone());
        self.active = Some((idx, code.clone()));

        Ok(Started {
            group: entry.id.clone(),
            code,
            superseded,
        })
    }

    /// Close `group`, returning and clearing its roster.
    ///
    /// The active code is cleared only if this group holds it.
    pub fn stop(&mut self, group: &str) -> Result<Stopped, AttendanceError> {
        let idx = self.find(group)?;
        if self.active.as_ref().is_some_and(|(active, _)| *active == idx) {
            self.active = None;
        }

        let entry = &mut self.groups[idx];
        entry.open = false;
        Ok(Stopped {
            group: entry.id.clone(),
            code: entry.code.take(),
            roster: std::mem::take(&mut entry.roster),
        })
    }

    /// Group whose code equals `text` after normalization, if any.
    pub fn matching_group(&self, text: &str) -> Option<&str> {
        let text = normalize(text);
        if text.chars().count() > MAX_CODE_LEN {
            return None;
        }
        let (idx, code) = self.active.as_ref()?;
        let group = &self.groups[*idx];
        (group.open && *code == text).then_some(group.id.as_str())
    }

    /// Add `participant` to the group holding the active code.
    pub fn admit(&mut self, participant: &str) -> Admission {
        let Some((idx, _)) = &self.active else {
            return Admission::NotOpen;
        };
        let group = &mut self.groups[*idx];
        if !group.open {
            return Admission::NotOpen;
        }
        if group.roster.iter().any(|p| p == participant) {
            return Admission::AlreadyListed;
        }
        group.roster.push(participant.to_string());
        Admission::Added {
            group: group.id.clone(),
        }
    }

    pub fn roster(&self, group: &str) -> Option<&[String]> {
        self.find(group)
            .ok()
            .map(|idx| self.groups[idx].roster.as_slice())
    }

    pub fn is_open(&self, group: &str) -> bool {
        self.find(group).is_ok_and(|idx| self.groups[idx].open)
    }

    pub fn active_code(&self) -> Option<&str> {
        self.active.as_ref().map(|(_, code)| code.as_str())
    }

    pub fn group_ids(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.id.as_str())
    }
}

/// Trim surrounding whitespace and lower-case.
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Roster rendered one participant per line for reporting.
pub fn roster_text(roster: &[String]) -> String {
    if roster.is_empty() {
        "No students in attendance.".to_string()
    } else {
        roster.join("\n")
    }
}
