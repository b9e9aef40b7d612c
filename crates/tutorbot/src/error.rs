//! Errors surfaced by engine operations.

use thiserror::Error;
use tutorbot_gateway_protocol::TransportError;

use crate::attendance::AttendanceError;
use crate::store::StorageError;
use crate::survey::SurveyError;

/// Message shown to actors without the admin role.
pub const PERMISSION_DENIED: &str = "You lack the permissions to use this command!";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    #[error(transparent)]
    Survey(#[from] SurveyError),

    #[error("{}", PERMISSION_DENIED)]
    PermissionDenied,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("chat transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience type alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
