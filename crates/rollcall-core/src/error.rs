//! Engine error types

use rollcall_api::{ErrorCode, ErrorInfo};
use rollcall_store::StoreError;
use rollcall_util::{CourseId, StudentId, TeacherId};
use thiserror::Error;

/// Outcomes of an engine call other than success.
///
/// Every variant except `Store` is an expected, user-facing result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A batch already exists for course {course_id} in this cohort")]
    DuplicateBatch { course_id: CourseId },

    #[error("Unknown teacher: {0}")]
    UnknownTeacher(TeacherId),

    #[error("Unknown student: {0}")]
    UnknownStudent(StudentId),

    #[error("Unknown course: {0}")]
    UnknownCourse(CourseId),

    #[error("Invalid week or month: {0}")]
    InvalidWeekOrMonth(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Protocol error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::DuplicateBatch { .. } => ErrorCode::DuplicateBatch,
            EngineError::UnknownTeacher(_) => ErrorCode::UnknownTeacher,
            EngineError::UnknownStudent(_) => ErrorCode::UnknownStudent,
            EngineError::UnknownCourse(_) => ErrorCode::UnknownCourse,
            EngineError::InvalidWeekOrMonth(_) => ErrorCode::InvalidWeekOrMonth,
            EngineError::AccessDenied(_) => ErrorCode::AccessDenied,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::Store(_) => ErrorCode::InternalError,
        }
    }
}

impl From<&EngineError> for ErrorInfo {
    fn from(e: &EngineError) -> Self {
        ErrorInfo::new(e.code(), e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_internal() {
        let err: EngineError = StoreError::Database("disk I/O error".into()).into();
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.to_string(), "Database error: disk I/O error");
    }

    #[test]
    fn error_info_carries_code_and_message() {
        let err = EngineError::UnknownStudent(StudentId::new(7));
        let info = ErrorInfo::from(&err);
        assert_eq!(info.code, ErrorCode::UnknownStudent);
        assert_eq!(info.message, "Unknown student: 7");
    }
}
