//! Command types for the rollcall NDJSON protocol

use rollcall_util::{BatchId, LineId, StudentId, TeacherId, CourseId};
use serde::{Deserialize, Serialize};

use crate::{
    AttendanceLineView, BatchSpec, BatchView, CallerContext, CohortKey, Course, CourseSummary,
    FillSheet, OpenedBatch, ReportFilters, Student, StudentDashboard, Teacher, TeacherDashboard,
    WeekRecorded, WeekSubmission, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Who is asking
    pub caller: CallerContext,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, caller: CallerContext, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            caller,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    DuplicateBatch,
    UnknownTeacher,
    UnknownStudent,
    UnknownCourse,
    InvalidWeekOrMonth,
    AccessDenied,
    NotFound,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Directory (admin only)
    RegisterTeacher { teacher: Teacher },
    RegisterStudent { student: Student },
    RegisterCourse { course: Course },
    AssignCourse { teacher_id: TeacherId, course_id: CourseId },

    /// Record an enrollment and back-fill the student into existing batches
    EnrollStudent { student_id: StudentId, cohort: CohortKey },

    /// Back-fill only; the enrollment must already be known to the caller
    ReconcileEnrollment { student_id: StudentId, cohort: CohortKey },

    // Batch lifecycle
    OpenBatch { spec: BatchSpec },
    DeleteBatch { batch_id: BatchId },
    ListBatches,
    FillSheet {
        batch_id: BatchId,
        #[serde(default)]
        month: Option<String>,
        #[serde(default)]
        week: Option<u32>,
    },
    RecordWeek { batch_id: BatchId, submission: WeekSubmission },

    // Repair
    RecomputeLine { line_id: LineId },
    RecomputeAll,

    // Reports
    ListNotAllowed {
        #[serde(default)]
        filters: ReportFilters,
    },
    SummarizeByCourse { student_id: StudentId },
    StudentDashboard { student_id: StudentId },
    TeacherDashboard { teacher_id: TeacherId },

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Registered,
    Enrolled { new_lines: Vec<LineId> },
    BatchOpened(OpenedBatch),
    BatchDeleted { batch_id: BatchId, lines_removed: usize },
    Batches { batches: Vec<BatchView> },
    Sheet(FillSheet),
    WeekRecorded(WeekRecorded),
    Recomputed { lines: usize },
    NotAllowed { lines: Vec<AttendanceLineView> },
    CourseSummaries { courses: Vec<CourseSummary> },
    StudentDashboard(StudentDashboard),
    TeacherDashboard(TeacherDashboard),
    Health { store_healthy: bool },
    Pong,
}
