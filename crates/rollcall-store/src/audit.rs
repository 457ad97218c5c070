//! Audit event types

use chrono::{DateTime, Local};
use rollcall_api::Role;
use rollcall_util::{BatchId, CourseId, StudentId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Front end started against this store
    ServiceStarted,

    /// Front end stopped
    ServiceStopped,

    /// Batch opened and fanned out to the roster
    BatchOpened {
        batch_id: BatchId,
        course_id: CourseId,
        lines: usize,
    },

    /// Batch removed with all its lines and weekly details
    BatchDeleted { batch_id: BatchId, lines: usize },

    /// Late enrollment back-filled into existing batches
    EnrollmentReconciled { student_id: StudentId, new_lines: usize },

    /// Weekly presence recorded for a batch
    WeekRecorded {
        batch_id: BatchId,
        month: u32,
        week: u32,
        lines: usize,
    },

    /// Line totals re-derived outside a weekly submission
    LinesRecomputed { lines: usize },

    /// Role scoping rejected a request
    AccessDenied {
        user_id: i64,
        role: Role,
        action: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: rollcall_util::now(),
            event,
        }
    }
}
