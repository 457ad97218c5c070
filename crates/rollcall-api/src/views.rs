//! Read-side views returned by the engine

use chrono::{DateTime, Local, NaiveDate};
use rollcall_util::{BatchId, CourseId, LineId, StudentId, TeacherId};
use serde::{Deserialize, Serialize};

use crate::{CohortKey, FinalStatus, HourSlots};

/// One batch as listed on the batch index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchView {
    pub batch_id: BatchId,
    pub course_id: CourseId,
    pub course_name: String,
    pub teacher_id: TeacherId,
    pub teacher_name: String,
    pub cohort: CohortKey,
    pub start_month: NaiveDate,
    pub end_month: NaiveDate,
    pub created_at: DateTime<Local>,
    pub line_count: usize,
}

/// Result of opening a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedBatch {
    pub batch_id: BatchId,
    pub line_ids: Vec<LineId>,
}

/// Result of recording one week for a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekRecorded {
    pub batch_id: BatchId,
    pub month: u32,
    pub week: u32,
    pub lines_updated: usize,
    pub not_allowed: usize,
}

/// One row of the weekly fill sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    pub line_id: LineId,
    pub student_id: StudentId,
    pub student_name: String,
    /// Slots recorded for the selected week, if any
    pub slots: Option<HourSlots>,
    /// Cumulative verdict over every recorded week
    pub cumulative: FinalStatus,
}

/// Weekly roster of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillSheet {
    pub batch: BatchView,
    /// Month names covered by the batch, in order
    pub months: Vec<String>,
    pub selected_month: String,
    pub selected_week: u32,
    pub rows: Vec<SheetRow>,
}

/// An attendance line as shown in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLineView {
    pub line_id: LineId,
    pub batch_id: BatchId,
    pub student_id: StudentId,
    pub student_name: String,
    pub course_id: CourseId,
    pub course_name: String,
    pub teacher_id: TeacherId,
    pub cohort: CohortKey,
    pub created_at: DateTime<Local>,
    pub hours_present: u32,
    pub hours_absent: u32,
    pub final_status: FinalStatus,
}

/// Per-course attendance summary for one student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course_id: CourseId,
    pub course_name: String,
    pub credit_hours: u32,
    pub hours_present: u32,
    pub hours_absent: u32,
    pub final_status: FinalStatus,
}

/// A course's share of a student's total absent hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAbsence {
    pub course_id: CourseId,
    pub course_name: String,
    pub hours_absent: u32,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDashboard {
    pub student_id: StudentId,
    pub courses: usize,
    pub attendance_lines: usize,
    pub allowed: usize,
    pub not_allowed: usize,
    pub absence_by_course: Vec<CourseAbsence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherDashboard {
    pub teacher_id: TeacherId,
    pub courses_assigned: usize,
    /// Distinct (student, course) pairs across the teacher's batches
    pub students_assigned: usize,
    pub allowed: usize,
    pub not_allowed: usize,
    pub total_hours_present: u32,
    pub total_hours_absent: u32,
}
