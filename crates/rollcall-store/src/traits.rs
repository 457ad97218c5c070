//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use rollcall_api::{
    AttendanceLine, AttendanceLineView, Batch, CohortKey, Course, Enrollment, FinalStatus,
    HourSlots, LineTotals, ReportFilters, Student, Teacher, WeeklyDetail,
};
use rollcall_util::{BatchId, CourseId, LineId, StudentId, TeacherId};

use crate::{AuditEvent, StoreResult};

/// Derives a line's totals from all of its weekly details.
///
/// Supplied by the engine so the store can recompute inside the same
/// transaction as the weekly write.
pub type RecomputeFn<'a> = &'a dyn Fn(&[WeeklyDetail]) -> LineTotals;

/// Read-only source of enrolled students
pub trait Roster: Send + Sync {
    /// Every student enrolled in the cohort cell
    fn list_enrolled(&self, cohort: &CohortKey) -> StoreResult<Vec<StudentId>>;
}

/// Main store trait
pub trait Store: Roster {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Directory

    fn upsert_teacher(&self, teacher: &Teacher) -> StoreResult<()>;

    fn get_teacher(&self, id: TeacherId) -> StoreResult<Option<Teacher>>;

    fn upsert_student(&self, student: &Student) -> StoreResult<()>;

    fn get_student(&self, id: StudentId) -> StoreResult<Option<Student>>;

    fn upsert_course(&self, course: &Course) -> StoreResult<()>;

    fn get_course(&self, id: CourseId) -> StoreResult<Option<Course>>;

    /// Assign a course to a teacher (idempotent)
    fn assign_course(&self, teacher: TeacherId, course: CourseId) -> StoreResult<()>;

    /// Courses assigned to a teacher
    fn teacher_courses(&self, teacher: TeacherId) -> StoreResult<Vec<CourseId>>;

    /// Record an enrollment. Returns false if it already existed.
    fn add_enrollment(&self, enrollment: &Enrollment) -> StoreResult<bool>;

    // Batches

    /// The batch for a course in a cohort cell, matched on
    /// (faculty, department, semester, course)
    fn find_batch_for_course(
        &self,
        cohort: &CohortKey,
        course: CourseId,
    ) -> StoreResult<Option<Batch>>;

    /// Insert a batch and one zero-hour line per student enrolled in its
    /// cohort. The roster is read in the same transaction as the inserts.
    ///
    /// Fails with `StoreError::Conflict` if a batch already exists for the
    /// same (faculty, department, semester, course).
    fn insert_batch(&self, batch: &Batch) -> StoreResult<Vec<LineId>>;

    fn get_batch(&self, id: &BatchId) -> StoreResult<Option<Batch>>;

    fn list_batches(&self, query: &BatchQuery) -> StoreResult<Vec<Batch>>;

    /// Delete a batch, its lines and their weekly details in one transaction.
    /// Returns the number of lines removed.
    fn delete_batch(&self, id: &BatchId) -> StoreResult<usize>;

    // Attendance lines

    fn batch_lines(&self, id: &BatchId) -> StoreResult<Vec<AttendanceLine>>;

    fn batch_line_count(&self, id: &BatchId) -> StoreResult<usize>;

    fn get_line(&self, id: LineId) -> StoreResult<Option<AttendanceLine>>;

    fn all_line_ids(&self) -> StoreResult<Vec<LineId>>;

    /// Whether the student already has a line for this course and date range
    /// in any batch
    fn student_has_line(
        &self,
        student: StudentId,
        course: CourseId,
        start_month: NaiveDate,
        end_month: NaiveDate,
    ) -> StoreResult<bool>;

    /// Insert zero-hour lines in one transaction, skipping any
    /// (batch, student) pair that already has a line. Returns the ids of
    /// the lines actually inserted.
    fn insert_lines(
        &self,
        lines: &[(BatchId, StudentId)],
        created_at: DateTime<Local>,
    ) -> StoreResult<Vec<LineId>>;

    // Weekly details

    fn line_details(&self, line: LineId) -> StoreResult<Vec<WeeklyDetail>>;

    /// Details of every line of a batch for one (month, week)
    fn week_details(&self, batch: &BatchId, month: u32, week: u32)
        -> StoreResult<Vec<WeeklyDetail>>;

    /// Write one (month, week) for every line of the batch, then recompute
    /// the totals of those lines, all in one transaction.
    ///
    /// Lines whose student is missing from `presence` are recorded absent.
    /// Fails with `StoreError::NotFound` if the batch is gone or a student
    /// in `presence` has no line in it.
    fn record_week(
        &self,
        batch: &BatchId,
        month: u32,
        week: u32,
        presence: &[(StudentId, HourSlots)],
        recompute: RecomputeFn<'_>,
    ) -> StoreResult<Vec<(LineId, LineTotals)>>;

    /// Recompute and persist totals for the given lines in one transaction
    fn recompute_lines(
        &self,
        lines: &[LineId],
        recompute: RecomputeFn<'_>,
    ) -> StoreResult<Vec<(LineId, LineTotals)>>;

    // Reports

    /// Attendance lines joined with batch, course and student data
    fn query_lines(&self, query: &LineQuery) -> StoreResult<Vec<AttendanceLineView>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// Filters for listing batches
#[derive(Debug, Clone, Default)]
pub struct BatchQuery {
    pub teacher_id: Option<TeacherId>,
    /// Match all four cohort fields
    pub cohort: Option<CohortKey>,
}

/// Equality predicates for querying attendance lines. All present
/// predicates must hold.
#[derive(Debug, Clone, Default)]
pub struct LineQuery {
    pub status: Option<FinalStatus>,
    pub teacher_id: Option<TeacherId>,
    /// Restrict to one student's lines
    pub student_id: Option<StudentId>,
    /// Restrict to these courses; an empty set matches nothing
    pub course_ids: Option<Vec<CourseId>>,
    pub filters: ReportFilters,
}
