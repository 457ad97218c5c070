//! Batch fan-out and enrollment reconciliation

use rollcall_api::{Batch, BatchSpec, BatchView, CallerContext, CohortKey, Enrollment, OpenedBatch, Role};
use rollcall_store::{AuditEventType, BatchQuery, StoreError};
use rollcall_util::{first_of_month, months_in_range, BatchId, LineId, StudentId};
use tracing::{debug, info};

use crate::{distinct_batches, AttendanceEngine, EngineError, EngineResult};

/// Weekly details are keyed by month number, so a batch may not cover the
/// same calendar month twice
const MAX_BATCH_MONTHS: usize = 12;

impl AttendanceEngine {
    /// Open a batch and create one zero-hour line per enrolled student.
    ///
    /// The roster read, the batch and all of its lines share one
    /// transaction, so an enrollment racing the open either lands in the
    /// batch or finds it when it reconciles. A
    /// concurrent open for the same (faculty, department, semester, course)
    /// loses on the store's uniqueness constraint and reports
    /// `DuplicateBatch`.
    pub fn open_batch(&self, caller: &CallerContext, spec: &BatchSpec) -> EngineResult<OpenedBatch> {
        self.require_admin(caller, "open_batch")?;

        if self.store.get_course(spec.course_id)?.is_none() {
            return Err(EngineError::UnknownCourse(spec.course_id));
        }
        if self.store.get_teacher(spec.teacher_id)?.is_none() {
            return Err(EngineError::UnknownTeacher(spec.teacher_id));
        }

        let start_month = first_of_month(spec.start_month);
        let end_month = first_of_month(spec.end_month);
        if end_month < start_month {
            return Err(EngineError::InvalidWeekOrMonth(format!(
                "batch ends ({}) before it starts ({})",
                end_month, start_month
            )));
        }
        let months = months_in_range(start_month, end_month).len();
        if months > MAX_BATCH_MONTHS {
            return Err(EngineError::InvalidWeekOrMonth(format!(
                "batch spans {} months, at most {} allowed",
                months, MAX_BATCH_MONTHS
            )));
        }

        if self
            .store
            .find_batch_for_course(&spec.cohort, spec.course_id)?
            .is_some()
        {
            return Err(EngineError::DuplicateBatch {
                course_id: spec.course_id,
            });
        }

        let batch = Batch {
            id: BatchId::new(),
            course_id: spec.course_id,
            teacher_id: spec.teacher_id,
            cohort: spec.cohort,
            start_month,
            end_month,
            created_at: rollcall_util::now(),
        };

        let line_ids = match self.store.insert_batch(&batch) {
            Ok(ids) => ids,
            Err(StoreError::Conflict(msg)) => {
                // Lost a race with another open for the same course cell
                if self
                    .store
                    .find_batch_for_course(&spec.cohort, spec.course_id)?
                    .is_some()
                {
                    debug!(course_id = %spec.course_id, "Concurrent batch open rejected");
                    return Err(EngineError::DuplicateBatch {
                        course_id: spec.course_id,
                    });
                }
                return Err(StoreError::Conflict(msg).into());
            }
            Err(e) => return Err(e.into()),
        };

        self.audit(AuditEventType::BatchOpened {
            batch_id: batch.id,
            course_id: batch.course_id,
            lines: line_ids.len(),
        });

        info!(
            batch_id = %batch.id,
            course_id = %batch.course_id,
            teacher_id = %batch.teacher_id,
            lines = line_ids.len(),
            "Batch opened"
        );

        Ok(OpenedBatch {
            batch_id: batch.id,
            line_ids,
        })
    }

    /// Record an enrollment and back-fill the student into the cohort's
    /// existing batches
    pub fn enroll_student(
        &self,
        caller: &CallerContext,
        student_id: StudentId,
        cohort: &CohortKey,
    ) -> EngineResult<Vec<LineId>> {
        self.require_admin(caller, "enroll_student")?;

        if self.store.get_student(student_id)?.is_none() {
            return Err(EngineError::UnknownStudent(student_id));
        }

        let added = self.store.add_enrollment(&Enrollment {
            student_id,
            cohort: *cohort,
        })?;
        debug!(student_id = %student_id, new_enrollment = added, "Enrollment recorded");

        self.reconcile(student_id, cohort)
    }

    /// Back-fill a newly enrolled student into existing batches of a cohort.
    ///
    /// Running it again for the same student and cohort adds nothing, and a
    /// student not enrolled in the cohort is left alone.
    pub fn reconcile_enrollment(
        &self,
        caller: &CallerContext,
        student_id: StudentId,
        cohort: &CohortKey,
    ) -> EngineResult<Vec<LineId>> {
        self.require_admin(caller, "reconcile_enrollment")?;

        if self.store.get_student(student_id)?.is_none() {
            return Err(EngineError::UnknownStudent(student_id));
        }
        if !self.store.list_enrolled(cohort)?.contains(&student_id) {
            debug!(student_id = %student_id, "Not enrolled in cohort, nothing to reconcile");
            return Ok(Vec::new());
        }

        self.reconcile(student_id, cohort)
    }

    fn reconcile(&self, student_id: StudentId, cohort: &CohortKey) -> EngineResult<Vec<LineId>> {
        let batches = distinct_batches(self.store.list_batches(&BatchQuery {
            cohort: Some(*cohort),
            ..Default::default()
        })?);

        let mut pending = Vec::new();
        for batch in &batches {
            let has_line = self.store.student_has_line(
                student_id,
                batch.course_id,
                batch.start_month,
                batch.end_month,
            )?;
            if !has_line {
                pending.push((batch.id, student_id));
            }
        }

        if pending.is_empty() {
            debug!(student_id = %student_id, batches = batches.len(), "Nothing to reconcile");
            return Ok(Vec::new());
        }

        let inserted = self.store.insert_lines(&pending, rollcall_util::now())?;

        self.audit(AuditEventType::EnrollmentReconciled {
            student_id,
            new_lines: inserted.len(),
        });
        info!(
            student_id = %student_id,
            batches = batches.len(),
            new_lines = inserted.len(),
            "Enrollment reconciled"
        );

        Ok(inserted)
    }

    /// Remove a batch with all its lines and their weekly details
    pub fn delete_batch(&self, caller: &CallerContext, batch_id: &BatchId) -> EngineResult<usize> {
        self.require_admin(caller, "delete_batch")?;

        let lines = match self.store.delete_batch(batch_id) {
            Ok(lines) => lines,
            Err(StoreError::NotFound(what)) => return Err(EngineError::NotFound(what)),
            Err(e) => return Err(e.into()),
        };

        self.audit(AuditEventType::BatchDeleted {
            batch_id: *batch_id,
            lines,
        });
        info!(batch_id = %batch_id, lines, "Batch deleted");

        Ok(lines)
    }

    /// Batches visible to the caller: all for admin and staff, their own
    /// for a teacher
    pub fn list_batches(&self, caller: &CallerContext) -> EngineResult<Vec<BatchView>> {
        let query = match caller.role {
            Role::Admin | Role::Staff => BatchQuery::default(),
            Role::Teacher => match caller.teacher_id {
                Some(teacher_id) => BatchQuery {
                    teacher_id: Some(teacher_id),
                    ..Default::default()
                },
                None => return Err(self.deny(caller, "list_batches")),
            },
            Role::Student | Role::Unknown => return Err(self.deny(caller, "list_batches")),
        };

        self.store
            .list_batches(&query)?
            .iter()
            .map(|batch| self.batch_view(batch))
            .collect()
    }
}
