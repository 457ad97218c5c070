//! Attendance engine

use rollcall_api::{
    Batch, BatchView, CallerContext, Course, Role, Student, Teacher,
};
use rollcall_config::Policy;
use rollcall_store::{AuditEvent, AuditEventType, Store};
use rollcall_util::{BatchId, CourseId, TeacherId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{EngineError, EngineResult};

/// The attendance engine.
///
/// Stateless apart from the policy; every call runs against the store and
/// every multi-row write is a single store transaction.
pub struct AttendanceEngine {
    pub(crate) policy: Policy,
    pub(crate) store: Arc<dyn Store>,
}

impl AttendanceEngine {
    /// Create a new engine
    pub fn new(policy: Policy, store: Arc<dyn Store>) -> Self {
        info!(
            absence_threshold_hours = policy.attendance.absence_threshold_hours,
            "Attendance engine initialized"
        );

        Self { policy, store }
    }

    /// Get current policy
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Absent hours a line may accumulate before it becomes Not Allowed
    pub fn threshold(&self) -> u32 {
        self.policy.attendance.absence_threshold_hours
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    // Directory

    pub fn register_teacher(&self, caller: &CallerContext, teacher: &Teacher) -> EngineResult<()> {
        self.require_admin(caller, "register_teacher")?;
        self.store.upsert_teacher(teacher)?;
        Ok(())
    }

    pub fn register_student(&self, caller: &CallerContext, student: &Student) -> EngineResult<()> {
        self.require_admin(caller, "register_student")?;
        self.store.upsert_student(student)?;
        Ok(())
    }

    pub fn register_course(&self, caller: &CallerContext, course: &Course) -> EngineResult<()> {
        self.require_admin(caller, "register_course")?;
        self.store.upsert_course(course)?;
        Ok(())
    }

    /// Add a course to a teacher's assigned set
    pub fn assign_course(
        &self,
        caller: &CallerContext,
        teacher_id: TeacherId,
        course_id: CourseId,
    ) -> EngineResult<()> {
        self.require_admin(caller, "assign_course")?;
        if self.store.get_teacher(teacher_id)?.is_none() {
            return Err(EngineError::UnknownTeacher(teacher_id));
        }
        if self.store.get_course(course_id)?.is_none() {
            return Err(EngineError::UnknownCourse(course_id));
        }
        self.store.assign_course(teacher_id, course_id)?;
        Ok(())
    }

    // Access control

    /// Reject the call unless the caller is an admin
    pub(crate) fn require_admin(&self, caller: &CallerContext, action: &str) -> EngineResult<()> {
        if caller.role.can_manage_batches() {
            Ok(())
        } else {
            Err(self.deny(caller, action))
        }
    }

    /// Writes to a batch: admin, or the teacher the batch belongs to
    pub(crate) fn require_batch_writer(
        &self,
        caller: &CallerContext,
        batch: &Batch,
        action: &str,
    ) -> EngineResult<()> {
        let allowed = match caller.role {
            Role::Admin => true,
            Role::Teacher => caller.teacher_id == Some(batch.teacher_id),
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(self.deny(caller, action))
        }
    }

    /// Reads of a batch: admin, staff, or the batch's teacher
    pub(crate) fn require_batch_reader(
        &self,
        caller: &CallerContext,
        batch: &Batch,
        action: &str,
    ) -> EngineResult<()> {
        if caller.role == Role::Staff {
            return Ok(());
        }
        self.require_batch_writer(caller, batch, action)
    }

    /// Log and audit a refused call, returning the error to hand back
    pub(crate) fn deny(&self, caller: &CallerContext, action: &str) -> EngineError {
        warn!(
            user_id = caller.user_id,
            role = ?caller.role,
            action,
            "Access denied"
        );
        self.audit(AuditEventType::AccessDenied {
            user_id: caller.user_id,
            role: caller.role,
            action: action.to_string(),
        });
        EngineError::AccessDenied(format!("{:?} may not {}", caller.role, action))
    }

    // Helpers

    pub(crate) fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }

    pub(crate) fn load_batch(&self, id: &BatchId) -> EngineResult<Batch> {
        self.store
            .get_batch(id)?
            .ok_or_else(|| EngineError::NotFound(format!("batch {}", id)))
    }

    pub(crate) fn batch_view(&self, batch: &Batch) -> EngineResult<BatchView> {
        let course_name = self
            .store
            .get_course(batch.course_id)?
            .map(|c| c.name)
            .unwrap_or_default();
        let teacher_name = self
            .store
            .get_teacher(batch.teacher_id)?
            .map(|t| t.full_name())
            .unwrap_or_default();
        let line_count = self.store.batch_line_count(&batch.id)?;

        debug!(batch_id = %batch.id, line_count, "Batch view built");

        Ok(BatchView {
            batch_id: batch.id,
            course_id: batch.course_id,
            course_name,
            teacher_id: batch.teacher_id,
            teacher_name,
            cohort: batch.cohort,
            start_month: batch.start_month,
            end_month: batch.end_month,
            created_at: batch.created_at,
            line_count,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the engine's unit tests

    use super::*;
    use chrono::NaiveDate;
    use rollcall_api::CohortKey;
    use rollcall_store::SqliteStore;
    use rollcall_util::{AcademicYearId, DepartmentId, FacultyId, SemesterId, StudentId};

    pub const ADMIN: i64 = 1;

    pub fn cohort() -> CohortKey {
        CohortKey {
            faculty_id: FacultyId::new(1),
            department_id: DepartmentId::new(3),
            academic_year_id: AcademicYearId::new(2025),
            semester_id: SemesterId::new(2),
        }
    }

    pub fn month(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, 1).unwrap()
    }

    pub fn admin() -> CallerContext {
        CallerContext::admin(ADMIN)
    }

    pub fn teacher(id: i64) -> Teacher {
        Teacher {
            id: TeacherId::new(id),
            first_name: format!("Teacher{}", id),
            middle_name: String::new(),
            last_name: "Staff".into(),
        }
    }

    pub fn student(id: i64, first_name: &str) -> Student {
        Student {
            id: StudentId::new(id),
            roll_id: format!("R-{:03}", id),
            first_name: first_name.into(),
            middle_name: String::new(),
            last_name: "Test".into(),
        }
    }

    pub fn course(id: i64, name: &str) -> Course {
        Course {
            id: CourseId::new(id),
            name: name.into(),
            credit_hours: 3,
            faculty_id: FacultyId::new(1),
            department_id: DepartmentId::new(3),
            semester_id: SemesterId::new(2),
        }
    }

    /// Engine over an in-memory store with two teachers, two courses
    /// (course 10 taught by teacher 1, course 20 by teacher 2) and the
    /// given students enrolled in [`cohort`]
    pub fn engine_with(students: &[(i64, &str)]) -> AttendanceEngine {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = AttendanceEngine::new(Policy::default(), store);
        let admin = admin();

        engine.register_teacher(&admin, &teacher(1)).unwrap();
        engine.register_teacher(&admin, &teacher(2)).unwrap();
        engine.register_course(&admin, &course(10, "Databases")).unwrap();
        engine.register_course(&admin, &course(20, "Algorithms")).unwrap();
        engine
            .assign_course(&admin, TeacherId::new(1), CourseId::new(10))
            .unwrap();
        engine
            .assign_course(&admin, TeacherId::new(2), CourseId::new(20))
            .unwrap();

        for &(id, name) in students {
            engine.register_student(&admin, &student(id, name)).unwrap();
            engine
                .enroll_student(&admin, StudentId::new(id), &cohort())
                .unwrap();
        }
        engine
    }

    pub fn spec(course: i64, teacher: i64) -> rollcall_api::BatchSpec {
        rollcall_api::BatchSpec {
            course_id: CourseId::new(course),
            teacher_id: TeacherId::new(teacher),
            cohort: cohort(),
            start_month: month(2),
            end_month: month(4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_only_admin_registers() {
        let engine = engine_with(&[]);
        let staff = CallerContext::staff(5);

        let result = engine.register_teacher(&staff, &teacher(3));
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let audits = engine.store.get_recent_audits(1).unwrap();
        assert!(matches!(
            audits[0].event,
            AuditEventType::AccessDenied { user_id: 5, .. }
        ));
    }

    #[test]
    fn test_assign_course_checks_references() {
        let engine = engine_with(&[]);
        let result = engine.assign_course(&admin(), TeacherId::new(99), CourseId::new(10));
        assert!(matches!(result, Err(EngineError::UnknownTeacher(_))));

        let result = engine.assign_course(&admin(), TeacherId::new(1), CourseId::new(99));
        assert!(matches!(result, Err(EngineError::UnknownCourse(_))));
    }

    #[test]
    fn test_threshold_from_policy() {
        let engine = engine_with(&[]);
        assert_eq!(engine.threshold(), 12);
        assert!(engine.is_healthy());
    }
}
