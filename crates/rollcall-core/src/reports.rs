//! Role-scoped reports and dashboards

use rollcall_api::{
    AttendanceLineView, CallerContext, CourseAbsence, CourseSummary, FinalStatus, ReportFilters,
    Role, StudentDashboard, TeacherDashboard,
};
use rollcall_store::LineQuery;
use rollcall_util::{CourseId, StudentId, TeacherId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::{AttendanceEngine, EngineError, EngineResult};

impl AttendanceEngine {
    /// Narrow a line query to what the caller may see.
    ///
    /// Filters already on the query are kept, so they can only narrow the
    /// scope further.
    fn scope_query(
        &self,
        caller: &CallerContext,
        query: &mut LineQuery,
        action: &str,
    ) -> EngineResult<()> {
        match caller.role {
            Role::Admin | Role::Staff => {}
            Role::Teacher => {
                let teacher_id = caller.teacher_id.ok_or_else(|| self.deny(caller, action))?;
                query.course_ids = Some(self.store.teacher_courses(teacher_id)?);
            }
            Role::Student => {
                let student_id = caller.student_id.ok_or_else(|| self.deny(caller, action))?;
                query.student_id = Some(student_id);
            }
            Role::Unknown => return Err(self.deny(caller, action)),
        }
        Ok(())
    }

    /// Students may read their own records; admin and staff anyone's
    fn require_student_reader(
        &self,
        caller: &CallerContext,
        student_id: StudentId,
        action: &str,
    ) -> EngineResult<()> {
        let allowed = caller.role.is_unrestricted()
            || (caller.role == Role::Student && caller.student_id == Some(student_id));
        if allowed {
            Ok(())
        } else {
            Err(self.deny(caller, action))
        }
    }

    fn student_lines(&self, student_id: StudentId) -> EngineResult<Vec<AttendanceLineView>> {
        if self.store.get_student(student_id)?.is_none() {
            return Err(EngineError::UnknownStudent(student_id));
        }
        let lines = self.store.query_lines(&LineQuery {
            student_id: Some(student_id),
            ..Default::default()
        })?;
        Ok(lines)
    }

    /// Not Allowed lines visible to the caller, narrowed by the filters
    pub fn list_not_allowed(
        &self,
        caller: &CallerContext,
        filters: &ReportFilters,
    ) -> EngineResult<Vec<AttendanceLineView>> {
        let mut query = LineQuery {
            status: Some(FinalStatus::NotAllowed),
            filters: filters.clone(),
            ..Default::default()
        };
        self.scope_query(caller, &mut query, "list_not_allowed")?;

        let lines = self.store.query_lines(&query)?;
        debug!(
            user_id = caller.user_id,
            role = ?caller.role,
            lines = lines.len(),
            "Not allowed report"
        );
        Ok(lines)
    }

    /// One row per course the student has lines in, with hours summed over
    /// those lines and the worst verdict among them
    pub fn summarize_by_course(
        &self,
        caller: &CallerContext,
        student_id: StudentId,
    ) -> EngineResult<Vec<CourseSummary>> {
        self.require_student_reader(caller, student_id, "summarize_by_course")?;

        let mut by_course: BTreeMap<CourseId, CourseSummary> = BTreeMap::new();
        for line in self.student_lines(student_id)? {
            let summary = by_course.entry(line.course_id).or_insert_with(|| CourseSummary {
                course_id: line.course_id,
                course_name: line.course_name.clone(),
                credit_hours: 0,
                hours_present: 0,
                hours_absent: 0,
                final_status: FinalStatus::Allowed,
            });
            summary.hours_present += line.hours_present;
            summary.hours_absent += line.hours_absent;
            summary.final_status = summary.final_status.dominate(line.final_status);
        }

        let mut summaries = Vec::with_capacity(by_course.len());
        for (course_id, mut summary) in by_course {
            if let Some(course) = self.store.get_course(course_id)? {
                summary.credit_hours = course.credit_hours;
            }
            summaries.push(summary);
        }
        summaries.sort_by(|a, b| a.course_name.cmp(&b.course_name));

        Ok(summaries)
    }

    pub fn student_dashboard(
        &self,
        caller: &CallerContext,
        student_id: StudentId,
    ) -> EngineResult<StudentDashboard> {
        self.require_student_reader(caller, student_id, "student_dashboard")?;

        let lines = self.student_lines(student_id)?;
        let allowed = lines.iter().filter(|l| l.final_status.is_allowed()).count();

        let mut absent_by_course: BTreeMap<CourseId, (String, u32)> = BTreeMap::new();
        for line in &lines {
            let entry = absent_by_course
                .entry(line.course_id)
                .or_insert_with(|| (line.course_name.clone(), 0));
            entry.1 += line.hours_absent;
        }

        let total_absent: u32 = absent_by_course.values().map(|(_, h)| h).sum();
        let absence_by_course = absent_by_course
            .into_iter()
            .map(|(course_id, (course_name, hours_absent))| CourseAbsence {
                course_id,
                course_name,
                hours_absent,
                percent_of_total: if total_absent > 0 {
                    f64::from(hours_absent) * 100.0 / f64::from(total_absent)
                } else {
                    0.0
                },
            })
            .collect::<Vec<_>>();

        Ok(StudentDashboard {
            student_id,
            courses: absence_by_course.len(),
            attendance_lines: lines.len(),
            allowed,
            not_allowed: lines.len() - allowed,
            absence_by_course,
        })
    }

    pub fn teacher_dashboard(
        &self,
        caller: &CallerContext,
        teacher_id: TeacherId,
    ) -> EngineResult<TeacherDashboard> {
        let allowed = caller.role.is_unrestricted()
            || (caller.role == Role::Teacher && caller.teacher_id == Some(teacher_id));
        if !allowed {
            return Err(self.deny(caller, "teacher_dashboard"));
        }
        if self.store.get_teacher(teacher_id)?.is_none() {
            return Err(EngineError::UnknownTeacher(teacher_id));
        }

        let courses_assigned = self.store.teacher_courses(teacher_id)?.len();
        let lines = self.store.query_lines(&LineQuery {
            teacher_id: Some(teacher_id),
            ..Default::default()
        })?;

        // Latest verdict per (student, course)
        let mut latest: HashMap<(StudentId, CourseId), &AttendanceLineView> = HashMap::new();
        for line in &lines {
            let key = (line.student_id, line.course_id);
            let newer = latest
                .get(&key)
                .is_none_or(|seen| (line.created_at, line.line_id) > (seen.created_at, seen.line_id));
            if newer {
                latest.insert(key, line);
            }
        }
        let allowed = latest.values().filter(|l| l.final_status.is_allowed()).count();

        Ok(TeacherDashboard {
            teacher_id,
            courses_assigned,
            students_assigned: latest.len(),
            allowed,
            not_allowed: latest.len() - allowed,
            total_hours_present: lines.iter().map(|l| l.hours_present).sum(),
            total_hours_absent: lines.iter().map(|l| l.hours_absent).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::*;
    use crate::*;
    use rollcall_api::{
        CallerContext, FinalStatus, HourSlots, ReportFilters, StudentPresence, WeekSubmission,
    };
    use rollcall_util::{BatchId, CourseId, SemesterId, StudentId, TeacherId};

    /// Record enough all-absent weeks to push every listed student past
    /// the threshold, with everyone else fully present
    fn fail_students(engine: &AttendanceEngine, batch: &BatchId, failing: &[i64], everyone: &[i64]) {
        let presence: Vec<_> = everyone
            .iter()
            .filter(|&&id| !failing.contains(&id))
            .map(|&id| StudentPresence {
                student_id: StudentId::new(id),
                slots: HourSlots::new(true, true, true),
            })
            .collect();
        for week in 1..=5 {
            engine
                .record_week(
                    &admin(),
                    batch,
                    &WeekSubmission {
                        month: "March".into(),
                        week,
                        presence: presence.clone(),
                    },
                )
                .unwrap();
        }
    }

    /// Students 1-3 enrolled; Databases (teacher 1) and Algorithms
    /// (teacher 2) opened. Student 1 fails Databases, students 1 and 2 fail
    /// Algorithms.
    fn reporting_engine() -> AttendanceEngine {
        let engine = engine_with(&[(1, "Asha"), (2, "Bilal"), (3, "Chen")]);
        let databases = engine.open_batch(&admin(), &spec(10, 1)).unwrap().batch_id;
        let algorithms = engine.open_batch(&admin(), &spec(20, 2)).unwrap().batch_id;
        fail_students(&engine, &databases, &[1], &[1, 2, 3]);
        fail_students(&engine, &algorithms, &[1, 2], &[1, 2, 3]);
        engine
    }

    #[test]
    fn test_admin_and_staff_see_everything() {
        let engine = reporting_engine();
        let lines = engine
            .list_not_allowed(&admin(), &ReportFilters::default())
            .unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.final_status == FinalStatus::NotAllowed));

        let staff = engine
            .list_not_allowed(&CallerContext::staff(2), &ReportFilters::default())
            .unwrap();
        assert_eq!(staff.len(), 3);
    }

    #[test]
    fn test_teacher_sees_only_assigned_courses() {
        let engine = reporting_engine();
        let teacher = CallerContext::teacher(21, TeacherId::new(1));

        let lines = engine
            .list_not_allowed(&teacher, &ReportFilters::default())
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].course_id, CourseId::new(10));

        // Asking for another teacher's course narrows to nothing
        let filters = ReportFilters {
            course_id: Some(CourseId::new(20)),
            ..Default::default()
        };
        assert!(engine.list_not_allowed(&teacher, &filters).unwrap().is_empty());
    }

    #[test]
    fn test_teacher_without_courses_sees_nothing() {
        let engine = reporting_engine();
        engine.register_teacher(&admin(), &teacher(3)).unwrap();
        let teacher = CallerContext::teacher(22, TeacherId::new(3));
        assert!(engine
            .list_not_allowed(&teacher, &ReportFilters::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_student_sees_only_own_lines() {
        let engine = reporting_engine();
        let student = CallerContext::student(31, StudentId::new(2));

        let lines = engine
            .list_not_allowed(&student, &ReportFilters::default())
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].student_id, StudentId::new(2));

        let filters = ReportFilters {
            student_id: Some(StudentId::new(1)),
            ..Default::default()
        };
        assert!(engine.list_not_allowed(&student, &filters).unwrap().is_empty());
    }

    #[test]
    fn test_filters_narrow_admin_view() {
        let engine = reporting_engine();
        let filters = ReportFilters {
            student_id: Some(StudentId::new(1)),
            ..Default::default()
        };
        assert_eq!(engine.list_not_allowed(&admin(), &filters).unwrap().len(), 2);

        let filters = ReportFilters {
            semester_id: Some(SemesterId::new(9)),
            ..Default::default()
        };
        assert!(engine.list_not_allowed(&admin(), &filters).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_role_denied() {
        let engine = reporting_engine();
        let mut caller = CallerContext::admin(40);
        caller.role = rollcall_api::Role::Unknown;
        let result = engine.list_not_allowed(&caller, &ReportFilters::default());
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        // A teacher role without a teacher record is denied too
        let mut caller = CallerContext::teacher(41, TeacherId::new(1));
        caller.teacher_id = None;
        let result = engine.list_not_allowed(&caller, &ReportFilters::default());
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));
    }

    #[test]
    fn test_summarize_by_course() {
        let engine = reporting_engine();
        let student = CallerContext::student(31, StudentId::new(2));

        let courses = engine.summarize_by_course(&student, StudentId::new(2)).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].course_name, "Algorithms");
        assert_eq!(courses[0].final_status, FinalStatus::NotAllowed);
        assert_eq!(courses[0].hours_absent, 15);
        assert_eq!(courses[0].credit_hours, 3);
        assert_eq!(courses[1].course_name, "Databases");
        assert_eq!(courses[1].final_status, FinalStatus::Allowed);
        assert_eq!(courses[1].hours_present, 15);

        let result = engine.summarize_by_course(&student, StudentId::new(1));
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let result = engine.summarize_by_course(&admin(), StudentId::new(77));
        assert!(matches!(result, Err(EngineError::UnknownStudent(_))));
    }

    #[test]
    fn test_student_dashboard() {
        let engine = reporting_engine();
        let dash = engine
            .student_dashboard(&CallerContext::student(31, StudentId::new(2)), StudentId::new(2))
            .unwrap();
        assert_eq!(dash.attendance_lines, 2);
        assert_eq!(dash.courses, 2);
        assert_eq!(dash.allowed, 1);
        assert_eq!(dash.not_allowed, 1);

        let algorithms = dash
            .absence_by_course
            .iter()
            .find(|c| c.course_id == CourseId::new(20))
            .unwrap();
        assert_eq!(algorithms.percent_of_total, 100.0);

        let clean = engine.student_dashboard(&admin(), StudentId::new(3)).unwrap();
        assert!(clean.absence_by_course.iter().all(|c| c.percent_of_total == 0.0));
    }

    #[test]
    fn test_teacher_dashboard() {
        let engine = reporting_engine();
        let teacher = CallerContext::teacher(21, TeacherId::new(2));

        let dash = engine.teacher_dashboard(&teacher, TeacherId::new(2)).unwrap();
        assert_eq!(dash.courses_assigned, 1);
        assert_eq!(dash.students_assigned, 3);
        assert_eq!(dash.allowed, 1);
        assert_eq!(dash.not_allowed, 2);
        assert_eq!(dash.total_hours_present, 15);
        assert_eq!(dash.total_hours_absent, 30);

        let result = engine.teacher_dashboard(&teacher, TeacherId::new(1));
        assert!(matches!(result, Err(EngineError::AccessDenied(_))));

        let result = engine.teacher_dashboard(&admin(), TeacherId::new(9));
        assert!(matches!(result, Err(EngineError::UnknownTeacher(_))));
    }
}
