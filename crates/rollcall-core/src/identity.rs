//! Batch identity
//!
//! Batches carry an explicit id, but two batches can still describe the same
//! offering (same course, teacher, cohort and date range, opened on the same
//! day). Reconciliation treats those as one batch.

use chrono::NaiveDate;
use rollcall_api::{Batch, CohortKey};
use rollcall_util::{CourseId, TeacherId};
use std::collections::HashSet;

/// The fields that identify a batch, with creation time truncated to the day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub course_id: CourseId,
    pub teacher_id: TeacherId,
    pub cohort: CohortKey,
    pub start_month: NaiveDate,
    pub end_month: NaiveDate,
    pub created_on: NaiveDate,
}

impl BatchKey {
    pub fn of(batch: &Batch) -> Self {
        Self {
            course_id: batch.course_id,
            teacher_id: batch.teacher_id,
            cohort: batch.cohort,
            start_month: batch.start_month,
            end_month: batch.end_month,
            created_on: batch.created_at.date_naive(),
        }
    }
}

/// Whether two batches describe the same offering
pub fn same_batch(a: &Batch, b: &Batch) -> bool {
    BatchKey::of(a) == BatchKey::of(b)
}

/// Keep one representative per distinct batch key, in input order
pub fn distinct_batches(batches: Vec<Batch>) -> Vec<Batch> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .filter(|batch| seen.insert(BatchKey::of(batch)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local, TimeZone};
    use rollcall_util::{AcademicYearId, BatchId, DepartmentId, FacultyId, SemesterId};

    fn batch_at(hour: u32) -> Batch {
        Batch {
            id: BatchId::new(),
            course_id: CourseId::new(1),
            teacher_id: TeacherId::new(1),
            cohort: CohortKey {
                faculty_id: FacultyId::new(1),
                department_id: DepartmentId::new(1),
                academic_year_id: AcademicYearId::new(2025),
                semester_id: SemesterId::new(2),
            },
            start_month: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end_month: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            created_at: Local.with_ymd_and_hms(2025, 1, 20, hour, 15, 0).unwrap(),
        }
    }

    #[test]
    fn creation_compared_by_day() {
        let morning = batch_at(8);
        let evening = batch_at(18);
        assert!(same_batch(&morning, &evening));

        let mut next_day = batch_at(8);
        next_day.created_at = next_day.created_at + Duration::days(1);
        assert!(!same_batch(&morning, &next_day));
    }

    #[test]
    fn every_field_counts() {
        let a = batch_at(8);

        let mut b = batch_at(8);
        b.teacher_id = TeacherId::new(2);
        assert!(!same_batch(&a, &b));

        let mut c = batch_at(8);
        c.end_month = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(!same_batch(&a, &c));

        let mut d = batch_at(8);
        d.cohort.academic_year_id = AcademicYearId::new(2026);
        assert!(!same_batch(&a, &d));
    }

    #[test]
    fn distinct_keeps_first_representative() {
        let first = batch_at(8);
        let twin = batch_at(9);
        let mut other = batch_at(8);
        other.course_id = CourseId::new(2);

        let kept = distinct_batches(vec![first.clone(), twin, other.clone()]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, first.id);
        assert_eq!(kept[1].id, other.id);
    }
}
