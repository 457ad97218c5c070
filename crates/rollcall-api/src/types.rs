//! Shared types for the rollcall API

use chrono::{DateTime, Local, NaiveDate};
use rollcall_util::{
    AcademicYearId, BatchId, CourseId, DepartmentId, FacultyId, LineId, SemesterId, StudentId,
    TeacherId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of recorded hour slots in one week of a batch
pub const HOURS_PER_WEEK: u32 = 3;

/// Role the caller acts under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    Teacher,
    Student,
    /// Any role name this service does not recognise
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Admin and staff see every attendance line
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    pub fn can_manage_batches(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Who is asking, supplied by the calling layer with every request.
///
/// The engine never authenticates; it trusts this value and scopes
/// reads and writes by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub role: Role,
    pub user_id: i64,
    /// Teacher record the user maps to, if any
    #[serde(default)]
    pub teacher_id: Option<TeacherId>,
    /// Student record the user maps to, if any
    #[serde(default)]
    pub student_id: Option<StudentId>,
}

impl CallerContext {
    pub fn admin(user_id: i64) -> Self {
        Self {
            role: Role::Admin,
            user_id,
            teacher_id: None,
            student_id: None,
        }
    }

    pub fn staff(user_id: i64) -> Self {
        Self {
            role: Role::Staff,
            ..Self::admin(user_id)
        }
    }

    pub fn teacher(user_id: i64, teacher_id: TeacherId) -> Self {
        Self {
            role: Role::Teacher,
            user_id,
            teacher_id: Some(teacher_id),
            student_id: None,
        }
    }

    pub fn student(user_id: i64, student_id: StudentId) -> Self {
        Self {
            role: Role::Student,
            user_id,
            teacher_id: None,
            student_id: Some(student_id),
        }
    }
}

/// A (faculty, department, academic year, semester) group of students
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    pub faculty_id: FacultyId,
    pub department_id: DepartmentId,
    pub academic_year_id: AcademicYearId,
    pub semester_id: SemesterId,
}

/// Exam eligibility verdict of an attendance line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    #[default]
    Allowed,
    NotAllowed,
}

impl FinalStatus {
    /// Verdict for a number of absent hours against the threshold.
    /// Absence equal to the threshold is still allowed.
    pub fn from_absence(hours_absent: u32, threshold_hours: u32) -> Self {
        if hours_absent > threshold_hours {
            FinalStatus::NotAllowed
        } else {
            FinalStatus::Allowed
        }
    }

    /// Combine two verdicts: NotAllowed dominates Allowed.
    pub fn dominate(self, other: FinalStatus) -> FinalStatus {
        match (self, other) {
            (FinalStatus::Allowed, FinalStatus::Allowed) => FinalStatus::Allowed,
            _ => FinalStatus::NotAllowed,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, FinalStatus::Allowed)
    }

    /// Stable storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Allowed => "allowed",
            FinalStatus::NotAllowed => "not_allowed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allowed" => Some(FinalStatus::Allowed),
            "not_allowed" => Some(FinalStatus::NotAllowed),
            _ => None,
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Allowed => write!(f, "Allowed"),
            FinalStatus::NotAllowed => write!(f, "Not Allowed"),
        }
    }
}

/// Presence in the three hour slots of one week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HourSlots {
    #[serde(default)]
    pub hour1: bool,
    #[serde(default)]
    pub hour2: bool,
    #[serde(default)]
    pub hour3: bool,
}

impl HourSlots {
    pub const ABSENT: HourSlots = HourSlots {
        hour1: false,
        hour2: false,
        hour3: false,
    };

    pub const fn new(hour1: bool, hour2: bool, hour3: bool) -> Self {
        Self { hour1, hour2, hour3 }
    }

    /// Number of slots marked present (0-3)
    pub fn present_count(&self) -> u32 {
        [self.hour1, self.hour2, self.hour3]
            .iter()
            .filter(|&&p| p)
            .count() as u32
    }
}

/// Cumulative totals and verdict of an attendance line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineTotals {
    pub hours_present: u32,
    pub hours_absent: u32,
    pub final_status: FinalStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub last_name: String,
}

impl Teacher {
    pub fn full_name(&self) -> String {
        format_full_name(&self.first_name, &self.middle_name, &self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub roll_id: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub last_name: String,
}

impl Student {
    pub fn full_name(&self) -> String {
        format_full_name(&self.first_name, &self.middle_name, &self.last_name)
    }
}

/// Join name parts with single spaces, skipping empty parts
pub fn format_full_name(first: &str, middle: &str, last: &str) -> String {
    [first, middle, last]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub credit_hours: u32,
    pub faculty_id: FacultyId,
    pub department_id: DepartmentId,
    pub semester_id: SemesterId,
}

/// Confirms a student belongs to a cohort cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub cohort: CohortKey,
}

/// Input for opening a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub course_id: CourseId,
    pub teacher_id: TeacherId,
    pub cohort: CohortKey,
    pub start_month: NaiveDate,
    pub end_month: NaiveDate,
}

/// One course offering to one cohort cell over one date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub course_id: CourseId,
    pub teacher_id: TeacherId,
    pub cohort: CohortKey,
    pub start_month: NaiveDate,
    pub end_month: NaiveDate,
    pub created_at: DateTime<Local>,
}

/// One student's participation in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLine {
    pub id: LineId,
    pub batch_id: BatchId,
    pub student_id: StudentId,
    pub created_at: DateTime<Local>,
    pub totals: LineTotals,
}

/// Hourly presence of one line for one week of one month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyDetail {
    pub line_id: LineId,
    /// Calendar month number (1-12)
    pub month: u32,
    /// Week number within the month, starting at 1
    pub week: u32,
    pub slots: HourSlots,
}

/// Presence of one student in a weekly submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPresence {
    pub student_id: StudentId,
    pub slots: HourSlots,
}

/// A weekly attendance submission for a whole batch.
///
/// Students of the batch missing from `presence` are recorded absent
/// for all three hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSubmission {
    /// Month name, e.g. "March"
    pub month: String,
    pub week: u32,
    #[serde(default)]
    pub presence: Vec<StudentPresence>,
}

/// Optional equality filters for report queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub faculty_id: Option<FacultyId>,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub academic_year_id: Option<AcademicYearId>,
    #[serde(default)]
    pub semester_id: Option<SemesterId>,
    #[serde(default)]
    pub student_id: Option<StudentId>,
    #[serde(default)]
    pub course_id: Option<CourseId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary() {
        assert_eq!(FinalStatus::from_absence(12, 12), FinalStatus::Allowed);
        assert_eq!(FinalStatus::from_absence(13, 12), FinalStatus::NotAllowed);
        assert_eq!(FinalStatus::from_absence(0, 12), FinalStatus::Allowed);
    }

    #[test]
    fn not_allowed_dominates() {
        use FinalStatus::*;
        assert_eq!(Allowed.dominate(Allowed), Allowed);
        assert_eq!(Allowed.dominate(NotAllowed), NotAllowed);
        assert_eq!(NotAllowed.dominate(Allowed), NotAllowed);
    }

    #[test]
    fn status_storage_form() {
        for status in [FinalStatus::Allowed, FinalStatus::NotAllowed] {
            assert_eq!(FinalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FinalStatus::parse("Not Allowed"), None);
        assert_eq!(FinalStatus::NotAllowed.to_string(), "Not Allowed");
    }

    #[test]
    fn unknown_role_deserializes() {
        let role: Role = serde_json::from_str("\"janitor\"").unwrap();
        assert_eq!(role, Role::Unknown);
        let role: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(role, Role::Teacher);
    }

    #[test]
    fn slot_counting() {
        assert_eq!(HourSlots::new(true, true, false).present_count(), 2);
        assert_eq!(HourSlots::ABSENT.present_count(), 0);
    }

    #[test]
    fn names_skip_empty_middle() {
        let teacher = Teacher {
            id: TeacherId::new(1),
            first_name: "Amina".into(),
            middle_name: String::new(),
            last_name: "Warsame".into(),
        };
        assert_eq!(teacher.full_name(), "Amina Warsame");
    }
}
