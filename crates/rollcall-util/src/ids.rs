//! Strongly-typed identifiers for rollcall

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a newtype over an integer row id.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

row_id!(
    /// Identifier of a student record
    StudentId
);
row_id!(
    /// Identifier of a teacher record
    TeacherId
);
row_id!(
    /// Identifier of a course
    CourseId
);
row_id!(FacultyId);
row_id!(DepartmentId);
row_id!(AcademicYearId);
row_id!(SemesterId);
row_id!(
    /// Identifier of one student's attendance line inside a batch
    LineId
);

/// Unique identifier for an attendance batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the hyphenated string form used in storage
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_equality() {
        let a = StudentId::new(7);
        let b = StudentId::from(7);
        let c = StudentId::new(8);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get(), 7);
    }

    #[test]
    fn batch_id_uniqueness() {
        let b1 = BatchId::new();
        let b2 = BatchId::new();
        assert_ne!(b1, b2);
    }

    #[test]
    fn batch_id_parses_display_form() {
        let id = BatchId::new();
        assert_eq!(BatchId::parse(&id.to_string()), Some(id));
        assert_eq!(BatchId::parse("not-a-uuid"), None);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&CourseId::new(42)).unwrap();
        assert_eq!(json, "42");

        let batch_id = BatchId::new();
        let json = serde_json::to_string(&batch_id).unwrap();
        let parsed: BatchId = serde_json::from_str(&json).unwrap();
        assert_eq!(batch_id, parsed);
    }
}
