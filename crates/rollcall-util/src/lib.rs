//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (StudentId, TeacherId, CourseId, BatchId, LineId, ...)
//! - Clock and calendar-month helpers
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
