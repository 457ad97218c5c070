//! Attendance engine for rollcall
//!
//! This crate is the heart of rollcall, containing:
//! - Batch identity and fan-out of a batch to every enrolled student
//! - Reconciliation of late enrollments against existing batches
//! - Weekly presence recording
//! - Status aggregation (cumulative hours and the Allowed/Not Allowed verdict)
//! - Role-scoped reports and dashboards

mod aggregate;
mod engine;
mod error;
mod fanout;
mod identity;
mod recorder;
mod reports;

pub use aggregate::*;
pub use engine::*;
pub use error::*;
pub use identity::*;
