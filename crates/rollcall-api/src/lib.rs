//! Domain and protocol types for rollcall
//!
//! This crate defines the types shared by the store, the engine and clients:
//! - Entities (teachers, students, courses, batches, attendance lines)
//! - Caller identity and roles
//! - Read-side views returned by the engine
//! - NDJSON request/response protocol and versioning

mod commands;
mod types;
mod views;

pub use commands::*;
pub use types::*;
pub use views::*;

/// Current API version
pub const API_VERSION: u32 = 1;
