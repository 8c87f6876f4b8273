//! Infrastructure layer for Tollbooth
//!
//! Database access and the shared log message catalogue.

pub mod database;
pub mod log_messages;

pub use database::Database;
