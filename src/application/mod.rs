//! Gateway assembly and lifecycle
//!
//! Builds the ledger, providers, scheduler and router from [`Settings`]
//! and serves them until a shutdown signal arrives.
//!
//! [`Settings`]: crate::config::Settings

pub mod app;

pub use app::Application;
