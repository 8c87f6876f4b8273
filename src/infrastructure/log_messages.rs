//! Log message constants for lifecycle and infrastructure events
//!
//! Messages emitted from more than one place, or worth grepping for in
//! production logs, are kept here so their wording stays consistent.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting Tollbooth gateway";
    pub const STARTED_SUCCESSFULLY: &str = "Gateway started successfully";
    pub const LISTENING: &str = "Gateway listening";
    pub const SHUTDOWN_SIGNAL: &str = "Shutdown signal received";
    pub const STOPPED: &str = "Gateway stopped";
}

/// Database-related log messages
pub mod database {
    pub const HEALTH_CHECK_FAILED: &str = "Database health check failed";
    pub const CONNECTING: &str = "Connecting to database";
    pub const CONNECTION_ESTABLISHED: &str = "Database connection established";
    pub const MIGRATION_STARTED: &str = "Running database migrations";
    pub const MIGRATION_COMPLETED: &str = "Database migrations completed successfully";
    pub const MEMORY_BACKEND: &str = "Using in-memory ledger; balances are not persisted";
}

/// Request scheduler messages
pub mod scheduler {
    pub const STARTED: &str = "Request scheduler started";
    pub const REQUEST_QUEUED: &str = "Request queued";
    pub const REQUEST_SUPERSEDED: &str = "Queued request superseded by a newer one";
    pub const REQUEST_ABORTED_BEFORE_START: &str = "Request aborted before dispatch";
    pub const REQUEST_DISPATCHED: &str = "Request dispatched";
    pub const INTERVAL_RECOMPUTED: &str = "Dispatch interval recomputed";
    pub const CONCURRENCY_CHANGED: &str = "Concurrency limit changed";
    pub const SHUTTING_DOWN: &str = "Request scheduler shutting down";
}

/// Usage billing messages
pub mod billing {
    pub const RESERVATION_REJECTED: &str = "Pre-flight balance check rejected request";
    pub const BILLED: &str = "Usage billed";
    pub const BILLING_FAILED: &str = "Billing failed after response was delivered";
    pub const NOT_BILLED: &str = "Request has no platform user; usage not billed";
}

/// Upstream call and relay messages
pub mod upstream {
    pub const STREAM_COMPLETED: &str = "Upstream stream completed";
    pub const STREAM_FAILED: &str = "Upstream stream failed";
    pub const STREAM_ABORTED: &str = "Upstream stream aborted";
    pub const CALL_FAILED: &str = "Upstream call failed";
}
