//! HTTP boundary of the gateway
//!
//! Requests are validated, permission-checked and balance-checked here, then
//! handed to the scheduler. Responses are either a complete JSON body or an
//! SSE stream relayed as the upstream produces it.

pub mod admin;
pub mod auth;
pub mod error_response;
pub mod executor;
pub mod handler;
pub mod headers;
pub mod middleware;
pub mod permissions;
pub mod service;
pub mod types;

pub use auth::{Identity, SessionResolver, StaticSessionResolver};
pub use executor::ProviderExecutor;
pub use permissions::FeaturePasswords;
pub use service::{GatewayState, ProxyService};
pub use types::{ProxyConfig, ProxyError, ProxyResult, RequestSizeLimit};
