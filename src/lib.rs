//! Tollbooth - a metering chat-completion gateway
//!
//! Accepts OpenAI-style chat-completion requests, paces them through a
//! rate-limiting scheduler, forwards them to OpenAI-compatible, DeepSeek or
//! Gemini upstreams, relays streamed replies as normalized SSE and bills
//! each exchange against the caller's balance.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ledger;
pub mod providers;
pub mod proxy;
pub mod scheduler;
pub mod streaming;

pub use application::Application;
pub use error::{Error, Result};
