//! Domain types shared by the gateway core
//!
//! Identifiers are validated newtypes; chat payloads mirror the
//! OpenAI-compatible wire format the gateway speaks to its clients.

pub mod chat;
pub mod types;

pub use chat::*;
pub use types::*;
