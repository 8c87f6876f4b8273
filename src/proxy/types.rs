//! Type definitions for the proxy module

use crate::ledger::LedgerError;
use crate::providers::ProviderError;
use crate::scheduler::SchedulerError;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for bodies without a model or messages
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request: model and messages are required.";

/// Message returned when a feature password check fails
pub const PERMISSION_DENIED_MESSAGE: &str =
    "A valid feature password is required for this operation.";

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

impl RequestSizeLimit {
    /// 10MB
    pub fn default_limit() -> Self {
        Self::try_new(10 * 1024 * 1024).expect("10MB is valid")
    }
}

/// Proxy configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Maximum request size in bytes
    pub max_request_size: RequestSizeLimit,
    /// Reject requests without a platform user instead of forwarding unbilled
    pub require_user: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_request_size: RequestSizeLimit::default_limit(),
            require_user: false,
        }
    }
}

/// Errors surfaced at the HTTP boundary
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("A valid feature password is required for this operation.")]
    PermissionDenied { permission: String },

    #[error("Insufficient balance: {balance_cents} cents available, {required_cents} required")]
    InsufficientBalance {
        balance_cents: i64,
        required_cents: u64,
    },

    #[error("Request {id} was cancelled and replaced")]
    Superseded { id: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Request aborted")]
    Aborted,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<ProviderError> for ProxyError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::NotConfigured { .. } => Self::ProviderNotConfigured(error.to_string()),
            ProviderError::Aborted => Self::Aborted,
            ProviderError::Upstream { .. }
            | ProviderError::Transport(_)
            | ProviderError::Decode(_) => Self::Upstream(error.to_string()),
        }
    }
}

impl From<SchedulerError> for ProxyError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Superseded { id } => Self::Superseded { id },
            SchedulerError::Aborted => Self::Aborted,
            SchedulerError::Destroyed => Self::Unavailable(error.to_string()),
            SchedulerError::Execution(inner) => inner.into(),
        }
    }
}

impl From<LedgerError> for ProxyError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::UserNotFound(_) => Self::Unauthorized(error.to_string()),
            LedgerError::InsufficientBalance {
                balance_cents,
                required_cents,
            } => Self::InsufficientBalance {
                balance_cents,
                required_cents,
            },
            LedgerError::Storage(_) | LedgerError::Unavailable(_) => {
                Self::Unavailable(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::providers::ProviderKind;

    #[test]
    fn test_request_size_limit() {
        assert!(RequestSizeLimit::try_new(0).is_err());
        assert_eq!(*RequestSizeLimit::default_limit().as_ref(), 10 * 1024 * 1024);
    }

    #[test]
    fn scheduler_errors_keep_their_meaning() {
        assert!(matches!(
            ProxyError::from(SchedulerError::Superseded { id: "r1".into() }),
            ProxyError::Superseded { id } if id == "r1"
        ));
        assert!(matches!(
            ProxyError::from(SchedulerError::Aborted),
            ProxyError::Aborted
        ));
        assert!(matches!(
            ProxyError::from(SchedulerError::Destroyed),
            ProxyError::Unavailable(_)
        ));
    }

    #[test]
    fn upstream_errors_carry_the_provider_text() {
        let error = ProxyError::from(SchedulerError::Execution(ProviderError::Upstream {
            status: 429,
            body: "slow down".into(),
        }));
        assert_eq!(error.to_string(), "LLM provider error 429: slow down");

        let error = ProxyError::from(ProviderError::NotConfigured {
            provider: ProviderKind::Gemini,
            reason: "no key".into(),
        });
        assert!(matches!(error, ProxyError::ProviderNotConfigured(_)));
    }

    #[test]
    fn ledger_errors_map_to_auth_and_balance() {
        let user = UserId::try_new("u1".to_string()).unwrap();
        assert!(matches!(
            ProxyError::from(LedgerError::UserNotFound(user)),
            ProxyError::Unauthorized(_)
        ));
        assert!(matches!(
            ProxyError::from(LedgerError::InsufficientBalance {
                balance_cents: 5,
                required_cents: 10
            }),
            ProxyError::InsufficientBalance {
                balance_cents: 5,
                required_cents: 10
            }
        ));
    }
}
