//! Newtypes for identifiers and credentials
//!
//! These avoid passing bare strings between the proxy boundary, the
//! scheduler and the ledger, and validate input where it enters the system.

use nutype::nutype;
use uuid::Uuid;

/// Identifier for one inbound chat-completion request
///
/// Generated once at the proxy boundary and carried through scheduling,
/// execution and billing so usage records can be correlated with logs.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRef,
    Display
))]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Platform user whose balance is debited for metered calls
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct UserId(String);

/// Upstream provider credential
///
/// Deliberately not `Display` so keys do not end up in log lines.
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef)
)]
pub struct ApiKey(String);

/// Caller-supplied slot identifier used to supersede a still-queued request
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct CancellationKey(String);
