//! Usage metering and billing
//!
//! Token usage is estimated when a provider does not report it, priced per
//! (provider, model), and debited from the user's balance together with an
//! immutable usage record.

pub mod estimator;
pub mod pricing;
pub mod store;
pub mod types;
pub mod usage_ledger;

pub use estimator::{estimate_messages_tokens, estimate_text_tokens, estimate_tokens_by_chars};
pub use pricing::{OverrideSource, PricingOverride, PricingResolver, DEFAULT_PRICING_OVERRIDE_ENV};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
pub use types::*;
pub use usage_ledger::{draft_usage, UsageLedger, DEFAULT_RESERVATION_MAX_TOKENS};
