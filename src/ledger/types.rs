//! Type definitions for the usage ledger

use crate::domain::{RequestId, UserId};
use chrono::{DateTime, Utc};
use currencies::{currency::USD, Amount};
use nutype::nutype;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Currency recorded on every usage row
pub const CURRENCY_USD: &str = "USD";

/// Errors raised while reserving or billing usage
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Insufficient balance: {balance_cents} cents available, {required_cents} required")]
    InsufficientBalance {
        balance_cents: i64,
        required_cents: u64,
    },

    #[error("Ledger storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Ledger is unavailable: {0}")]
    Unavailable(String),
}

/// Provider name used for pricing and usage records
///
/// This is derived from the model name rather than from the adapter that
/// served the call, so an OpenRouter-hosted `deepseek-chat` is still priced
/// as DeepSeek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingProvider {
    OpenAi,
    DeepSeek,
    Gemini,
    Other,
}

impl BillingProvider {
    pub fn from_model(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model == "deepseek" || model.starts_with("deepseek-") {
            Self::DeepSeek
        } else if model.starts_with("gemini-") {
            Self::Gemini
        } else if model.starts_with("gpt-") {
            Self::OpenAi
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for BillingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price per thousand tokens in USD
#[nutype(
    validate(predicate = |price| *price >= Decimal::ZERO),
    derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, AsRef)
)]
pub struct PricePerThousandTokens(Decimal);

impl PricePerThousandTokens {
    /// Parse a dollar amount such as `"0.0015"`; negative prices are clamped to zero
    pub fn from_usd_dollars_per_1k(dollars: &str) -> Result<Self, rust_decimal::Error> {
        let value = dollars.trim().parse::<Decimal>()?;
        Ok(Self::clamped(value))
    }

    /// Non-finite or negative prices become zero
    ///
    /// Goes through the shortest decimal rendering of the float so `0.005`
    /// becomes exactly `0.005` rather than its binary approximation.
    pub fn from_f64(dollars: f64) -> Self {
        if !dollars.is_finite() {
            return Self::zero();
        }
        Self::from_usd_dollars_per_1k(&dollars.to_string()).unwrap_or_else(|_| Self::zero())
    }

    pub fn zero() -> Self {
        Self::clamped(Decimal::ZERO)
    }

    fn clamped(value: Decimal) -> Self {
        let value = value.max(Decimal::ZERO);
        Self::try_new(value).unwrap_or_else(|_| Self::zero())
    }
}

/// Input and output prices for one (provider, model) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_price_per_1k_tokens: PricePerThousandTokens,
    pub output_price_per_1k_tokens: PricePerThousandTokens,
}

impl ModelPricing {
    pub fn new(input: PricePerThousandTokens, output: PricePerThousandTokens) -> Self {
        Self {
            input_price_per_1k_tokens: input,
            output_price_per_1k_tokens: output,
        }
    }

    /// Whole cents for the given usage, rounded half away from zero
    pub fn cost_cents(&self, prompt_tokens: u64, completion_tokens: u64) -> u64 {
        let thousand = Decimal::from(1000);
        let input = Decimal::from(prompt_tokens) / thousand * *self.input_price_per_1k_tokens.as_ref();
        let output =
            Decimal::from(completion_tokens) / thousand * *self.output_price_per_1k_tokens.as_ref();

        let cents = ((input + output) * Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        u64::try_from(cents).unwrap_or(0)
    }

    /// Cost for the given usage as a USD amount
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> Amount<USD> {
        Amount::<USD>::from_raw(self.cost_cents(prompt_tokens, completion_tokens))
    }
}

/// Everything needed to bill one completed (or aborted) request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDraft {
    pub user_id: UserId,
    pub request_id: RequestId,
    pub provider: BillingProvider,
    pub model: String,
    pub stream: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated: bool,
}

/// Immutable usage row appended alongside each debit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub request_id: RequestId,
    pub provider: BillingProvider,
    pub model: String,
    pub stream: bool,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_cents: u64,
    pub currency: String,
    pub estimated: bool,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn from_draft(draft: UsageDraft, cost_cents: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: draft.user_id,
            request_id: draft.request_id,
            provider: draft.provider,
            model: draft.model,
            stream: draft.stream,
            prompt_tokens: draft.prompt_tokens,
            completion_tokens: draft.completion_tokens,
            cost_cents,
            currency: CURRENCY_USD.to_string(),
            estimated: draft.estimated,
            created_at: Utc::now(),
        }
    }
}

/// Result of a successful bill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillReceipt {
    pub cost_cents: u64,
    /// `None` when nothing was charged and the balance was not read
    pub remaining_balance_cents: Option<i64>,
}

impl BillReceipt {
    pub fn free() -> Self {
        Self {
            cost_cents: 0,
            remaining_balance_cents: None,
        }
    }
}
