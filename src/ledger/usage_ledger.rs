//! Reservation checks and final billing

use super::estimator::{estimate_messages_tokens, estimate_text_tokens};
use super::pricing::PricingResolver;
use super::store::LedgerStore;
use super::types::{BillReceipt, BillingProvider, LedgerError, UsageDraft, UsageRecord};
use crate::domain::{ChatCompletionRequest, RequestId, TokenUsage, UserId};
use crate::infrastructure::log_messages::billing as log_msg;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Completion budget assumed for reservations when the request sets none
pub const DEFAULT_RESERVATION_MAX_TOKENS: u64 = 1024;

/// Converts token usage into cents and debits user balances
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn LedgerStore>,
    pricing: PricingResolver,
    default_max_tokens: u64,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn LedgerStore>, pricing: PricingResolver) -> Self {
        Self {
            store,
            pricing,
            default_max_tokens: DEFAULT_RESERVATION_MAX_TOKENS,
        }
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u64) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Cents a request could cost if it used its whole completion budget
    pub fn estimate_reservation(&self, request: &ChatCompletionRequest) -> u64 {
        let prompt_tokens = estimate_messages_tokens(&request.messages);
        let completion_tokens = request
            .max_tokens
            .map(u64::from)
            .unwrap_or(self.default_max_tokens);

        self.pricing
            .resolve(BillingProvider::from_model(&request.model), &request.model)
            .cost_cents(prompt_tokens, completion_tokens)
    }

    /// Pre-flight balance check
    ///
    /// Nothing is held: concurrent requests may all pass and still jointly
    /// exceed the balance. `bill` is where the balance is enforced.
    #[instrument(skip_all, fields(user_id = %user_id, min_cents))]
    pub async fn reserve(&self, user_id: &UserId, min_cents: u64) -> Result<(), LedgerError> {
        let balance = self.store.balance(user_id).await?;
        if balance < 0 || (balance as u64) < min_cents {
            debug!(balance, min_cents, "Reservation rejected");
            return Err(LedgerError::InsufficientBalance {
                balance_cents: balance,
                required_cents: min_cents,
            });
        }
        Ok(())
    }

    /// Price the draft and debit the user
    ///
    /// A zero cost is not recorded and never touches the store.
    #[instrument(skip(self, draft), fields(
        user_id = %draft.user_id,
        request_id = %draft.request_id,
        model = %draft.model,
        provider = %draft.provider,
    ))]
    pub async fn bill(&self, draft: UsageDraft) -> Result<BillReceipt, LedgerError> {
        let pricing = self.pricing.resolve(draft.provider, &draft.model);
        let cost_cents = pricing.cost_cents(draft.prompt_tokens, draft.completion_tokens);

        if cost_cents == 0 {
            debug!("Usage priced at zero; nothing billed");
            return Ok(BillReceipt::free());
        }

        let record = UsageRecord::from_draft(draft, cost_cents);
        match self.store.debit(&record).await {
            Ok(remaining) => {
                info!(
                    cost_cents,
                    cost = ?pricing.cost(record.prompt_tokens, record.completion_tokens),
                    remaining_balance_cents = remaining,
                    prompt_tokens = record.prompt_tokens,
                    completion_tokens = record.completion_tokens,
                    estimated = record.estimated,
                    "{}",
                    log_msg::BILLED
                );
                Ok(BillReceipt {
                    cost_cents,
                    remaining_balance_cents: Some(remaining),
                })
            }
            Err(error) => {
                warn!(cost_cents, %error, "Billing failed");
                Err(error)
            }
        }
    }
}

/// Build the draft for a finished exchange
///
/// Exact provider usage wins; otherwise the prompt is estimated from the
/// request messages and the completion from the generated text.
pub fn draft_usage(
    user_id: UserId,
    request_id: RequestId,
    request: &ChatCompletionRequest,
    exact: Option<TokenUsage>,
    generated_text: &str,
) -> UsageDraft {
    let (prompt_tokens, completion_tokens, estimated) = match exact {
        Some(usage) => (usage.prompt_tokens, usage.completion_tokens, false),
        None => (
            estimate_messages_tokens(&request.messages),
            estimate_text_tokens(generated_text),
            true,
        ),
    };

    UsageDraft {
        user_id,
        request_id,
        provider: BillingProvider::from_model(&request.model),
        model: request.model.clone(),
        stream: request.stream,
        prompt_tokens,
        completion_tokens,
        estimated,
    }
}
