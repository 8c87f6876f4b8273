//! Balance storage backends
//!
//! A debit must re-read the balance, check it, decrement it and append the
//! usage record as one atomic step, so two concurrent debits for the same
//! user can never jointly overdraw.

use super::types::{LedgerError, UsageRecord};
use crate::domain::UserId;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;

/// Persistence seam for the usage ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance in cents
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;

    /// Atomically check, decrement and record; returns the remaining balance
    async fn debit(&self, record: &UsageRecord) -> Result<i64, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}

fn cost_as_i64(record: &UsageRecord) -> Result<i64, LedgerError> {
    i64::try_from(record.cost_cents).map_err(|_| LedgerError::InsufficientBalance {
        balance_cents: 0,
        required_cents: record.cost_cents,
    })
}

#[derive(Default)]
struct MemoryState {
    balances: HashMap<UserId, i64>,
    usage: Vec<UsageRecord>,
}

/// Process-local ledger used for development and tests
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (UserId, i64)>) -> Self {
        let store = Self::new();
        store.state.lock().balances.extend(balances);
        store
    }

    pub fn set_balance(&self, user_id: UserId, balance_cents: i64) {
        self.state.lock().balances.insert(user_id, balance_cents);
    }

    /// Usage rows recorded so far, oldest first
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.state.lock().usage.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        self.state
            .lock()
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| LedgerError::UserNotFound(user_id.clone()))
    }

    async fn debit(&self, record: &UsageRecord) -> Result<i64, LedgerError> {
        let cost = cost_as_i64(record)?;
        let mut state = self.state.lock();

        let balance = state
            .balances
            .get_mut(&record.user_id)
            .ok_or_else(|| LedgerError::UserNotFound(record.user_id.clone()))?;

        if *balance < cost {
            return Err(LedgerError::InsufficientBalance {
                balance_cents: *balance,
                required_cents: record.cost_cents,
            });
        }

        *balance -= cost;
        let remaining = *balance;
        state.usage.push(record.clone());
        Ok(remaining)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Postgres-backed ledger
///
/// The balance row is locked with `SELECT ... FOR UPDATE` inside the debit
/// transaction, which serializes concurrent debits for one user.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let row = sqlx::query("SELECT balance_cents FROM users WHERE id = $1")
            .bind(user_id.as_ref())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("balance_cents")?),
            None => Err(LedgerError::UserNotFound(user_id.clone())),
        }
    }

    async fn debit(&self, record: &UsageRecord) -> Result<i64, LedgerError> {
        let cost = cost_as_i64(record)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balance_cents FROM users WHERE id = $1 FOR UPDATE")
            .bind(record.user_id.as_ref())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(LedgerError::UserNotFound(record.user_id.clone()));
        };
        let balance: i64 = row.try_get("balance_cents")?;

        // Dropping the transaction rolls it back
        if balance < cost {
            return Err(LedgerError::InsufficientBalance {
                balance_cents: balance,
                required_cents: record.cost_cents,
            });
        }

        let remaining: i64 = sqlx::query(
            "UPDATE users SET balance_cents = balance_cents - $2 WHERE id = $1 RETURNING balance_cents",
        )
        .bind(record.user_id.as_ref())
        .bind(cost)
        .fetch_one(&mut *tx)
        .await?
        .try_get("balance_cents")?;

        sqlx::query(
            r#"
            INSERT INTO ai_usage (
                id, user_id, request_id, provider, model, is_stream,
                prompt_tokens, completion_tokens, total_tokens,
                cost_cents, currency, estimated, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id.as_ref())
        .bind(record.request_id.to_string())
        .bind(record.provider.as_str())
        .bind(&record.model)
        .bind(record.stream)
        .bind(i64::try_from(record.prompt_tokens).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.completion_tokens).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.prompt_tokens + record.completion_tokens).unwrap_or(i64::MAX))
        .bind(cost)
        .bind(&record.currency)
        .bind(record.estimated)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(remaining)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        let row = sqlx::query("SELECT 1 as health_check")
            .fetch_one(&self.pool)
            .await?;
        let health_check: i32 = row.try_get("health_check")?;

        if health_check == 1 {
            Ok(())
        } else {
            Err(LedgerError::Unavailable(
                "unexpected health check result".to_string(),
            ))
        }
    }
}
