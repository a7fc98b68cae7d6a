//! Credit ledger - balance mutation and the append-only transaction log
//!
//! Every successful LinkedIn publish costs exactly one credit, taken from the
//! monthly plan allotment first and from purchased credits only when the
//! monthly pool is empty. Each deduction appends one `credit_transactions`
//! row carrying the signed delta and the remaining balance; ledger rows are
//! never updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct CreditBalance {
    pub credits: i32,
    pub monthly_credits: i32,
}

impl CreditBalance {
    pub fn total(&self) -> i32 {
        self.credits + self.monthly_credits
    }
}

/// Deduct one credit, monthly pool first. Guarded so the balance can never
/// go negative: returns `None` if the user no longer has a credit to take
/// (the caller pre-checked, but the balance may have moved since).
pub async fn deduct_publish_credit<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<CreditBalance>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE users
        SET monthly_credits = monthly_credits - LEAST(monthly_credits, 1),
            credits = credits - (1 - LEAST(monthly_credits, 1)),
            updated_at = NOW()
        WHERE id = $1 AND credits + monthly_credits >= 1
        RETURNING credits, monthly_credits
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Append a ledger row. `balance_after` is the combined balance once the
/// delta has been applied.
pub async fn record_transaction<'e, E>(
    executor: E,
    user_id: i64,
    post_id: Option<i64>,
    amount: i32,
    balance_after: i32,
    description: &str,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO credit_transactions (user_id, post_id, amount, balance_after, description)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(post_id)
    .bind(amount)
    .bind(balance_after)
    .bind(description)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_balance<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<CreditBalance>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT credits, monthly_credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

#[derive(Debug, sqlx::FromRow)]
pub struct CreditTransaction {
    pub id: i64,
    pub post_id: Option<i64>,
    pub amount: i32,
    pub balance_after: i32,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn count_transactions<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(executor)
            .await?;
    Ok(count)
}

pub async fn list_transactions<'e, E>(
    executor: E,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<CreditTransaction>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, post_id, amount, balance_after, description, created_at
        FROM credit_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_spans_both_pools() {
        let balance = CreditBalance {
            credits: 3,
            monthly_credits: 2,
        };
        assert_eq!(balance.total(), 5);
    }
}
