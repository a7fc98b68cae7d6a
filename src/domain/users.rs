//! User domain - DB queries for users
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

#[derive(Debug, sqlx::FromRow)]
pub struct UserBasicInfo {
    pub email: String,
    pub linkedin_id: Option<String>,
    pub linkedin_name: Option<String>,
}

/// Get basic user info by ID
pub async fn get_user_by_id<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<UserBasicInfo>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT email, linkedin_id, linkedin_name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
}

/// Everything the delivery pipeline needs to know about a post's owner.
#[derive(Debug, sqlx::FromRow)]
pub struct PublishingUser {
    pub id: i64,
    pub email: String,
    pub linkedin_id: Option<String>,
    pub linkedin_access_token: Option<String>,
    pub credits: i32,
    pub monthly_credits: i32,
}

impl PublishingUser {
    /// Purchased plus monthly credits available for a publish.
    pub fn total_available_credits(&self) -> i32 {
        self.credits + self.monthly_credits
    }
}

pub async fn get_user_for_publishing<'e, E>(
    executor: E,
    user_id: i64,
) -> Result<Option<PublishingUser>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, email, linkedin_id, linkedin_access_token, credits, monthly_credits
        FROM users WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Upsert a user from a completed LinkedIn OAuth exchange, keyed on the
/// LinkedIn member id. Returns the internal user id.
pub async fn upsert_linkedin_user<'e, E>(
    executor: E,
    linkedin_id: &str,
    email: &str,
    linkedin_name: Option<&str>,
    access_token: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (linkedin_id, email, linkedin_name, linkedin_access_token, linkedin_token_expires_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (linkedin_id) DO UPDATE SET
            email = $2,
            linkedin_name = $3,
            linkedin_access_token = $4,
            linkedin_token_expires_at = $5,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(linkedin_id)
    .bind(email)
    .bind(linkedin_name)
    .bind(access_token)
    .bind(token_expires_at)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}
