//! Scheduled post domain - models and DB queries
//!
//! All queries use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).
//!
//! Status lifecycle: a post is claimed `pending -> processing` by exactly one
//! cron sweep (conditional update, `FOR UPDATE SKIP LOCKED`) before any
//! outbound call is made, then settles to `posted` or `failed`, or is released
//! back to `pending` for a later retry. `paused` and `cancelled` are user
//! transitions and never touched by the sweeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres};

/// Post status stored as TEXT in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Processing,
    Posted,
    Failed,
    Paused,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Processing => "processing",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
            PostStatus::Paused => "paused",
            PostStatus::Cancelled => "cancelled",
        }
    }
}

/// A scheduled post as stored
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduledPost {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub content: String,
    pub images: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub linkedin_post_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub recovery_method: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields the delivery pipeline needs after claiming a post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimedPost {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub images: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    pub retry_count: i32,
    pub max_retries: i32,
}

/// Atomically claim pending posts whose `scheduled_for` falls in
/// `[now - start_minutes, now - end_minutes]`, transitioning them to
/// `processing`. Concurrent sweeps (primary vs backup, or overlapping
/// invocations of the same sweep) cannot claim the same post twice.
pub async fn claim_due_posts<'e, E>(
    executor: E,
    start_minutes: i64,
    end_minutes: i64,
) -> Result<Vec<ClaimedPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        WITH due AS (
            SELECT id
            FROM scheduled_posts
            WHERE status = 'pending'
              AND scheduled_for >= NOW() - ($1::text || ' minutes')::interval
              AND scheduled_for <= NOW() - ($2::text || ' minutes')::interval
            ORDER BY scheduled_for ASC
            FOR UPDATE SKIP LOCKED
        )
        UPDATE scheduled_posts p
        SET status = 'processing',
            updated_at = NOW()
        FROM due
        WHERE p.id = due.id
        RETURNING p.id, p.user_id, p.content, p.images, p.scheduled_for,
                  p.retry_count, p.max_retries
        "#,
    )
    .bind(start_minutes)
    .bind(end_minutes)
    .fetch_all(executor)
    .await
}

/// Count posts stranded in `processing` longer than the cutoff. These were
/// claimed by a sweep that died before settling; no sweep will revisit them.
pub async fn count_stale_claims<'e, E>(
    executor: E,
    older_than_minutes: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM scheduled_posts
        WHERE status = 'processing'
          AND updated_at < NOW() - ($1::text || ' minutes')::interval
        "#,
    )
    .bind(older_than_minutes)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Release a claimed post back to `pending` without touching the retry
/// counter (used by the defensive not-yet-due skip).
pub async fn release_claim<'e, E>(executor: E, post_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'pending', updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(post_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Record a failed attempt and release the post for a later retry.
/// Returns the new retry count.
pub async fn record_retry<'e, E>(executor: E, post_id: i64) -> Result<i32, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: (i32,) = sqlx::query_as(
        r#"
        UPDATE scheduled_posts
        SET status = 'pending',
            retry_count = retry_count + 1,
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        RETURNING retry_count
        "#,
    )
    .bind(post_id)
    .fetch_one(executor)
    .await?;

    Ok(row.0)
}

/// Settle a claimed post as published. Conditional on the claim so a stale
/// handler can never overwrite a settled row.
pub async fn mark_posted<'e, E>(
    executor: E,
    post_id: i64,
    linkedin_post_id: &str,
    recovery_method: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'posted',
            linkedin_post_id = $2,
            recovery_method = $3,
            posted_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(post_id)
    .bind(linkedin_post_id)
    .bind(recovery_method)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Settle a claimed post as terminally failed, recording the error taxonomy
/// code and message.
pub async fn mark_failed<'e, E>(
    executor: E,
    post_id: i64,
    error_code: &str,
    error_message: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'failed',
            error_code = $2,
            error_message = $3,
            failed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(post_id)
    .bind(error_code)
    .bind(error_message)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Create a new pending post for the scheduling API.
pub async fn create_post<'e, E>(
    executor: E,
    user_id: i64,
    user_email: &str,
    content: &str,
    images: &[String],
    scheduled_for: DateTime<Utc>,
    max_retries: i32,
) -> Result<ScheduledPost, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO scheduled_posts (user_id, user_email, content, images, scheduled_for, max_retries)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, user_id, user_email, content, images, scheduled_for, status,
                  retry_count, max_retries, linkedin_post_id, error_message, error_code,
                  failed_at, recovery_method, posted_at, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(user_email)
    .bind(content)
    .bind(images)
    .bind(scheduled_for)
    .bind(max_retries)
    .fetch_one(executor)
    .await
}

/// Parsed status filter for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Only(PostStatus),
    All,
}

impl StatusFilter {
    pub fn from_str(s: Option<&str>) -> Self {
        match s {
            Some("pending") => StatusFilter::Only(PostStatus::Pending),
            Some("processing") => StatusFilter::Only(PostStatus::Processing),
            Some("posted") => StatusFilter::Only(PostStatus::Posted),
            Some("failed") => StatusFilter::Only(PostStatus::Failed),
            Some("paused") => StatusFilter::Only(PostStatus::Paused),
            Some("cancelled") => StatusFilter::Only(PostStatus::Cancelled),
            _ => StatusFilter::All,
        }
    }

    /// SQL WHERE fragment. Safe to interpolate: statuses come from the fixed
    /// enum above, never from raw request input.
    fn where_clause(&self) -> String {
        match self {
            StatusFilter::Only(status) => format!("AND status = '{}'", status.as_str()),
            StatusFilter::All => String::new(),
        }
    }
}

/// Count a user's posts for pagination
pub async fn count_posts<'e, E>(
    executor: E,
    user_id: i64,
    status_filter: Option<&str>,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let filter = StatusFilter::from_str(status_filter);
    let query = format!(
        "SELECT COUNT(*) FROM scheduled_posts WHERE user_id = $1 {}",
        filter.where_clause()
    );

    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(user_id)
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// List a user's posts with pagination, newest schedule first
pub async fn list_posts<'e, E>(
    executor: E,
    user_id: i64,
    status_filter: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ScheduledPost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let filter = StatusFilter::from_str(status_filter);
    let query = format!(
        r#"SELECT id, user_id, user_email, content, images, scheduled_for, status,
                  retry_count, max_retries, linkedin_post_id, error_message, error_code,
                  failed_at, recovery_method, posted_at, created_at, updated_at
           FROM scheduled_posts
           WHERE user_id = $1 {}
           ORDER BY scheduled_for DESC
           LIMIT $2 OFFSET $3"#,
        filter.where_clause()
    );

    sqlx::query_as(&query)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
}

/// Pause a pending post. Returns false if the post was not pending.
pub async fn pause_post<'e, E>(
    executor: E,
    post_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'paused', updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = 'pending'
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resume a paused post back to pending.
pub async fn resume_post<'e, E>(
    executor: E,
    post_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'pending', updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = 'paused'
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel a post that has not yet settled. Claimed (`processing`) posts are
/// excluded: an in-flight publish cannot be recalled.
pub async fn cancel_post<'e, E>(
    executor: E,
    post_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE scheduled_posts
        SET status = 'cancelled', updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status IN ('pending', 'paused')
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_rejects_unknown_values() {
        assert_eq!(StatusFilter::from_str(Some("pending")), StatusFilter::Only(PostStatus::Pending));
        assert_eq!(StatusFilter::from_str(Some("'; DROP TABLE")), StatusFilter::All);
        assert_eq!(StatusFilter::from_str(None), StatusFilter::All);
    }
}
