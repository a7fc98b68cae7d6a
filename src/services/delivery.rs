//! Scheduled post delivery pipeline, shared by both cron sweeps
//!
//! Each sweep claims its window of due posts (`pending -> processing`,
//! conditional update with `FOR UPDATE SKIP LOCKED`), then walks the batch
//! sequentially. A post failing never aborts the rest of the batch; every
//! outcome is reported back to the caller for the endpoint's results array.
//!
//! Credits are deducted only after LinkedIn confirms the publish. Once a
//! post is live, bookkeeping failures are logged as critical but never
//! surface as a post failure - a live share must not be re-attempted.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::constants::{BACKUP_WINDOW_MINUTES, PRIMARY_WINDOW_MINUTES, STALE_CLAIM_MINUTES};
use crate::domain::{credits, posts, users};
use crate::domain::posts::ClaimedPost;
use crate::domain::users::PublishingUser;
use crate::services::linkedin::LinkedInClient;

pub const ERR_USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub const ERR_INSUFFICIENT_CREDITS: &str = "INSUFFICIENT_CREDITS";
pub const ERR_LINKEDIN_NOT_CONNECTED: &str = "LINKEDIN_NOT_CONNECTED";
pub const ERR_DATABASE: &str = "DATABASE_ERROR";

/// Which cron trigger is running the sweep. The two differ only in their
/// claim window and retry policy; everything else is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronMode {
    Primary,
    Backup,
}

impl CronMode {
    /// Claim window as minutes-before-now: posts with `scheduled_for` in
    /// `[now - start, now - end]` are eligible.
    pub fn window_minutes(&self) -> (i64, i64) {
        match self {
            CronMode::Primary => (PRIMARY_WINDOW_MINUTES, 0),
            CronMode::Backup => (BACKUP_WINDOW_MINUTES, PRIMARY_WINDOW_MINUTES),
        }
    }

    /// Audit tag recorded on posts this sweep completes.
    pub fn recovery_method(&self) -> &'static str {
        match self {
            CronMode::Primary => "primary_cron",
            CronMode::Backup => "backup_cron",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CronMode::Primary => "external-auto-post",
            CronMode::Backup => "backup-auto-post",
        }
    }
}

/// Per-post outcome reported in the cron endpoint's results array.
/// Field names are the wire contract consumed by the ops dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOutcome {
    pub post_id: i64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_in_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_method: Option<&'static str>,
}

impl PostOutcome {
    fn posted(post_id: i64, linkedin_post_id: String, mode: CronMode) -> Self {
        Self {
            post_id,
            status: "posted",
            linked_in_post_id: Some(linkedin_post_id),
            error_code: None,
            error: None,
            retry_count: None,
            recovery_method: Some(mode.recovery_method()),
        }
    }

    fn failed(post_id: i64, error_code: &str, error: String) -> Self {
        Self {
            post_id,
            status: "failed",
            linked_in_post_id: None,
            error_code: Some(error_code.to_string()),
            error: Some(error),
            retry_count: None,
            recovery_method: None,
        }
    }

    fn retry_scheduled(post_id: i64, retry_count: i32, error: String) -> Self {
        Self {
            post_id,
            status: "retry_scheduled",
            linked_in_post_id: None,
            error_code: None,
            error: Some(error),
            retry_count: Some(retry_count),
            recovery_method: None,
        }
    }

    fn skipped(post_id: i64) -> Self {
        Self {
            post_id,
            status: "skipped",
            linked_in_post_id: None,
            error_code: None,
            error: None,
            retry_count: None,
            recovery_method: None,
        }
    }
}

/// What to do with a claimed post after a publish failure.
#[derive(Debug, PartialEq, Eq)]
enum FailureAction {
    Retry,
    Fail,
}

/// The primary sweep retries up to the per-post cap; the backup sweep is a
/// single-shot safety net and fails terminally on first error.
fn on_publish_failure(mode: CronMode, retry_count: i32, max_retries: i32) -> FailureAction {
    match mode {
        CronMode::Primary if retry_count < max_retries => FailureAction::Retry,
        _ => FailureAction::Fail,
    }
}

/// Pre-publish eligibility gate. An ineligible post fails here, before the
/// adapter is reached, so it never triggers an upload or a ledger write.
/// Returns the LinkedIn person id and access token on success.
fn check_eligibility(
    user: Option<PublishingUser>,
) -> Result<(String, String), (&'static str, &'static str)> {
    let Some(user) = user else {
        return Err((ERR_USER_NOT_FOUND, "User not found"));
    };
    if user.total_available_credits() < 1 {
        return Err((ERR_INSUFFICIENT_CREDITS, "Insufficient credits"));
    }
    match (user.linkedin_id, user.linkedin_access_token) {
        (Some(person_id), Some(access_token)) => Ok((person_id, access_token)),
        _ => Err((ERR_LINKEDIN_NOT_CONNECTED, "LinkedIn account not connected")),
    }
}

/// Claim and deliver every due post for the given sweep.
/// Errors escape only if the claim query itself fails; per-post errors are
/// folded into the outcomes.
pub async fn run_sweep(
    db: &PgPool,
    linkedin: &LinkedInClient,
    mode: CronMode,
) -> Result<Vec<PostOutcome>, sqlx::Error> {
    // Surface posts stranded in `processing` by a crash between claim and
    // settle. Neither sweep will pick them up again; an operator has to.
    match posts::count_stale_claims(db, STALE_CLAIM_MINUTES).await {
        Ok(0) => {}
        Ok(stale) => eprintln!(
            "[{}] {} posts stuck in processing for over {} minutes, operator attention needed",
            mode.label(),
            stale,
            STALE_CLAIM_MINUTES
        ),
        Err(e) => eprintln!("[{}] Stale claim check failed: {}", mode.label(), e),
    }

    let (start, end) = mode.window_minutes();
    let claimed = posts::claim_due_posts(db, start, end).await?;

    if !claimed.is_empty() {
        println!("[{}] Claimed {} due posts", mode.label(), claimed.len());
    }

    let mut outcomes = Vec::with_capacity(claimed.len());
    for post in &claimed {
        outcomes.push(deliver_one(db, linkedin, post, mode).await);
    }

    Ok(outcomes)
}

/// Deliver a single claimed post. Infallible by design: any database error
/// along the way is converted into a terminal failure on the post itself.
async fn deliver_one(
    db: &PgPool,
    linkedin: &LinkedInClient,
    post: &ClaimedPost,
    mode: CronMode,
) -> PostOutcome {
    match try_deliver(db, linkedin, post, mode).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!(
                "[{}] Database error while delivering post {}: {}",
                mode.label(),
                post.id,
                e
            );
            let message = e.to_string();
            if let Err(mark_err) = posts::mark_failed(db, post.id, ERR_DATABASE, &message).await {
                eprintln!(
                    "[{}] CRITICAL: could not record failure for post {}: {}",
                    mode.label(),
                    post.id,
                    mark_err
                );
            }
            PostOutcome::failed(post.id, ERR_DATABASE, message)
        }
    }
}

async fn try_deliver(
    db: &PgPool,
    linkedin: &LinkedInClient,
    post: &ClaimedPost,
    mode: CronMode,
) -> Result<PostOutcome, sqlx::Error> {
    // Defensive re-check: the claim window should exclude future posts, but
    // a post must never go out early.
    if post.scheduled_for > Utc::now() {
        posts::release_claim(db, post.id).await?;
        return Ok(PostOutcome::skipped(post.id));
    }

    let user = users::get_user_for_publishing(db, post.user_id).await?;
    let (person_id, access_token) = match check_eligibility(user) {
        Ok(creds) => creds,
        Err((code, message)) => {
            posts::mark_failed(db, post.id, code, message).await?;
            return Ok(PostOutcome::failed(post.id, code, message.to_string()));
        }
    };

    match linkedin
        .publish_post(&access_token, &person_id, &post.content, &post.images)
        .await
    {
        Ok(linkedin_post_id) => {
            // The share is live. Bookkeeping failures from here on are
            // logged, never propagated: propagating would mark the post
            // failed and invite a duplicate publish.
            if let Err(e) = settle_published(db, post, mode, &linkedin_post_id).await {
                eprintln!(
                    "[{}] CRITICAL: post {} published as {} but settlement failed: {}",
                    mode.label(),
                    post.id,
                    linkedin_post_id,
                    e
                );
            }
            Ok(PostOutcome::posted(post.id, linkedin_post_id, mode))
        }
        Err(e) => {
            let message = e.to_string();
            eprintln!(
                "[{}] Publish failed for post {}: {}",
                mode.label(),
                post.id,
                message
            );
            match on_publish_failure(mode, post.retry_count, post.max_retries) {
                FailureAction::Retry => {
                    let retry_count = posts::record_retry(db, post.id).await?;
                    Ok(PostOutcome::retry_scheduled(post.id, retry_count, message))
                }
                FailureAction::Fail => {
                    posts::mark_failed(db, post.id, e.error_code(), &message).await?;
                    Ok(PostOutcome::failed(post.id, e.error_code(), message))
                }
            }
        }
    }
}

/// One transaction: deduct the credit (monthly pool first), append the
/// ledger row, settle the post as posted.
async fn settle_published(
    db: &PgPool,
    post: &ClaimedPost,
    mode: CronMode,
    linkedin_post_id: &str,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    match credits::deduct_publish_credit(&mut *tx, post.user_id).await? {
        Some(balance) => {
            credits::record_transaction(
                &mut *tx,
                post.user_id,
                Some(post.id),
                -1,
                balance.total(),
                "Scheduled LinkedIn post published",
            )
            .await?;
        }
        None => {
            // Pre-check passed but the balance moved underneath us. The
            // share is live regardless; flag the discrepancy for ops.
            eprintln!(
                "[{}] CRITICAL: post {} published but user {} had no credit left to deduct",
                mode.label(),
                post.id,
                post.user_id
            );
        }
    }

    posts::mark_posted(&mut *tx, post.id, linkedin_post_id, mode.recovery_method()).await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_window_covers_last_five_minutes() {
        assert_eq!(CronMode::Primary.window_minutes(), (5, 0));
    }

    #[test]
    fn backup_window_covers_five_to_sixty_minutes_overdue() {
        // Posts newer than 5 minutes overdue belong to the primary sweep;
        // posts older than 60 minutes are abandoned.
        assert_eq!(CronMode::Backup.window_minutes(), (60, 5));
    }

    #[test]
    fn primary_retries_until_cap_then_fails() {
        assert_eq!(on_publish_failure(CronMode::Primary, 0, 3), FailureAction::Retry);
        assert_eq!(on_publish_failure(CronMode::Primary, 2, 3), FailureAction::Retry);
        assert_eq!(on_publish_failure(CronMode::Primary, 3, 3), FailureAction::Fail);
    }

    #[test]
    fn backup_is_single_shot() {
        assert_eq!(on_publish_failure(CronMode::Backup, 0, 3), FailureAction::Fail);
    }

    fn connected_user(credits: i32, monthly_credits: i32) -> PublishingUser {
        PublishingUser {
            id: 1,
            email: "user@example.com".to_string(),
            linkedin_id: Some("abc123".to_string()),
            linkedin_access_token: Some("token".to_string()),
            credits,
            monthly_credits,
        }
    }

    #[test]
    fn zero_credit_user_fails_before_the_adapter() {
        // Connected account, empty balance: the gate rejects with the
        // credits code, so no upload or ledger write can ever happen.
        let err = check_eligibility(Some(connected_user(0, 0))).unwrap_err();
        assert_eq!(err, (ERR_INSUFFICIENT_CREDITS, "Insufficient credits"));
    }

    #[test]
    fn missing_user_fails_with_user_not_found() {
        let err = check_eligibility(None).unwrap_err();
        assert_eq!(err.0, ERR_USER_NOT_FOUND);
    }

    #[test]
    fn unconnected_user_fails_with_not_connected() {
        let mut user = connected_user(5, 0);
        user.linkedin_access_token = None;
        let err = check_eligibility(Some(user)).unwrap_err();
        assert_eq!(err.0, ERR_LINKEDIN_NOT_CONNECTED);
    }

    #[test]
    fn monthly_credits_alone_are_enough() {
        let (person_id, token) = check_eligibility(Some(connected_user(0, 1))).unwrap();
        assert_eq!(person_id, "abc123");
        assert_eq!(token, "token");
    }

    #[test]
    fn stale_claim_cutoff_outlasts_both_sweeps() {
        // A claim is only reported stranded once even the backup window
        // can no longer reach it.
        assert!(STALE_CLAIM_MINUTES > BACKUP_WINDOW_MINUTES);
    }

    #[test]
    fn recovery_method_tags() {
        assert_eq!(CronMode::Primary.recovery_method(), "primary_cron");
        assert_eq!(CronMode::Backup.recovery_method(), "backup_cron");
    }

    #[test]
    fn outcome_serializes_with_wire_field_names() {
        let outcome = PostOutcome::posted(7, "urn:li:share:42".to_string(), CronMode::Backup);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["postId"], 7);
        assert_eq!(json["status"], "posted");
        assert_eq!(json["linkedInPostId"], "urn:li:share:42");
        assert_eq!(json["recoveryMethod"], "backup_cron");
        assert!(json.get("error").is_none());
    }
}
