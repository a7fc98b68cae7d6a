//! Cron trigger endpoints (/api/cron/*)
//!
//! Both handlers are invoked by external scheduler services on fixed
//! intervals: the primary every minute or so, the backup on a coarser
//! cadence as a safety net for posts the primary missed. GET is an alias
//! for POST so a sweep can be kicked off manually from a browser.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use crate::services::delivery::{self, CronMode, PostOutcome};
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/cron/external-auto-post",
            post(external_auto_post).get(external_auto_post),
        )
        .route(
            "/api/cron/backup-auto-post",
            post(backup_auto_post).get(backup_auto_post),
        )
}

/// Check the shared-secret bearer token the scheduler sends.
fn authorize_cron(headers: &HeaderMap, secret: &str) -> bool {
    let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return false;
    };
    !secret.is_empty() && token == secret
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CronRunResponse {
    message: String,
    processed_at: DateTime<Utc>,
    results: Vec<PostOutcome>,
}

async fn run_sweep_endpoint(
    state: Arc<AppState>,
    headers: HeaderMap,
    mode: CronMode,
) -> Result<Json<CronRunResponse>, StatusCode> {
    if !authorize_cron(&headers, &state.cron_secret) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let results = delivery::run_sweep(&state.db, &state.linkedin, mode)
        .await
        .log_500(&format!("[{}] Sweep failed", mode.label()))?;

    Ok(Json(CronRunResponse {
        message: format!("Processed {} scheduled posts", results.len()),
        processed_at: Utc::now(),
        results,
    }))
}

/// POST|GET /api/cron/external-auto-post - primary delivery sweep
async fn external_auto_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CronRunResponse>, StatusCode> {
    run_sweep_endpoint(state, headers, CronMode::Primary).await
}

/// POST|GET /api/cron/backup-auto-post - recovery sweep for missed posts
async fn backup_auto_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CronRunResponse>, StatusCode> {
    run_sweep_endpoint(state, headers, CronMode::Backup).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_matching_bearer_secret() {
        let headers = headers_with_auth("Bearer sweep-secret");
        assert!(authorize_cron(&headers, "sweep-secret"));
    }

    #[test]
    fn rejects_wrong_secret_and_malformed_headers() {
        assert!(!authorize_cron(&headers_with_auth("Bearer nope"), "sweep-secret"));
        assert!(!authorize_cron(&headers_with_auth("sweep-secret"), "sweep-secret"));
        assert!(!authorize_cron(&HeaderMap::new(), "sweep-secret"));
    }

    #[test]
    fn rejects_empty_configured_secret() {
        // A blank CRON_SECRET must not open the endpoint up.
        let headers = headers_with_auth("Bearer ");
        assert!(!authorize_cron(&headers, ""));
    }
}
