//! Scheduled post management endpoints (/posts/*)
//!
//! Creation and user-driven lifecycle transitions only. Delivery itself is
//! owned by the cron sweeps; these handlers never touch a claimed post.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_POST_CONTENT_CHARS, MAX_POST_IMAGES,
};
use crate::domain::posts::{self, PostStatus, ScheduledPost};
use crate::domain::users;
use crate::routes::auth::AuthUser;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}/pause", post(pause_post))
        .route("/posts/{id}/resume", post(resume_post))
        .route("/posts/{id}/cancel", post(cancel_post))
}

#[derive(Serialize)]
struct PostResponse {
    id: i64,
    content: String,
    images: Vec<String>,
    scheduled_for: DateTime<Utc>,
    status: PostStatus,
    retry_count: i32,
    max_retries: i32,
    linkedin_post_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    recovery_method: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ScheduledPost> for PostResponse {
    fn from(p: ScheduledPost) -> Self {
        Self {
            id: p.id,
            content: p.content,
            images: p.images,
            scheduled_for: p.scheduled_for,
            status: p.status,
            retry_count: p.retry_count,
            max_retries: p.max_retries,
            linkedin_post_id: p.linkedin_post_id,
            error_code: p.error_code,
            error_message: p.error_message,
            recovery_method: p.recovery_method,
            posted_at: p.posted_at,
            created_at: p.created_at,
        }
    }
}

#[derive(Deserialize)]
struct CreatePostRequest {
    content: String,
    #[serde(default)]
    images: Vec<String>,
    scheduled_for: DateTime<Utc>,
}

/// POST /posts - Schedule a new post
async fn create_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), StatusCode> {
    let content = req.content.trim();
    if content.is_empty() || content.chars().count() > MAX_POST_CONTENT_CHARS {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.images.len() > MAX_POST_IMAGES {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.scheduled_for <= Utc::now() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = users::get_user_by_id(&state.db, user_id)
        .await
        .log_500("Get user error")?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let created = posts::create_post(
        &state.db,
        user_id,
        &user.email,
        content,
        &req.images,
        req.scheduled_for,
        DEFAULT_MAX_RETRIES,
    )
    .await
    .log_500("Create post error")?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(created))))
}

#[derive(Deserialize)]
struct ListPostsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<String>,
}

#[derive(Serialize)]
struct ListPostsResponse {
    posts: Vec<PostResponse>,
    total: i64,
    has_more: bool,
}

/// GET /posts - List the user's scheduled posts with pagination
async fn list_posts(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<ListPostsResponse>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let status_filter = query.status.as_deref();

    let total = posts::count_posts(&state.db, user_id, status_filter)
        .await
        .log_500("Count posts error")?;

    let result = posts::list_posts(&state.db, user_id, status_filter, limit, offset)
        .await
        .log_500("List posts error")?;

    let has_more = offset + (result.len() as i64) < total;

    Ok(Json(ListPostsResponse {
        posts: result.into_iter().map(PostResponse::from).collect(),
        total,
        has_more,
    }))
}

/// POST /posts/:id/pause - Put a pending post on hold
async fn pause_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let paused = posts::pause_post(&state.db, post_id, user_id)
        .await
        .log_500("Pause post error")?;

    if !paused {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/:id/resume - Release a paused post back to pending
async fn resume_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let resumed = posts::resume_post(&state.db, post_id, user_id)
        .await
        .log_500("Resume post error")?;

    if !resumed {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/:id/cancel - Cancel a post that has not yet settled
async fn cancel_post(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let cancelled = posts::cancel_post(&state.db, post_id, user_id)
        .await
        .log_500("Cancel post error")?;

    if !cancelled {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(StatusCode::NO_CONTENT)
}
