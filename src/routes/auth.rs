//! Authentication and session management endpoints

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::SET_COOKIE, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::AppState;
use crate::domain::users;
use crate::services::error::LogErr;
use crate::services::{cookies, session};

pub fn routes() -> Router<Arc<AppState>> {
    // Rate limit auth endpoints to blunt brute-force attempts
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    Router::new()
        .route("/auth/refresh", post(refresh_session))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
        .layer(rate_limit_layer)
}

/// Extractor that validates the access_token cookie and returns the user_id
pub struct AuthUser(pub i64);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .log_500("Cookie extraction error")?;

        let access_token = jar
            .get(cookies::config::ACCESS_TOKEN_NAME)
            .map(|c| c.value())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let user_id = session::validate_access_token(access_token, &state.jwt_secret)
            .log_status("JWT validation failed", StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser(user_id))
    }
}

/// POST /auth/refresh - Rotate the refresh token and reissue the access JWT.
/// Old refresh tokens are single-use; a reused token is rejected.
async fn refresh_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, StatusCode> {
    let old_refresh_token = jar
        .get(cookies::config::REFRESH_TOKEN_NAME)
        .map(|c| c.value().to_string())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Invalid/expired tokens are routine for stale sessions, no logging
    let (user_id, new_refresh_token) = session::rotate_refresh_token(&old_refresh_token, &state.db)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let access_token = session::create_access_token(user_id, &state.jwt_secret)
        .log_500("Failed to create access token")?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_access_cookie(&access_token)?);
    response.headers_mut().append(
        SET_COOKIE,
        cookies::build_refresh_cookie(&new_refresh_token)?,
    );

    Ok(response)
}

/// POST /auth/logout - Clear session and revoke the refresh token
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(refresh_token) = jar.get(cookies::config::REFRESH_TOKEN_NAME) {
        if let Err(e) = session::revoke_refresh_token(refresh_token.value(), &state.db).await {
            // The user still logs out client-side either way
            eprintln!("Failed to revoke refresh token during logout: {}", e);
        }
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_access_cookie());
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_clear_refresh_cookie());

    response
}

#[derive(Serialize)]
struct MeResponse {
    id: i64,
    email: String,
    linkedin_connected: bool,
    linkedin_name: Option<String>,
}

/// GET /auth/me - Get current user info (validates session)
async fn get_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, StatusCode> {
    let user = users::get_user_by_id(&state.db, user_id)
        .await
        .log_500("Get user by ID error")?;

    // A valid JWT for a deleted user is still unauthorized
    let user = user.ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(MeResponse {
        id: user_id,
        email: user.email,
        linkedin_connected: user.linkedin_id.is_some(),
        linkedin_name: user.linkedin_name,
    }))
}
