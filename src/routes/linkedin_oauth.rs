//! LinkedIn OAuth endpoints (/auth/linkedin/*)
//!
//! Connecting a LinkedIn account doubles as login: the callback upserts the
//! user keyed on the LinkedIn member id and issues session cookies.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::AppState;
use crate::domain::users;
use crate::services::error::LogErr;
use crate::services::{cookies, linkedin, session};

pub fn routes() -> Router<Arc<AppState>> {
    // Stricter limit for OAuth endpoints
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(12)
        .burst_size(5)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    Router::new()
        .route("/auth/linkedin", get(auth_linkedin))
        .route("/auth/linkedin/token", post(auth_linkedin_token))
        .layer(rate_limit_layer)
}

#[derive(Serialize)]
struct AuthUrlResponse {
    url: String,
}

/// GET /auth/linkedin - Start OAuth flow, returns URL to redirect user to
async fn auth_linkedin(State(state): State<Arc<AppState>>) -> Json<AuthUrlResponse> {
    let auth_request = state
        .linkedin
        .get_authorize_url(&["openid", "profile", "email", "w_member_social"]);

    if let Err(e) = linkedin::save_oauth_state(&state.db, &auth_request.state).await {
        // Return the URL anyway; the exchange will fail cleanly if the
        // state was never persisted.
        eprintln!("Failed to save OAuth state: {}", e);
    }

    Json(AuthUrlResponse {
        url: auth_request.url,
    })
}

#[derive(Deserialize)]
struct TokenRequest {
    code: String,
    state: String,
}

#[derive(Serialize)]
struct LoginResponse {
    email: String,
}

/// POST /auth/linkedin/token - Exchange OAuth code for a session.
/// Sets httpOnly cookies for access_token (JWT) and refresh_token.
async fn auth_linkedin_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<Response, StatusCode> {
    let state_known = linkedin::take_oauth_state(&state.db, &req.state)
        .await
        .log_500("Get OAuth state error")?;
    if !state_known {
        return Err(StatusCode::BAD_REQUEST);
    }

    let token_response = state
        .linkedin
        .exchange_code(&req.code)
        .await
        .log_500("Token exchange error")?;

    let profile = state
        .linkedin
        .get_userinfo(&token_response.access_token)
        .await
        .log_500("Userinfo error")?;

    let email = profile.email.ok_or_else(|| {
        eprintln!("LinkedIn profile {} carried no email", profile.sub);
        StatusCode::BAD_REQUEST
    })?;

    let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);

    let user_id = users::upsert_linkedin_user(
        &state.db,
        &profile.sub,
        &email,
        profile.name.as_deref(),
        &token_response.access_token,
        expires_at,
    )
    .await
    .log_500("Upsert user error")?;

    let access_token = session::create_access_token(user_id, &state.jwt_secret)
        .log_500("Failed to create access token")?;

    let refresh_token = session::create_refresh_token(user_id, &state.db)
        .await
        .log_500("Failed to create refresh token")?;

    let body = Json(LoginResponse { email });

    let mut response = body.into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_access_cookie(&access_token)?);
    response
        .headers_mut()
        .append(SET_COOKIE, cookies::build_refresh_cookie(&refresh_token)?);

    Ok(response)
}
