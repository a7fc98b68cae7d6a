pub mod auth;
pub mod credits;
pub mod cron;
pub mod linkedin_oauth;
pub mod posts;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(credits::routes())
        .merge(cron::routes())
        .merge(linkedin_oauth::routes())
        .merge(posts::routes())
}
