//! Credit balance and ledger endpoints (/credits/*)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::domain::credits;
use crate::routes::auth::AuthUser;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/credits", get(get_balance))
        .route("/credits/transactions", get(list_transactions))
}

#[derive(Serialize)]
struct BalanceResponse {
    credits: i32,
    monthly_credits: i32,
    total: i32,
}

/// GET /credits - Current balance across both pools
async fn get_balance(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceResponse>, StatusCode> {
    let balance = credits::get_balance(&state.db, user_id)
        .await
        .log_500("Get balance error")?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(BalanceResponse {
        credits: balance.credits,
        monthly_credits: balance.monthly_credits,
        total: balance.total(),
    }))
}

#[derive(Deserialize)]
struct ListTransactionsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Serialize)]
struct TransactionResponse {
    id: i64,
    post_id: Option<i64>,
    amount: i32,
    balance_after: i32,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ListTransactionsResponse {
    transactions: Vec<TransactionResponse>,
    total: i64,
    has_more: bool,
}

/// GET /credits/transactions - Paginated ledger history, newest first
async fn list_transactions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let total = credits::count_transactions(&state.db, user_id)
        .await
        .log_500("Count transactions error")?;

    let rows = credits::list_transactions(&state.db, user_id, limit, offset)
        .await
        .log_500("List transactions error")?;

    let has_more = offset + (rows.len() as i64) < total;

    Ok(Json(ListTransactionsResponse {
        transactions: rows
            .into_iter()
            .map(|t| TransactionResponse {
                id: t.id,
                post_id: t.post_id,
                amount: t.amount,
                balance_after: t.balance_after,
                description: t.description,
                created_at: t.created_at,
            })
            .collect(),
        total,
        has_more,
    }))
}
