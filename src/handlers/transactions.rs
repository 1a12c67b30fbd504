use axum::{
    extract::{Json, Query, State},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::Caller;
use crate::entities::transaction;
use crate::errors::ServiceError;
use crate::handlers::{AppState, ValidJson};
use crate::services::transactions::NewTransaction;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RecentParams {
    /// Capped by the server's configured limit
    pub limit: Option<u64>,
}

pub fn transactions_routes() -> Router<AppState> {
    Router::new().route("/", get(list_transactions).post(create_transaction))
}

/// Record a stock movement
///
/// Replaying a request whose `offlineOpId` was already recorded returns the
/// original record without moving stock again.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = NewTransaction,
    responses(
        (status = 200, description = "Transaction recorded (or replayed)", body = transaction::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Out of scope for the caller", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item, location or project not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ValidJson(req): ValidJson<NewTransaction>,
) -> Result<Json<transaction::Model>, ServiceError> {
    let recorded = state.services.transactions.record(&caller, req).await?;
    Ok(Json(recorded.into_model()))
}

/// Latest transactions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(RecentParams),
    responses(
        (status = 200, description = "Recent transactions", body = [transaction::Model]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<transaction::Model>>, ServiceError> {
    let cap = state.config.recent_transactions_limit;
    let limit = params.limit.map_or(cap, |l| l.min(cap).max(1));
    let txns = state.services.transactions.list_recent(limit).await?;
    Ok(Json(txns))
}
