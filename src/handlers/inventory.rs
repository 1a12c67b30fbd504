use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::reports::StockLine;

pub fn inventory_routes() -> Router<AppState> {
    Router::new().route("/stock", get(stock_levels))
}

/// Current balances, most recently moved first
#[utoipa::path(
    get,
    path = "/api/v1/inventory/stock",
    responses(
        (status = 200, description = "Stock levels", body = [StockLine]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn stock_levels(
    State(state): State<AppState>,
) -> Result<Json<Vec<StockLine>>, ServiceError> {
    Ok(Json(state.services.reports.stock_levels().await?))
}
