use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::reports::LowStockRow;

pub fn reports_routes() -> Router<AppState> {
    Router::new().route("/low-stock", get(low_stock))
}

/// Items whose total stock is under their reorder level
#[utoipa::path(
    get,
    path = "/api/v1/reports/low-stock",
    responses(
        (status = 200, description = "Low stock items, lowest first", body = [LowStockRow]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "reports"
)]
pub async fn low_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<LowStockRow>>, ServiceError> {
    Ok(Json(state.services.reports.low_stock().await?))
}
