use axum::{
    extract::{Json, Query, State},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::Caller;
use crate::errors::ServiceError;
use crate::handlers::{AppState, ValidJson};
use crate::services::sync::{since_watermark, PullResponse, PushRequest, PushResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PullParams {
    /// Epoch milliseconds of the client's last pull
    pub since: Option<String>,
}

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/push", post(push))
        .route("/pull", get(pull))
}

/// Apply queued offline operations, each at most once
#[utoipa::path(
    post,
    path = "/api/v1/sync/push",
    request_body = PushRequest,
    responses(
        (status = 200, description = "Per-operation results", body = PushResponse),
        (status = 400, description = "Malformed batch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn push(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ValidJson(batch): ValidJson<PushRequest>,
) -> Json<PushResponse> {
    Json(state.services.sync.push(&caller, batch.ops).await)
}

/// Everything changed since the given watermark
#[utoipa::path(
    get,
    path = "/api/v1/sync/pull",
    params(PullParams),
    responses(
        (status = 200, description = "Incremental snapshot", body = PullResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "sync"
)]
pub async fn pull(
    State(state): State<AppState>,
    Query(params): Query<PullParams>,
) -> Result<Json<PullResponse>, ServiceError> {
    let since = since_watermark(params.since.as_deref());
    Ok(Json(state.services.sync.pull(since).await?))
}
