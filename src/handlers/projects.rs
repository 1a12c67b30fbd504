use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::get,
    Extension, Router,
};
use uuid::Uuid;

use crate::auth::Caller;
use crate::entities::project;
use crate::errors::ServiceError;
use crate::handlers::{AppState, ValidJson};
use crate::services::projects::NewProject;
use crate::services::reports::StockLine;

pub fn projects_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id/stock", get(project_stock))
}

/// Create a project and its stock location
#[utoipa::path(
    post,
    path = "/api/v1/projects",
    request_body = NewProject,
    responses(
        (status = 201, description = "Project created", body = project::Model),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Role not permitted", body = crate::errors::ErrorResponse),
        (status = 404, description = "Division not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ValidJson(req): ValidJson<NewProject>,
) -> Result<(StatusCode, Json<project::Model>), ServiceError> {
    let project = state.services.projects.create_project(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects",
    responses(
        (status = 200, description = "Projects visible to the caller", body = [project::Model]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<project::Model>>, ServiceError> {
    Ok(Json(state.services.projects.list_projects(&caller).await?))
}

/// Stock held at a project's location
#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/stock",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Balances at the project location", body = [StockLine]),
        (status = 404, description = "Project not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "projects"
)]
pub async fn project_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StockLine>>, ServiceError> {
    Ok(Json(state.services.projects.project_stock(id).await?))
}
