use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockyard API",
        version = "1.0.0",
        description = r#"
# Stockyard Warehouse Ledger API

Records stock movements between warehouses and projects and keeps a running
balance per item and location.

## Features

- **Transactions**: RECEIVE, SHIP, TRANSFER, DIVISION_TRANSFER, PROJECT_ISSUE and PROJECT_RETURN, scoped to the caller's division
- **Offline sync**: push queued operations (each applied at most once) and pull incremental snapshots
- **Projects**: every project owns a virtual stock location
- **Reports**: current stock levels and low-stock items

## Authentication

Every `/api/v1` endpoint requires a bearer token issued by the identity provider:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one body shape. `code` is a stable machine-readable kind:

```json
{
  "error": "Forbidden",
  "code": "forbidden",
  "message": "forbidden: location out of your division",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "transactions", description = "Stock movements"),
        (name = "sync", description = "Offline outbox push and incremental pull"),
        (name = "projects", description = "Projects and their stock locations"),
        (name = "inventory", description = "Stock levels"),
        (name = "reports", description = "Reporting endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::list_transactions,
        crate::handlers::sync::push,
        crate::handlers::sync::pull,
        crate::handlers::projects::create_project,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::project_stock,
        crate::handlers::inventory::stock_levels,
        crate::handlers::reports::low_stock,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::entities::item::Model,
            crate::entities::location::Model,
            crate::entities::project::Model,
            crate::entities::stock::Model,
            crate::entities::transaction::Model,
            crate::entities::TxnType,
            crate::entities::LocationKind,
            crate::entities::SyncOpKind,
            crate::auth::Role,
            crate::services::transactions::NewTransaction,
            crate::services::projects::NewProject,
            crate::services::sync::SyncOp,
            crate::services::sync::SyncStatus,
            crate::services::sync::OpResult,
            crate::services::sync::PushRequest,
            crate::services::sync::PushResponse,
            crate::services::sync::PullResponse,
            crate::services::reports::StockLine,
            crate::services::reports::LowStockRow,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_every_route() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Stockyard API"));
        for path in [
            "/api/v1/transactions",
            "/api/v1/sync/push",
            "/api/v1/sync/pull",
            "/api/v1/projects",
            "/api/v1/projects/{id}/stock",
            "/api/v1/inventory/stock",
            "/api/v1/reports/low-stock",
        ] {
            assert!(json.contains(path), "missing {path}");
        }
        assert!(json.contains("bearer_auth"));
    }
}
