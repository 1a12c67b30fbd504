#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use stockyard_api::{
    auth::{Caller, Claims, Role},
    config::AppConfig,
    db,
    entities::{division, item, location, project, LocationKind},
    events::{self, EventSender},
    services::{projects::NewProject, stock_ledger},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration_test_secret_that_is_long_enough";

/// Application state and router backed by a throwaway SQLite file
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("stockyard_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let router = stockyard_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        self.state.db.as_ref()
    }

    pub async fn seed_division(&self, name: &str) -> Uuid {
        division::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed division")
        .id
    }

    pub async fn seed_item(&self, sku: &str, reorder_level: i32) -> item::Model {
        let now = Utc::now();
        item::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Item {sku}")),
            barcode: Set(None),
            reorder_level: Set(reorder_level),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed item")
    }

    pub async fn seed_warehouse(&self, code: &str, division_id: Option<Uuid>) -> location::Model {
        let now = Utc::now();
        location::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            name: Set(format!("Warehouse {code}")),
            kind: Set(LocationKind::Warehouse),
            division_id: Set(division_id),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed warehouse")
    }

    pub async fn seed_project(&self, code: &str, division_id: Uuid) -> project::Model {
        self.state
            .services
            .projects
            .create_project(
                &admin(),
                NewProject {
                    code: Some(code.to_string()),
                    name: format!("Project {code}"),
                    division_id: Some(division_id),
                },
            )
            .await
            .expect("seed project")
    }

    pub async fn balance(&self, item_id: Uuid, location_id: Uuid) -> i64 {
        stock_ledger::balance(self.db(), item_id, location_id)
            .await
            .expect("read balance")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        caller: &Caller,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = token_for(caller);
        self.request(method, uri, body, Some(&token)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn admin() -> Caller {
    Caller::new(Uuid::new_v4(), Role::Admin, None)
}

pub fn manager(division_id: Uuid) -> Caller {
    Caller::new(Uuid::new_v4(), Role::Manager, Some(division_id))
}

pub fn staff(division_id: Uuid) -> Caller {
    Caller::new(Uuid::new_v4(), Role::Staff, Some(division_id))
}

pub fn claims_for(caller: &Caller, active: bool) -> Claims {
    let now = Utc::now();
    Claims {
        sub: caller.id.to_string(),
        role: caller.role.to_string(),
        division_id: caller.division_id.map(|d| d.to_string()),
        email: Some("tester@example.com".to_string()),
        active,
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
        iss: "stockyard-auth".to_string(),
        aud: "stockyard-api".to_string(),
    }
}

pub fn sign(claims: &Claims) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode access token")
}

pub fn token_for(caller: &Caller) -> String {
    sign(&claims_for(caller, true))
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
