pub mod health;
pub mod inventory;
pub mod projects;
pub mod reports;
pub mod sync;
pub mod transactions;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    projects::ProjectService, reports::ReportService, sync::SyncService,
    transactions::TransactionService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub transactions: Arc<TransactionService>,
    pub sync: Arc<SyncService>,
    pub projects: Arc<ProjectService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        Self {
            transactions: Arc::new(TransactionService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            sync: Arc::new(SyncService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.sync_pull_txn_limit,
            )),
            projects: Arc::new(ProjectService::new(db_pool.clone(), event_sender)),
            reports: Arc::new(ReportService::new(db_pool)),
        }
    }
}

/// JSON body extractor whose rejections use the service error envelope
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
