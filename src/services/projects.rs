use std::sync::Arc;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Caller, Role};
use crate::db::{with_transaction, DbPool};
use crate::entities::{division, location, project, LocationKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::reports::{self, StockLine};
use crate::services::{directory, scoping};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    #[serde(default)]
    #[validate(length(min = 2, max = 30))]
    pub code: Option<String>,
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    /// Required for admins; managers always use their own division
    #[serde(default)]
    pub division_id: Option<Uuid>,
}

/// `PRJ` followed by five random upper-case alphanumerics
pub fn generate_code() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect();
    format!("PRJ{}", suffix.to_uppercase())
}

pub fn project_location_code(code: &str) -> String {
    format!("PROJECT-{code}")
}

fn target_division(caller: &Caller, requested: Option<Uuid>) -> Result<Uuid, ServiceError> {
    match caller.role {
        Role::Staff => Err(ServiceError::Forbidden(
            "forbidden: role not permitted to create projects".to_string(),
        )),
        Role::Admin => requested.ok_or_else(|| {
            ServiceError::ValidationError(
                "divisionId is required for admin-created projects".to_string(),
            )
        }),
        Role::Manager => caller
            .division_id
            .ok_or_else(|| ServiceError::Forbidden(scoping::NO_DIVISION.to_string())),
    }
}

#[derive(Clone)]
pub struct ProjectService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl ProjectService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates the project together with its PROJECT-kind location
    #[instrument(skip(self, req), fields(user_id = %caller.id))]
    pub async fn create_project(
        &self,
        caller: &Caller,
        req: NewProject,
    ) -> Result<project::Model, ServiceError> {
        let division_id = target_division(caller, req.division_id)?;
        req.validate()?;

        let db = self.db_pool.as_ref();
        if division::Entity::find_by_id(division_id)
            .one(db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound("division not found".to_string()));
        }

        let code = req
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(generate_code);
        let name = req.name.trim().to_string();
        let location_code = project_location_code(&code);

        let taken = project::Entity::find()
            .filter(project::Column::Code.eq(code.as_str()))
            .count(db)
            .await?
            + location::Entity::find()
                .filter(location::Column::Code.eq(location_code.as_str()))
                .count(db)
                .await?;
        if taken > 0 {
            return Err(ServiceError::Conflict(format!(
                "project code {code} already exists"
            )));
        }

        let created_by = caller.id;
        let project_code = code.clone();
        let created = with_transaction(db, move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let loc = location::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    code: Set(location_code),
                    name: Set(format!("Project: {name}")),
                    kind: Set(LocationKind::Project),
                    division_id: Set(Some(division_id)),
                    is_deleted: Set(false),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                let model = project::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    code: Set(project_code),
                    name: Set(name),
                    division_id: Set(division_id),
                    location_id: Set(loc.id),
                    created_by_id: Set(created_by),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;
                Ok(model)
            })
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict(format!("project code {code} already exists"))
            } else {
                e
            }
        })?;

        info!(project_id = %created.id, code = %created.code, %division_id, "project created");
        self.event_sender.publish(Event::ProjectCreated {
            project_id: created.id,
            code: created.code.clone(),
            division_id,
        });
        Ok(created)
    }

    #[instrument(skip(self), fields(user_id = %caller.id))]
    pub async fn list_projects(&self, caller: &Caller) -> Result<Vec<project::Model>, ServiceError> {
        let mut scope = Condition::all();
        if let (Role::Staff, Some(division_id)) = (caller.role, caller.division_id) {
            scope = scope.add(project::Column::DivisionId.eq(division_id));
        }

        Ok(project::Entity::find()
            .filter(scope)
            .order_by_desc(project::Column::UpdatedAt)
            .all(self.db_pool.as_ref())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn project_stock(&self, project_id: Uuid) -> Result<Vec<StockLine>, ServiceError> {
        let db = self.db_pool.as_ref();
        let project = directory::find_project(db, project_id).await?;
        reports::stock_lines(db, Some(project.location_id)).await
    }
}
