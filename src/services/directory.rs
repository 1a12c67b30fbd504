//! Read-only lookups the engine consults: locations, projects and item existence.
//!
//! Every function is generic over [`ConnectionTrait`] so it can run either on
//! the pool or inside the caller's open database transaction.

use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::entities::{item, location, project, LocationKind};
use crate::errors::ServiceError;

/// The parts of a location that scoping rules look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRef {
    pub id: Uuid,
    pub division_id: Option<Uuid>,
    pub kind: LocationKind,
}

impl From<&location::Model> for LocationRef {
    fn from(model: &location::Model) -> Self {
        Self {
            id: model.id,
            division_id: model.division_id,
            kind: model.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: Uuid,
    pub division_id: Uuid,
    pub location_id: Uuid,
}

impl From<&project::Model> for ProjectRef {
    fn from(model: &project::Model) -> Self {
        Self {
            id: model.id,
            division_id: model.division_id,
            location_id: model.location_id,
        }
    }
}

/// Soft-deleted locations are treated as missing.
pub async fn find_location<C>(conn: &C, id: Uuid) -> Result<LocationRef, ServiceError>
where
    C: ConnectionTrait,
{
    location::Entity::find_by_id(id)
        .one(conn)
        .await?
        .filter(|loc| !loc.is_deleted)
        .map(|loc| LocationRef::from(&loc))
        .ok_or_else(|| ServiceError::NotFound("location not found".to_string()))
}

pub async fn find_project<C>(conn: &C, id: Uuid) -> Result<ProjectRef, ServiceError>
where
    C: ConnectionTrait,
{
    project::Entity::find_by_id(id)
        .one(conn)
        .await?
        .map(|p| ProjectRef::from(&p))
        .ok_or_else(|| ServiceError::NotFound("project not found".to_string()))
}

pub async fn item_exists<C>(conn: &C, id: Uuid) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(item::Entity::find_by_id(id)
        .one(conn)
        .await?
        .is_some_and(|item| !item.is_deleted))
}
