//! Running balance per (item, location).
//!
//! Balances change only through [`apply_delta`], which is a single
//! `INSERT .. ON CONFLICT DO UPDATE SET qty = qty + delta` statement so that
//! concurrent writers serialize on the row lock instead of racing a
//! read-modify-write.

use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;
use uuid::Uuid;

use crate::entities::stock;
use crate::errors::ServiceError;

/// Adds `delta` to the balance, creating the row on first movement.
/// No floor is enforced. Returns the new balance.
pub async fn apply_delta<C>(
    conn: &C,
    item_id: Uuid,
    location_id: Uuid,
    delta: i64,
) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let row = stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item_id),
        location_id: Set(location_id),
        qty: Set(delta),
        updated_at: Set(now),
    };

    stock::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([stock::Column::ItemId, stock::Column::LocationId])
                .value(
                    stock::Column::Qty,
                    Expr::col((stock::Entity, stock::Column::Qty)).add(delta),
                )
                .value(stock::Column::UpdatedAt, Expr::value(now))
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    let qty = find_row(conn, item_id, location_id)
        .await?
        .map(|row| row.qty)
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "stock row for item {item_id} at {location_id} missing after upsert"
            ))
        })?;

    counter!("stockyard.stock.delta_applied", 1);
    debug!(%item_id, %location_id, delta, qty, "stock delta applied");
    Ok(qty)
}

/// Current balance; a pair that never moved reads as zero.
pub async fn balance<C>(conn: &C, item_id: Uuid, location_id: Uuid) -> Result<i64, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(find_row(conn, item_id, location_id)
        .await?
        .map_or(0, |row| row.qty))
}

async fn find_row<C>(
    conn: &C,
    item_id: Uuid,
    location_id: Uuid,
) -> Result<Option<stock::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(stock::Entity::find()
        .filter(stock::Column::ItemId.eq(item_id))
        .filter(stock::Column::LocationId.eq(location_id))
        .one(conn)
        .await?)
}
