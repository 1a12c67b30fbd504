use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{item, location, stock};
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub barcode: Option<String>,
    pub reorder_level: i32,
}

impl From<item::Model> for ItemSummary {
    fn from(m: item::Model) -> Self {
        Self {
            id: m.id,
            sku: m.sku,
            name: m.name,
            barcode: m.barcode,
            reorder_level: m.reorder_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationSummary {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

impl From<&location::Model> for LocationSummary {
    fn from(m: &location::Model) -> Self {
        Self {
            id: m.id,
            code: m.code.clone(),
            name: m.name.clone(),
        }
    }
}

/// A balance row with enough context to display it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub qty: i64,
    pub updated_at: DateTime<Utc>,
    pub item: Option<ItemSummary>,
    pub location: Option<LocationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LowStockRow {
    pub item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub reorder_level: i32,
    pub total_qty: i64,
}

/// Live items whose balance summed over all locations is under their
/// reorder level, lowest first
pub fn low_stock_rows(items: &[item::Model], stocks: &[stock::Model]) -> Vec<LowStockRow> {
    let mut totals: HashMap<Uuid, i64> = HashMap::new();
    for row in stocks {
        *totals.entry(row.item_id).or_default() += row.qty;
    }

    let mut low: Vec<LowStockRow> = items
        .iter()
        .filter(|i| !i.is_deleted)
        .map(|i| LowStockRow {
            item_id: i.id,
            sku: i.sku.clone(),
            name: i.name.clone(),
            reorder_level: i.reorder_level,
            total_qty: totals.get(&i.id).copied().unwrap_or(0),
        })
        .filter(|r| r.total_qty < i64::from(r.reorder_level))
        .collect();
    low.sort_by_key(|r| r.total_qty);
    low
}

/// Balance rows, optionally for one location, most recently updated first
pub async fn stock_lines<C>(
    conn: &C,
    location_id: Option<Uuid>,
) -> Result<Vec<StockLine>, ServiceError>
where
    C: ConnectionTrait,
{
    let mut query = stock::Entity::find();
    if let Some(location_id) = location_id {
        query = query.filter(stock::Column::LocationId.eq(location_id));
    }
    let rows = query
        .find_also_related(item::Entity)
        .order_by_desc(stock::Column::UpdatedAt)
        .all(conn)
        .await?;

    let location_ids: Vec<Uuid> = rows.iter().map(|(s, _)| s.location_id).collect();
    let locations: HashMap<Uuid, LocationSummary> = if location_ids.is_empty() {
        HashMap::new()
    } else {
        location::Entity::find()
            .filter(location::Column::Id.is_in(location_ids))
            .all(conn)
            .await?
            .iter()
            .map(|l| (l.id, LocationSummary::from(l)))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|(s, item)| StockLine {
            id: s.id,
            item_id: s.item_id,
            location_id: s.location_id,
            qty: s.qty,
            updated_at: s.updated_at,
            item: item.map(ItemSummary::from),
            location: locations.get(&s.location_id).cloned(),
        })
        .collect())
}

#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<LowStockRow>, ServiceError> {
        let db = self.db_pool.as_ref();
        let items = item::Entity::find()
            .filter(item::Column::IsDeleted.eq(false))
            .all(db)
            .await?;
        let stocks = stock::Entity::find().all(db).await?;
        Ok(low_stock_rows(&items, &stocks))
    }

    #[instrument(skip(self))]
    pub async fn stock_levels(&self) -> Result<Vec<StockLine>, ServiceError> {
        stock_lines(self.db_pool.as_ref(), None).await
    }
}
