//! Transaction engine.
//!
//! A request is validated, its implicit project side resolved, scoped against
//! the caller's division, written as an immutable audit row and turned into
//! one or two stock deltas. The audit insert and all deltas share one
//! database transaction.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::{with_transaction, DbPool};
use crate::entities::{transaction, TxnType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{directory, scoping, stock_ledger};

/// Stock movement request, as submitted online or replayed from the outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    /// Client idempotency key for offline submissions
    #[serde(default)]
    pub offline_op_id: Option<String>,
    #[serde(rename = "type")]
    pub txn_type: TxnType,
    pub item_id: Uuid,
    #[serde(default, deserialize_with = "integer_or_zero")]
    pub qty: i64,
    #[serde(default)]
    pub src_location_id: Option<Uuid>,
    #[serde(default)]
    pub dst_location_id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub note: Option<String>,
    /// Only meaningful for RECEIVE
    #[serde(default)]
    pub is_free: bool,
    /// Only meaningful for RECEIVE
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub unit_price: Option<Decimal>,
}

impl NewTransaction {
    pub fn new(txn_type: TxnType, item_id: Uuid, qty: i64) -> Self {
        Self {
            offline_op_id: None,
            txn_type,
            item_id,
            qty,
            src_location_id: None,
            dst_location_id: None,
            project_id: None,
            note: None,
            is_free: false,
            unit_price: None,
        }
    }

    pub fn from_location(mut self, id: Uuid) -> Self {
        self.src_location_id = Some(id);
        self
    }

    pub fn to_location(mut self, id: Uuid) -> Self {
        self.dst_location_id = Some(id);
        self
    }

    pub fn for_project(mut self, id: Uuid) -> Self {
        self.project_id = Some(id);
        self
    }

    pub fn with_offline_op_id(mut self, id: impl Into<String>) -> Self {
        self.offline_op_id = Some(id.into());
        self
    }

    /// Blank keys are the same as no key
    fn idempotency_key(&self) -> Option<&str> {
        self.offline_op_id
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Outcome of recording a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    /// New audit row written and stock moved
    Created(transaction::Model),
    /// The offline op id was already recorded; nothing changed
    Replayed(transaction::Model),
}

impl Recorded {
    pub fn model(&self) -> &transaction::Model {
        match self {
            Recorded::Created(m) | Recorded::Replayed(m) => m,
        }
    }

    pub fn into_model(self) -> transaction::Model {
        match self {
            Recorded::Created(m) | Recorded::Replayed(m) => m,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Recorded::Replayed(_))
    }
}

/// Source and destination after project resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoints {
    src: Option<Uuid>,
    dst: Option<Uuid>,
    project: Option<Uuid>,
}

/// Stock deltas for a movement of `qty` between the resolved endpoints
pub fn plan_deltas(src: Option<Uuid>, dst: Option<Uuid>, qty: i64) -> Vec<(Uuid, i64)> {
    src.map(|id| (id, -qty))
        .into_iter()
        .chain(dst.map(|id| (id, qty)))
        .collect()
}

/// Anything that is not a JSON integer becomes 0 and fails `validate_qty`.
fn integer_or_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_i64().unwrap_or(0))
}

fn validate_qty(qty: i64) -> Result<i32, ServiceError> {
    i32::try_from(qty)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| ServiceError::ValidationError("qty must be positive integer".to_string()))
}

fn required(value: Option<Uuid>, field: &str) -> Result<Uuid, ServiceError> {
    value.ok_or_else(|| {
        ServiceError::ValidationError(format!("{field} required for this transaction type"))
    })
}

/// Pricing is a RECEIVE-only concern; a free receipt carries no price.
fn normalize_pricing(req: &NewTransaction) -> Result<(bool, Option<Decimal>), ServiceError> {
    if req.txn_type != TxnType::Receive {
        return Ok((false, None));
    }
    if req.unit_price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
        return Err(ServiceError::ValidationError(
            "unitPrice must be non-negative".to_string(),
        ));
    }
    if req.is_free {
        Ok((true, None))
    } else {
        Ok((false, req.unit_price))
    }
}

async fn resolve_endpoints<C>(conn: &C, req: &NewTransaction) -> Result<Endpoints, ServiceError>
where
    C: ConnectionTrait,
{
    let src = if req.txn_type.needs_src() {
        Some(required(req.src_location_id, "srcLocationId")?)
    } else {
        None
    };
    let dst = if req.txn_type.needs_dst() {
        Some(required(req.dst_location_id, "dstLocationId")?)
    } else {
        None
    };

    let endpoints = match req.txn_type {
        TxnType::ProjectIssue => {
            let project =
                directory::find_project(conn, required(req.project_id, "projectId")?).await?;
            Endpoints {
                src,
                dst: Some(project.location_id),
                project: Some(project.id),
            }
        }
        TxnType::ProjectReturn => {
            let project =
                directory::find_project(conn, required(req.project_id, "projectId")?).await?;
            Endpoints {
                src: Some(project.location_id),
                dst,
                project: Some(project.id),
            }
        }
        _ => Endpoints {
            src,
            dst,
            project: None,
        },
    };

    if matches!(req.txn_type, TxnType::Transfer | TxnType::DivisionTransfer)
        && endpoints.src == endpoints.dst
    {
        return Err(ServiceError::ValidationError(
            "source and destination must differ".to_string(),
        ));
    }

    Ok(endpoints)
}

pub async fn find_by_offline_op_id<C>(
    conn: &C,
    offline_op_id: &str,
) -> Result<Option<transaction::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(transaction::Entity::find()
        .filter(transaction::Column::OfflineOpId.eq(offline_op_id))
        .one(conn)
        .await?)
}

/// Records `req` on `conn`, which should be an open database transaction.
///
/// An already-recorded offline op id short-circuits before validation and
/// scoping.
pub async fn record_in<C>(
    conn: &C,
    caller: &Caller,
    req: NewTransaction,
) -> Result<Recorded, ServiceError>
where
    C: ConnectionTrait,
{
    let offline_op_id = req.idempotency_key().map(str::to_string);
    if let Some(key) = offline_op_id.as_deref() {
        if let Some(existing) = find_by_offline_op_id(conn, key).await? {
            return Ok(Recorded::Replayed(existing));
        }
    }

    let qty = validate_qty(req.qty)?;
    let (is_free, unit_price) = normalize_pricing(&req)?;

    if !directory::item_exists(conn, req.item_id).await? {
        return Err(ServiceError::NotFound("item not found".to_string()));
    }

    let endpoints = resolve_endpoints(conn, &req).await?;
    let src = match endpoints.src {
        Some(id) => Some(directory::find_location(conn, id).await?),
        None => None,
    };
    let dst = match endpoints.dst {
        Some(id) => Some(directory::find_location(conn, id).await?),
        None => None,
    };

    scoping::authorize(caller, req.txn_type, src.as_ref(), dst.as_ref())?;

    let row = transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        offline_op_id: Set(offline_op_id),
        r#type: Set(req.txn_type),
        item_id: Set(req.item_id),
        qty: Set(qty),
        src_location_id: Set(endpoints.src),
        dst_location_id: Set(endpoints.dst),
        project_id: Set(endpoints.project),
        note: Set(req.note.filter(|n| !n.trim().is_empty())),
        is_free: Set(is_free),
        unit_price: Set(unit_price),
        created_by_id: Set(caller.id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    for (location_id, delta) in plan_deltas(endpoints.src, endpoints.dst, i64::from(qty)) {
        stock_ledger::apply_delta(conn, req.item_id, location_id, delta).await?;
    }

    Ok(Recorded::Created(row))
}

pub fn recorded_event(model: &transaction::Model) -> Event {
    Event::TransactionRecorded {
        transaction_id: model.id,
        txn_type: model.r#type,
        item_id: model.item_id,
        qty: model.qty,
        created_by_id: model.created_by_id,
    }
}

/// Service entry point for single, all-or-nothing submissions
#[derive(Clone)]
pub struct TransactionService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl TransactionService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, req), fields(user_id = %caller.id, txn_type = %req.txn_type))]
    pub async fn record(
        &self,
        caller: &Caller,
        req: NewTransaction,
    ) -> Result<Recorded, ServiceError> {
        let key = req.idempotency_key().map(str::to_string);
        let scoped_caller = caller.clone();

        let result = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move { record_in(txn, &scoped_caller, req).await })
        })
        .await;

        let result = match (result, key) {
            // Lost an insert race on the same offline op id; the winner's row stands.
            (Err(e), Some(key)) if e.is_unique_violation() => {
                match find_by_offline_op_id(self.db_pool.as_ref(), &key).await? {
                    Some(existing) => Ok(Recorded::Replayed(existing)),
                    None => Err(e),
                }
            }
            (result, _) => result,
        };

        match &result {
            Ok(Recorded::Created(model)) => {
                counter!("stockyard.transactions.recorded", 1);
                info!(transaction_id = %model.id, qty = model.qty, "transaction recorded");
                self.event_sender.publish(recorded_event(model));
            }
            Ok(Recorded::Replayed(model)) => {
                counter!("stockyard.transactions.replayed", 1);
                info!(transaction_id = %model.id, "offline transaction already recorded");
            }
            Err(e) => {
                counter!("stockyard.transactions.rejected", 1);
                warn!(kind = e.kind(), reason = %e, "transaction rejected");
            }
        }

        result
    }

    /// Latest transactions, newest first
    #[instrument(skip(self))]
    pub async fn list_recent(&self, limit: u64) -> Result<Vec<transaction::Model>, ServiceError> {
        Ok(transaction::Entity::find()
            .order_by_desc(transaction::Column::CreatedAt)
            .limit(limit)
            .all(self.db_pool.as_ref())
            .await?)
    }
}
