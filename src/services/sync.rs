//! Offline outbox gateway.
//!
//! Every pushed op carries a client-chosen id. A `sync_ops` marker row is
//! written in the same database transaction as the op's effect, so an id is
//! applied at most once no matter how often the batch is retried. Ops run in
//! the order received and each commits on its own; one bad op never blocks
//! the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Caller;
use crate::db::{with_transaction, DbPool};
use crate::entities::{
    division, item, location, stock, sync_op, transaction, LocationKind, SyncOpKind,
    SyncOutcome,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::transactions::{self, NewTransaction, Recorded};

pub const PROJECT_LOCATION_MANAGED: &str = "project locations are managed through projects";

/// One queued client operation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncOp {
    pub id: String,
    pub kind: SyncOpKind,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PushRequest {
    pub ops: Vec<SyncOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Applied,
    Skipped,
    Rejected,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Applied => "applied",
            SyncStatus::Skipped => "skipped",
            SyncStatus::Rejected => "rejected",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Per-op result. `applied`, `skipped` and `rejected` are final; `failed`
/// stays in the client's outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OpResult {
    pub id: String,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PushResponse {
    pub ok: bool,
    pub results: Vec<OpResult>,
}

/// What happened to a single op
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    Skipped,
    Rejected { kind: String, reason: String },
    Failed { reason: String },
}

impl OpOutcome {
    fn status(&self) -> SyncStatus {
        match self {
            OpOutcome::Applied => SyncStatus::Applied,
            OpOutcome::Skipped => SyncStatus::Skipped,
            OpOutcome::Rejected { .. } => SyncStatus::Rejected,
            OpOutcome::Failed { .. } => SyncStatus::Failed,
        }
    }

    fn rejected(err: &ServiceError) -> Self {
        OpOutcome::Rejected {
            kind: err.kind().to_string(),
            reason: err.response_message(),
        }
    }

    fn failed(err: &ServiceError) -> Self {
        OpOutcome::Failed {
            reason: err.response_message(),
        }
    }

    fn into_result(self, id: String) -> OpResult {
        let status = self.status();
        let (kind, reason) = match self {
            OpOutcome::Rejected { kind, reason } => (Some(kind), Some(reason)),
            OpOutcome::Failed { reason } => (None, Some(reason)),
            OpOutcome::Applied | OpOutcome::Skipped => (None, None),
        };
        OpResult {
            id,
            status,
            kind,
            reason,
        }
    }
}

/// Where an upsert lands, given the row matching the client id and the row
/// matching the natural key (sku or code)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertTarget {
    Create,
    /// `rekey` is false when the natural key already belongs to this row or
    /// the row was found through it
    Update { id: Uuid, rekey: bool },
}

pub fn resolve_upsert_target(by_id: Option<Uuid>, by_key: Option<Uuid>) -> UpsertTarget {
    match (by_id, by_key) {
        (Some(id), None) => UpsertTarget::Update { id, rekey: true },
        (Some(id), Some(owner)) if id == owner => UpsertTarget::Update { id, rekey: false },
        (_, Some(owner)) => UpsertTarget::Update {
            id: owner,
            rekey: false,
        },
        (None, None) => UpsertTarget::Create,
    }
}

/// 9999-12-31T23:59:59.999Z, the latest watermark the stores order correctly
const MAX_WATERMARK_MS: f64 = 253_402_300_799_999.0;

/// Parses the `since` query value (epoch milliseconds). Anything missing,
/// non-positive or unparsable means "from the beginning"; values past the
/// representable range are clamped so they select nothing.
pub fn since_watermark(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|ms| !ms.is_nan() && *ms > 0.0)
        .and_then(|ms| Utc.timestamp_millis_opt(ms.min(MAX_WATERMARK_MS) as i64).single())
        .unwrap_or_default()
}

/// Start of the current millisecond. Rows stamped at or after it wait for
/// the next pull, so `[since, cutoff)` windows never overlap.
fn pull_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ItemUpsert {
    #[serde(default)]
    id: Option<String>,
    #[validate(length(min = 1))]
    sku: String,
    #[validate(length(min = 1))]
    name: String,
    #[serde(default)]
    barcode: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    reorder_level: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct LocUpsert {
    #[serde(default)]
    id: Option<String>,
    #[validate(length(min = 1))]
    code: String,
    #[validate(length(min = 1))]
    name: String,
    #[serde(default)]
    division_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteById {
    #[serde(default)]
    id: Option<String>,
}

/// Client ids that are not UUIDs are treated as absent
fn client_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
}

fn parse_payload<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, ServiceError> {
    serde_json::from_value(payload.clone())
        .map_err(|e| ServiceError::ValidationError(format!("invalid payload: {e}")))
}

fn validated<T: Validate>(payload: T) -> Result<T, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("invalid payload: {e}")))?;
    Ok(payload)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn upsert_item(txn: &DatabaseTransaction, payload: ItemUpsert) -> Result<(), ServiceError> {
    let now = Utc::now();
    let desired_id = client_id(payload.id.as_deref());
    let by_id = match desired_id {
        Some(id) => item::Entity::find_by_id(id).one(txn).await?,
        None => None,
    };
    let by_key = item::Entity::find()
        .filter(item::Column::Sku.eq(payload.sku.as_str()))
        .one(txn)
        .await?;

    let barcode = blank_to_none(payload.barcode);
    let reorder_level = payload.reorder_level.unwrap_or(0);

    match resolve_upsert_target(by_id.map(|m| m.id), by_key.map(|m| m.id)) {
        UpsertTarget::Create => {
            item::ActiveModel {
                id: Set(desired_id.unwrap_or_else(Uuid::new_v4)),
                sku: Set(payload.sku),
                name: Set(payload.name),
                barcode: Set(barcode),
                reorder_level: Set(reorder_level),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(txn)
            .await?;
        }
        UpsertTarget::Update { id, rekey } => {
            let existing = item::Entity::find_by_id(id)
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::InternalError(format!("item {id} vanished")))?;
            let mut active = existing.into_active_model();
            if rekey {
                active.sku = Set(payload.sku);
            }
            active.name = Set(payload.name);
            active.barcode = Set(barcode);
            active.reorder_level = Set(reorder_level);
            active.is_deleted = Set(false);
            active.updated_at = Set(now);
            active.update(txn).await?;
        }
    }
    Ok(())
}

async fn upsert_location(
    txn: &DatabaseTransaction,
    caller: &Caller,
    payload: LocUpsert,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let desired_id = client_id(payload.id.as_deref());
    let by_id = match desired_id {
        Some(id) => location::Entity::find_by_id(id).one(txn).await?,
        None => None,
    };
    let by_key = location::Entity::find()
        .filter(location::Column::Code.eq(payload.code.as_str()))
        .one(txn)
        .await?;

    if [by_id.as_ref(), by_key.as_ref()]
        .into_iter()
        .flatten()
        .any(|loc| loc.kind == LocationKind::Project)
    {
        return Err(ServiceError::ValidationError(
            PROJECT_LOCATION_MANAGED.to_string(),
        ));
    }

    match resolve_upsert_target(by_id.map(|m| m.id), by_key.map(|m| m.id)) {
        UpsertTarget::Create => {
            let division_id = payload.division_id.or(caller.division_id);
            if let Some(division_id) = division_id {
                if division::Entity::find_by_id(division_id)
                    .one(txn)
                    .await?
                    .is_none()
                {
                    return Err(ServiceError::NotFound("division not found".to_string()));
                }
            }
            location::ActiveModel {
                id: Set(desired_id.unwrap_or_else(Uuid::new_v4)),
                code: Set(payload.code),
                name: Set(payload.name),
                kind: Set(LocationKind::Warehouse),
                division_id: Set(division_id),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(txn)
            .await?;
        }
        UpsertTarget::Update { id, rekey } => {
            let existing = location::Entity::find_by_id(id)
                .one(txn)
                .await?
                .ok_or_else(|| ServiceError::InternalError(format!("location {id} vanished")))?;
            let mut active = existing.into_active_model();
            if rekey {
                active.code = Set(payload.code);
            }
            active.name = Set(payload.name);
            active.is_deleted = Set(false);
            active.updated_at = Set(now);
            active.update(txn).await?;
        }
    }
    Ok(())
}

async fn soft_delete_item(txn: &DatabaseTransaction, payload: DeleteById) -> Result<(), ServiceError> {
    let Some(id) = client_id(payload.id.as_deref()) else {
        return Ok(());
    };
    if let Some(existing) = item::Entity::find_by_id(id).one(txn).await? {
        let mut active = existing.into_active_model();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
    }
    Ok(())
}

async fn soft_delete_location(
    txn: &DatabaseTransaction,
    payload: DeleteById,
) -> Result<(), ServiceError> {
    let Some(id) = client_id(payload.id.as_deref()) else {
        return Ok(());
    };
    if let Some(existing) = location::Entity::find_by_id(id).one(txn).await? {
        if existing.kind == LocationKind::Project {
            return Err(ServiceError::ValidationError(
                PROJECT_LOCATION_MANAGED.to_string(),
            ));
        }
        let mut active = existing.into_active_model();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
    }
    Ok(())
}

/// Applies the op's effect inside `txn`. Returns the engine's result for
/// TXN_CREATE so the caller can announce it after commit.
async fn apply_effect(
    txn: &DatabaseTransaction,
    caller: &Caller,
    op: &SyncOp,
) -> Result<Option<Recorded>, ServiceError> {
    match op.kind {
        SyncOpKind::TxnCreate => {
            let mut req: NewTransaction = parse_payload(&op.payload)?;
            if req.offline_op_id.as_deref().map_or(true, |k| k.trim().is_empty()) {
                req.offline_op_id = Some(op.id.clone());
            }
            transactions::record_in(txn, caller, req).await.map(Some)
        }
        SyncOpKind::ItemUpsert => {
            upsert_item(txn, validated(parse_payload(&op.payload)?)?).await?;
            Ok(None)
        }
        SyncOpKind::ItemDelete => {
            soft_delete_item(txn, parse_payload(&op.payload)?).await?;
            Ok(None)
        }
        SyncOpKind::LocUpsert => {
            upsert_location(txn, caller, validated(parse_payload(&op.payload)?)?).await?;
            Ok(None)
        }
        SyncOpKind::LocDelete => {
            soft_delete_location(txn, parse_payload(&op.payload)?).await?;
            Ok(None)
        }
    }
}

fn marker(
    op: &SyncOp,
    user_id: Uuid,
    outcome: SyncOutcome,
    err: Option<&ServiceError>,
) -> sync_op::ActiveModel {
    sync_op::ActiveModel {
        id: Set(op.id.clone()),
        user_id: Set(user_id),
        kind: Set(op.kind),
        outcome: Set(outcome),
        error_kind: Set(err.map(|e| e.kind().to_string())),
        reason: Set(err.map(ServiceError::response_message)),
        created_at: Set(Utc::now()),
    }
}

/// Classifies an op that already has a marker
fn replayed(marker: &sync_op::Model) -> OpOutcome {
    match marker.outcome {
        SyncOutcome::Applied => OpOutcome::Skipped,
        SyncOutcome::Rejected => OpOutcome::Rejected {
            kind: marker
                .error_kind
                .clone()
                .unwrap_or_else(|| "validation_error".to_string()),
            reason: marker.reason.clone().unwrap_or_default(),
        },
    }
}

/// Incremental snapshot for the client's local store
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PullResponse {
    /// Server time in epoch milliseconds; the next `since`
    pub now: i64,
    pub items: Vec<item::Model>,
    pub locations: Vec<location::Model>,
    pub stocks: Vec<stock::Model>,
    pub txns: Vec<transaction::Model>,
}

#[derive(Clone)]
pub struct SyncService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    pull_txn_limit: u64,
}

impl SyncService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, pull_txn_limit: u64) -> Self {
        Self {
            db_pool,
            event_sender,
            pull_txn_limit,
        }
    }

    /// Applies a batch in order and reports one result per op
    #[instrument(skip(self, ops), fields(user_id = %caller.id, ops = ops.len()))]
    pub async fn push(&self, caller: &Caller, ops: Vec<SyncOp>) -> PushResponse {
        let mut results = Vec::with_capacity(ops.len());
        let mut tally = [0usize; 4];

        for op in ops {
            let outcome = self.process_op(caller, &op).await;
            let status = outcome.status();
            tally[status as usize] += 1;
            counter!("stockyard.sync.ops", 1, "status" => status.as_str());

            match &outcome {
                OpOutcome::Rejected { kind, reason } => {
                    warn!(op_id = %op.id, op_kind = %op.kind, kind = %kind, reason = %reason, "sync op rejected");
                }
                OpOutcome::Failed { reason } => {
                    warn!(op_id = %op.id, op_kind = %op.kind, reason = %reason, "sync op failed; left for retry");
                }
                _ => {
                    info!(op_id = %op.id, op_kind = %op.kind, status = status.as_str(), "sync op processed");
                }
            }

            results.push(outcome.into_result(op.id));
        }

        self.event_sender.publish(Event::SyncBatchProcessed {
            user_id: caller.id,
            applied: tally[SyncStatus::Applied as usize],
            skipped: tally[SyncStatus::Skipped as usize],
            rejected: tally[SyncStatus::Rejected as usize],
            failed: tally[SyncStatus::Failed as usize],
        });

        PushResponse { ok: true, results }
    }

    async fn process_op(&self, caller: &Caller, op: &SyncOp) -> OpOutcome {
        if op.id.trim().is_empty() {
            return OpOutcome::Rejected {
                kind: "validation_error".to_string(),
                reason: "op id is required".to_string(),
            };
        }

        match self.find_marker(&op.id).await {
            Ok(Some(existing)) => return replayed(&existing),
            Ok(None) => {}
            Err(e) => return OpOutcome::failed(&e),
        }

        let scoped_caller = caller.clone();
        let scoped_op = op.clone();
        let result = with_transaction(&self.db_pool, move |txn| {
            Box::pin(async move {
                marker(&scoped_op, scoped_caller.id, SyncOutcome::Applied, None)
                    .insert(txn)
                    .await?;
                apply_effect(txn, &scoped_caller, &scoped_op).await
            })
        })
        .await;

        match result {
            Ok(recorded) => {
                if let Some(Recorded::Created(model)) = recorded {
                    self.event_sender.publish(transactions::recorded_event(&model));
                }
                OpOutcome::Applied
            }
            // Concurrent push of the same id, or a racing offline op id
            Err(e) if e.is_unique_violation() => match self.find_marker(&op.id).await {
                Ok(Some(existing)) => replayed(&existing),
                _ => OpOutcome::failed(&e),
            },
            Err(e) if e.is_transient() => OpOutcome::failed(&e),
            Err(e) => self.record_rejection(caller, op, &e).await,
        }
    }

    /// Persists a terminal rejection so replays report it instead of retrying
    async fn record_rejection(&self, caller: &Caller, op: &SyncOp, err: &ServiceError) -> OpOutcome {
        let inserted = marker(op, caller.id, SyncOutcome::Rejected, Some(err))
            .insert(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::from);

        match inserted {
            Ok(_) => OpOutcome::rejected(err),
            Err(e) if e.is_unique_violation() => match self.find_marker(&op.id).await {
                Ok(Some(existing)) => replayed(&existing),
                _ => OpOutcome::failed(&e),
            },
            Err(e) => OpOutcome::failed(&e),
        }
    }

    async fn find_marker(&self, id: &str) -> Result<Option<sync_op::Model>, ServiceError> {
        find_marker(self.db_pool.as_ref(), id).await
    }

    /// Everything stamped in `[since, now)`, plus `now` for the next pull
    #[instrument(skip(self))]
    pub async fn pull(&self, since: DateTime<Utc>) -> Result<PullResponse, ServiceError> {
        let cutoff = pull_cutoff(Utc::now());
        let db = self.db_pool.as_ref();

        let items = item::Entity::find()
            .filter(item::Column::UpdatedAt.gte(since))
            .filter(item::Column::UpdatedAt.lt(cutoff))
            .order_by_asc(item::Column::UpdatedAt)
            .all(db)
            .await?;
        let locations = location::Entity::find()
            .filter(location::Column::UpdatedAt.gte(since))
            .filter(location::Column::UpdatedAt.lt(cutoff))
            .order_by_asc(location::Column::UpdatedAt)
            .all(db)
            .await?;
        let stocks = stock::Entity::find()
            .filter(stock::Column::UpdatedAt.gte(since))
            .filter(stock::Column::UpdatedAt.lt(cutoff))
            .order_by_asc(stock::Column::UpdatedAt)
            .all(db)
            .await?;
        let txns = transaction::Entity::find()
            .filter(transaction::Column::CreatedAt.gte(since))
            .filter(transaction::Column::CreatedAt.lt(cutoff))
            .order_by_desc(transaction::Column::CreatedAt)
            .limit(self.pull_txn_limit)
            .all(db)
            .await?;

        Ok(PullResponse {
            now: cutoff.timestamp_millis(),
            items,
            locations,
            stocks,
            txns,
        })
    }
}

pub async fn find_marker<C>(conn: &C, id: &str) -> Result<Option<sync_op::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(sync_op::Entity::find_by_id(id.to_string()).one(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Datelike;
    use rstest::rstest;

    const ROW_A: Uuid = Uuid::from_u128(10);
    const ROW_B: Uuid = Uuid::from_u128(11);

    #[rstest]
    #[case(None, None, UpsertTarget::Create)]
    #[case(Some(ROW_A), None, UpsertTarget::Update { id: ROW_A, rekey: true })]
    #[case(Some(ROW_A), Some(ROW_A), UpsertTarget::Update { id: ROW_A, rekey: false })]
    #[case(None, Some(ROW_B), UpsertTarget::Update { id: ROW_B, rekey: false })]
    #[case(Some(ROW_A), Some(ROW_B), UpsertTarget::Update { id: ROW_B, rekey: false })]
    fn upsert_resolution(
        #[case] by_id: Option<Uuid>,
        #[case] by_key: Option<Uuid>,
        #[case] expected: UpsertTarget,
    ) {
        assert_eq!(resolve_upsert_target(by_id, by_key), expected);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("0"))]
    #[case(Some("-5"))]
    #[case(Some("yesterday"))]
    #[case(Some("NaN"))]
    fn unusable_since_means_epoch(#[case] raw: Option<&str>) {
        assert_eq!(since_watermark(raw).timestamp_millis(), 0);
    }

    #[test]
    fn since_is_epoch_millis() {
        let since = since_watermark(Some("1700000000123"));
        assert_eq!(since.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(since.year(), 2023);
    }

    #[rstest]
    #[case("1e20")]
    #[case("99999999999999999999999")]
    #[case("inf")]
    fn far_future_since_clamps_instead_of_resetting(#[case] raw: &str) {
        let since = since_watermark(Some(raw));
        assert_eq!(since.year(), 9999);
        assert!(since > Utc::now());
    }

    #[test]
    fn cutoff_is_the_start_of_the_millisecond() {
        let now = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let cutoff = pull_cutoff(now);
        assert_eq!(cutoff.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(cutoff.timestamp_subsec_nanos(), 123_000_000);
        assert!(cutoff <= now);
    }

    #[test]
    fn non_uuid_client_ids_are_ignored() {
        assert_eq!(client_id(Some("local-42")), None);
        assert_eq!(client_id(None), None);
        assert_eq!(client_id(Some(&ROW_A.to_string())), Some(ROW_A));
    }

    #[test]
    fn malformed_payloads_are_validation_errors() {
        let err = parse_payload::<ItemUpsert>(&serde_json::json!({ "name": "no sku" }))
            .unwrap_err();
        assert_matches!(&err, ServiceError::ValidationError(m) if m.starts_with("invalid payload: "));

        let parsed: ItemUpsert =
            parse_payload(&serde_json::json!({ "sku": "", "name": "blank sku" })).unwrap();
        assert_matches!(validated(parsed), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn results_serialize_with_lowercase_status() {
        let applied = OpOutcome::Applied.into_result("op-1".into());
        assert_eq!(
            serde_json::to_value(&applied).unwrap(),
            serde_json::json!({ "id": "op-1", "status": "applied" })
        );

        let rejected = OpOutcome::rejected(&ServiceError::NotFound("item not found".into()))
            .into_result("op-2".into());
        assert_eq!(
            serde_json::to_value(&rejected).unwrap(),
            serde_json::json!({
                "id": "op-2",
                "status": "rejected",
                "kind": "not_found",
                "reason": "item not found"
            })
        );
    }
}
