use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Operation kinds accepted from the offline outbox
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOpKind {
    #[sea_orm(string_value = "TXN_CREATE")]
    TxnCreate,
    #[sea_orm(string_value = "ITEM_UPSERT")]
    ItemUpsert,
    #[sea_orm(string_value = "ITEM_DELETE")]
    ItemDelete,
    #[sea_orm(string_value = "LOC_UPSERT")]
    LocUpsert,
    #[sea_orm(string_value = "LOC_DELETE")]
    LocDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    #[sea_orm(string_value = "applied")]
    Applied,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Dedup marker: one row per client operation id ever processed
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_ops")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: Uuid,
    pub kind: SyncOpKind,
    pub outcome: SyncOutcome,
    /// Error kind of a rejected op
    pub error_kind: Option<String>,
    pub reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
