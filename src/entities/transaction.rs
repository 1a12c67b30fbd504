use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kinds of stock movement
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnType {
    #[sea_orm(string_value = "RECEIVE")]
    Receive,
    #[sea_orm(string_value = "SHIP")]
    Ship,
    #[sea_orm(string_value = "TRANSFER")]
    Transfer,
    #[sea_orm(string_value = "DIVISION_TRANSFER")]
    DivisionTransfer,
    #[sea_orm(string_value = "PROJECT_ISSUE")]
    ProjectIssue,
    #[sea_orm(string_value = "PROJECT_RETURN")]
    ProjectReturn,
}

impl TxnType {
    pub fn needs_src(&self) -> bool {
        !matches!(self, TxnType::Receive | TxnType::ProjectReturn)
    }

    pub fn needs_dst(&self) -> bool {
        !matches!(self, TxnType::Ship | TxnType::ProjectIssue)
    }

    /// Types restricted to managers (and admins)
    pub fn is_manager_only(&self) -> bool {
        matches!(
            self,
            TxnType::DivisionTransfer | TxnType::ProjectIssue | TxnType::ProjectReturn
        )
    }
}

/// Immutable audit record of one accepted stock movement
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "transactions")]
#[serde(rename_all = "camelCase")]
#[schema(as = Transaction)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub offline_op_id: Option<String>,
    #[sea_orm(column_name = "type")]
    pub r#type: TxnType,
    pub item_id: Uuid,
    pub qty: i32,
    pub src_location_id: Option<Uuid>,
    pub dst_location_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub note: Option<String>,
    pub is_free: bool,
    #[schema(value_type = Option<String>)]
    pub unit_price: Option<Decimal>,
    pub created_by_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
