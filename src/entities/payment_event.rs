use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Idempotency ledger for payment-gateway callbacks. The unique index on
/// `external_event_id` is what turns an at-least-once redelivery into a
/// no-op: the second insert conflicts and the handler answers 200 without
/// touching the order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub external_event_id: String,
    pub event_type: String,
    pub order_id: Option<i64>,
    /// `applied`, `already_applied`, `rejected_transition`,
    /// `order_not_found` or `ignored`
    pub outcome: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
