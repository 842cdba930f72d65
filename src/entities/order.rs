use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub user_id: Uuid,
    pub address_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub payment_method: String,
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<Uuid>,
    pub status: String,
    /// Append-only status-change audit trail
    #[sea_orm(column_type = "Json")]
    pub history: Json,
    #[sea_orm(nullable)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    #[strum(serialize = "Out for Delivery")]
    OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
}

/// Payment method selected at checkout. Reconciliation only ever runs for
/// gateway payments; cash on delivery orders settle offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[strum(serialize = "online")]
    #[serde(rename = "online")]
    Online,
    #[strum(serialize = "cod")]
    #[serde(rename = "cod")]
    CashOnDelivery,
}

/// One audit-history entry stored in the order's `history` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Model {
    pub fn parsed_status(&self) -> OrderStatus {
        self.status.parse().unwrap_or(OrderStatus::Pending)
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        serde_json::from_value(self.history.clone()).unwrap_or_default()
    }
}
