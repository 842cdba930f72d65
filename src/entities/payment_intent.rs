use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One payment attempt against the external gateway, from creation to a
/// terminal success/failure. At most one row exists per gateway order id,
/// and the status never leaves a terminal state once set.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_intents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub gateway_order_id: String,
    #[sea_orm(nullable)]
    pub gateway_payment_id: Option<String>,
    /// Amount in minor currency units (paise)
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    #[sea_orm(nullable)]
    pub method: Option<String>,
    #[sea_orm(nullable)]
    pub verified_via: Option<String>,
    #[sea_orm(nullable)]
    pub error_code: Option<String>,
    #[sea_orm(nullable)]
    pub error_description: Option<String>,
    /// Everything a later, sessionless process needs to rebuild the order:
    /// user id, address ref, line items, payment method, clear-cart flag.
    #[sea_orm(column_type = "Json")]
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum VerificationChannel {
    #[strum(serialize = "client-verify")]
    #[serde(rename = "client-verify")]
    ClientVerify,
    #[strum(serialize = "webhook")]
    #[serde(rename = "webhook")]
    Webhook,
}

impl Model {
    pub fn parsed_status(&self) -> PaymentStatus {
        self.status
            .parse()
            .unwrap_or(PaymentStatus::Created)
    }

    pub fn is_terminal(&self) -> bool {
        self.parsed_status() != PaymentStatus::Created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PaymentStatus::Created,
            PaymentStatus::Success,
            PaymentStatus::Failed,
        ] {
            let parsed: PaymentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(PaymentStatus::Success.to_string(), "success");
    }

    #[test]
    fn verification_channel_uses_original_wire_values() {
        assert_eq!(VerificationChannel::ClientVerify.to_string(), "client-verify");
        assert_eq!(VerificationChannel::Webhook.to_string(), "webhook");
    }
}
