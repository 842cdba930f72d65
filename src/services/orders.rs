use crate::{
    entities::order::{self, HistoryEntry, OrderStatus, PaymentMethod},
    entities::{address, order_item},
    errors::ServiceError,
    events::EventSender,
    services::inventory::{self, LineItemInput},
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shipping destination for a new order: either an existing address id or
/// inline fields for an address created with the order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AddressRef {
    ById(Uuid),
    Inline(NewAddress),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewAddress {
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 7, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

/// Service owning order materialization and its inverse, compensation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    pub fn event_sender(&self) -> &EventSender {
        &self.event_sender
    }

    /// Materializes an order: resolves the address, reserves stock at
    /// authoritative prices and persists the order with its line items.
    ///
    /// Takes the caller's open transaction; materialization must commit or
    /// abort together with the payment-state transition, and the signature
    /// makes running it outside a transaction unrepresentable.
    #[instrument(skip(self, txn, items, address), fields(user_id = %user_id, item_count = items.len()))]
    pub async fn create_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        items: &[LineItemInput],
        address: &AddressRef,
        payment_method: PaymentMethod,
        payment_intent_id: Option<Uuid>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let address_id = self.resolve_address(txn, user_id, address).await?;

        let reserved = inventory::reserve_items(txn, items).await?;

        let total_amount: Decimal = reserved.iter().map(|item| item.line_total).sum();

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let history = vec![HistoryEntry {
            status: OrderStatus::Processing.to_string(),
            at: now,
            note: Some("Order placed".to_string()),
        }];

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(user_id),
            address_id: Set(address_id),
            total_amount: Set(total_amount),
            payment_method: Set(payment_method.to_string()),
            payment_intent_id: Set(payment_intent_id),
            status: Set(OrderStatus::Processing.to_string()),
            history: Set(serde_json::to_value(&history)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(txn)
        .await?;

        let mut order_items = Vec::with_capacity(reserved.len());
        for item in reserved {
            let persisted = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                name: Set(item.name),
                image: Set(item.image),
                unit_price: Set(item.unit_price),
                quantity: Set(item.quantity),
                area: Set(item.area),
                selected_texture: Set(item.selected_texture),
                selected_colour: Set(item.selected_colour),
                line_total: Set(item.line_total),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
            order_items.push(persisted);
        }

        info!(%order_id, %order_number, %total_amount, "order materialized");

        Ok((order_model, order_items))
    }

    /// Compensation: cancels the order and returns its reserved quantities
    /// to stock, inside the caller's transaction. Idempotent at the order
    /// level - an already-cancelled order is left untouched.
    ///
    /// Returns `true` if the order was cancelled by this call.
    #[instrument(skip(self, txn, order_model), fields(order_id = %order_model.id))]
    pub async fn cancel_with_restock(
        &self,
        txn: &DatabaseTransaction,
        order_model: &order::Model,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        if order_model.parsed_status() == OrderStatus::Cancelled {
            info!(order_id = %order_model.id, "order already cancelled; skipping compensation");
            return Ok(false);
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(txn)
            .await?;

        inventory::restock_items(txn, &items).await?;

        let now = Utc::now();
        let mut history = order_model.history_entries();
        history.push(HistoryEntry {
            status: OrderStatus::Cancelled.to_string(),
            at: now,
            note: Some(reason.to_string()),
        });

        let mut update: order::ActiveModel = order_model.clone().into();
        update.status = Set(OrderStatus::Cancelled.to_string());
        update.cancelled_at = Set(Some(now));
        update.cancellation_reason = Set(Some(reason.to_string()));
        update.history = Set(
            serde_json::to_value(&history).map_err(|e| ServiceError::InternalError(e.to_string()))?
        );
        update.updated_at = Set(Some(now));
        update.update(txn).await?;

        info!(order_id = %order_model.id, %reason, "order cancelled and stock restored");

        Ok(true)
    }

    /// Looks up the order materialized for a payment intent, if any.
    pub async fn find_by_payment_intent(
        &self,
        payment_intent_id: Uuid,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?)
    }

    async fn resolve_address(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        address: &AddressRef,
    ) -> Result<Uuid, ServiceError> {
        match address {
            AddressRef::ById(id) => {
                let existing = address::Entity::find_by_id(*id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))?;

                if existing.user_id != user_id {
                    return Err(ServiceError::AddressInvalid(
                        "address does not belong to this user".to_string(),
                    ));
                }

                Ok(existing.id)
            }
            AddressRef::Inline(fields) => {
                fields
                    .validate()
                    .map_err(|e| ServiceError::AddressInvalid(e.to_string()))?;

                let created = address::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    first_name: Set(fields.first_name.clone()),
                    last_name: Set(fields.last_name.clone()),
                    email: Set(fields.email.clone()),
                    phone: Set(fields.phone.clone()),
                    street: Set(fields.street.clone()),
                    city: Set(fields.city.clone()),
                    state: Set(fields.state.clone()),
                    postal_code: Set(fields.postal_code.clone()),
                    country: Set(fields.country.clone()),
                    is_default: Set(false),
                    created_at: Set(Utc::now()),
                }
                .insert(txn)
                .await?;

                Ok(created.id)
            }
        }
    }
}

/// Time-based order number: sortable by creation time, with a random
/// suffix to separate orders landing in the same millisecond.
fn generate_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("WC-{}-{:04}", millis, suffix)
}
