use crate::{
    entities::order::PaymentMethod,
    entities::payment_intent::{self, PaymentStatus, VerificationChannel},
    entities::product,
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{to_minor_units, CreateIntentRequest, GatewayClient, GatewayOrder},
    services::inventory::LineItemInput,
    services::orders::AddressRef,
    services::pricing,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Checkout payload for creating a gateway payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentOrderRequest {
    pub user_id: Uuid,
    pub items: Vec<LineItemInput>,
    pub address: AddressRef,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    /// Clear the user's cart once the payment materializes an order
    #[serde(default)]
    pub clear_cart: bool,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Online
}

/// Everything a later, sessionless reconciliation needs to rebuild the
/// order. Stored on the intent row and mirrored into the gateway notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub user_id: Uuid,
    pub address: AddressRef,
    pub items: Vec<LineItemInput>,
    pub payment_method: PaymentMethod,
    pub clear_cart: bool,
}

/// Result of attempting to claim the `created -> success` transition.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller won the transition.
    Claimed(payment_intent::Model),
    /// Another path already completed the payment; treat as duplicate.
    AlreadySucceeded(payment_intent::Model),
    /// The intent had already failed terminally.
    AlreadyFailed(payment_intent::Model),
}

/// Store and lifecycle owner for payment intents.
#[derive(Clone)]
pub struct PaymentIntentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<GatewayClient>,
    event_sender: EventSender,
    currency: String,
}

impl PaymentIntentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<GatewayClient>,
        event_sender: EventSender,
        currency: String,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            currency,
        }
    }

    /// Prices the requested items against the catalog, creates the gateway
    /// order intent and records a `created` PaymentIntent carrying the
    /// metadata needed to rebuild the order without request context.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, item_count = request.items.len()))]
    pub async fn create_payment_order(
        &self,
        request: CreatePaymentOrderRequest,
    ) -> Result<(GatewayOrder, payment_intent::Model), ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one line item is required".to_string(),
            ));
        }

        let mut total = Decimal::ZERO;
        for item in &request.items {
            let product = product::Entity::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            let unit_price =
                pricing::resolve_unit_price(&product, item.selected_texture.as_deref())?;
            pricing::check_client_price(&product.name, unit_price, item.unit_price)?;
            total += pricing::line_total(unit_price, item.quantity, item.area);
        }

        let amount_minor = to_minor_units(total)?;

        let metadata = IntentMetadata {
            user_id: request.user_id,
            address: request.address.clone(),
            items: request.items.clone(),
            payment_method: request.payment_method,
            clear_cart: request.clear_cart,
        };
        let metadata_value = serde_json::to_value(&metadata)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        let gateway_order = self
            .gateway
            .create_intent(CreateIntentRequest {
                amount: amount_minor,
                currency: self.currency.clone(),
                receipt: format!("order_rcpt_{}", Utc::now().timestamp_millis()),
                notes: metadata_value.clone(),
            })
            .await?;

        let now = Utc::now();
        let intent = payment_intent::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(request.user_id),
            gateway_order_id: Set(gateway_order.id.clone()),
            gateway_payment_id: Set(None),
            amount_minor: Set(amount_minor),
            currency: Set(self.currency.clone()),
            status: Set(PaymentStatus::Created.to_string()),
            method: Set(Some(request.payment_method.to_string())),
            verified_via: Set(None),
            error_code: Set(None),
            error_description: Set(None),
            metadata: Set(metadata_value),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db)
        .await?;

        info!(
            payment_intent_id = %intent.id,
            gateway_order_id = %intent.gateway_order_id,
            amount_minor,
            "payment intent created"
        );

        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                payment_intent_id: intent.id,
                gateway_order_id: intent.gateway_order_id.clone(),
            })
            .await;

        Ok((gateway_order, intent))
    }

    pub async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<payment_intent::Model>, ServiceError> {
        Ok(payment_intent::Entity::find()
            .filter(payment_intent::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?)
    }

    /// Claims the `created -> success` transition with a conditional update.
    ///
    /// The filter on the current status makes the claim a compare-and-swap:
    /// two racing paths can both read `created`, but only one update matches
    /// and the loser observes zero affected rows. Runs on the caller's
    /// transaction so a later materialization failure rolls the claim back.
    #[instrument(skip(self, conn))]
    pub async fn mark_succeeded<C: ConnectionTrait>(
        &self,
        conn: &C,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        via: VerificationChannel,
    ) -> Result<ClaimOutcome, ServiceError> {
        let result = payment_intent::Entity::update_many()
            .col_expr(
                payment_intent::Column::Status,
                Expr::value(PaymentStatus::Success.to_string()),
            )
            .col_expr(
                payment_intent::Column::GatewayPaymentId,
                Expr::value(gateway_payment_id),
            )
            .col_expr(
                payment_intent::Column::VerifiedVia,
                Expr::value(via.to_string()),
            )
            .col_expr(payment_intent::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_intent::Column::GatewayOrderId.eq(gateway_order_id))
            .filter(payment_intent::Column::Status.eq(PaymentStatus::Created.to_string()))
            .exec(conn)
            .await?;

        let current = payment_intent::Entity::find()
            .filter(payment_intent::Column::GatewayOrderId.eq(gateway_order_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Payment intent for gateway order {} not found",
                    gateway_order_id
                ))
            })?;

        if result.rows_affected == 1 {
            info!(
                gateway_order_id,
                verified_via = %via,
                "payment intent claimed as succeeded"
            );
            return Ok(ClaimOutcome::Claimed(current));
        }

        match current.parsed_status() {
            PaymentStatus::Success => Ok(ClaimOutcome::AlreadySucceeded(current)),
            PaymentStatus::Failed => Ok(ClaimOutcome::AlreadyFailed(current)),
            PaymentStatus::Created => {
                // The row was created between our update and the re-read, or
                // the backend could not serialize the claim.
                error!(gateway_order_id, "payment claim raced without resolution");
                Err(ServiceError::Conflict(format!(
                    "payment {} is being processed concurrently",
                    gateway_order_id
                )))
            }
        }
    }

    /// Terminal failure write, outside any transaction. Never downgrades an
    /// intent that already succeeded; repeated failure writes are no-ops
    /// beyond refreshing the error detail.
    ///
    /// Returns `None` when no intent matches the gateway order id.
    #[instrument(skip(self, description))]
    pub async fn mark_failed(
        &self,
        gateway_order_id: &str,
        code: &str,
        description: &str,
    ) -> Result<Option<payment_intent::Model>, ServiceError> {
        let Some(intent) = self.find_by_gateway_order_id(gateway_order_id).await? else {
            warn!(gateway_order_id, "failure reported for unknown payment intent");
            return Ok(None);
        };

        if intent.parsed_status() == PaymentStatus::Success {
            warn!(
                gateway_order_id,
                code, "ignoring failure write for an already-successful payment"
            );
            return Ok(Some(intent));
        }

        let mut update: payment_intent::ActiveModel = intent.into();
        update.status = Set(PaymentStatus::Failed.to_string());
        update.error_code = Set(Some(code.to_string()));
        update.error_description = Set(Some(description.to_string()));
        update.updated_at = Set(Some(Utc::now()));
        let updated = update.update(&*self.db).await?;

        info!(gateway_order_id, code, "payment intent marked failed");

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                gateway_order_id: gateway_order_id.to_string(),
                error_code: code.to_string(),
            })
            .await;

        Ok(Some(updated))
    }
}
