//! The reconciliation orchestrator.
//!
//! Two independently-delivered triggers report the outcome of the same
//! gateway payment: the paying browser's synchronous verify call and the
//! gateway's at-least-once webhook. Both converge here. Whichever arrives
//! first claims the intent's `created -> success` transition and
//! materializes the order inside one transaction; the other observes the
//! claim and becomes a no-op.

use crate::{
    entities::address,
    entities::order::{self, PaymentMethod},
    entities::payment_intent::{self, PaymentStatus, VerificationChannel},
    errors::ServiceError,
    events::Event,
    gateway::to_minor_units,
    services::carts,
    services::inventory::LineItemInput,
    services::notifications::{NotificationDispatcher, NotificationJob, NotificationKind},
    services::orders::{AddressRef, OrderService},
    services::payments::{ClaimOutcome, IntentMetadata, PaymentIntentService},
    signature,
};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Client-verify request body: the gateway's callback parameters plus the
/// order context the browser still holds.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
    pub user_id: Uuid,
    pub items: Vec<LineItemInput>,
    pub address: AddressRef,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub clear_cart: bool,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Online
}

#[derive(Debug, Serialize)]
pub struct VerifiedPayment {
    pub payment: payment_intent::Model,
    pub order: order::Model,
}

/// Gateway webhook envelope (payment.captured / order.paid / payment.failed).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Option<WebhookPayload>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<WebhookEntityWrapper>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookEntityWrapper {
    pub entity: WebhookPaymentEntity,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WebhookPaymentEntity {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

/// How a webhook delivery was resolved. Every variant is acknowledged with
/// 200; failures are internal and surfaced through logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
    Failed,
}

enum MaterializeRun {
    Completed {
        payment: payment_intent::Model,
        order: order::Model,
    },
    Duplicate {
        payment: payment_intent::Model,
    },
}

struct MaterializeContext<'a> {
    user_id: Uuid,
    items: &'a [LineItemInput],
    address: &'a AddressRef,
    payment_method: PaymentMethod,
    clear_cart: bool,
    expected_total: Option<Decimal>,
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    payments: Arc<PaymentIntentService>,
    orders: Arc<OrderService>,
    notifications: Arc<dyn NotificationDispatcher>,
    gateway_key_secret: String,
    webhook_secret: String,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        payments: Arc<PaymentIntentService>,
        orders: Arc<OrderService>,
        notifications: Arc<dyn NotificationDispatcher>,
        gateway_key_secret: String,
        webhook_secret: String,
    ) -> Self {
        Self {
            db,
            payments,
            orders,
            notifications,
            gateway_key_secret,
            webhook_secret,
        }
    }

    /// Webhook deliveries sign the raw request body; handlers must verify
    /// before parsing anything.
    pub fn verify_webhook_signature(&self, body: &[u8], provided: &str) -> bool {
        signature::verify_webhook(&self.webhook_secret, body, provided)
    }

    /// Client-Verify Path: the paying browser reports the gateway callback.
    #[instrument(skip(self, request), fields(gateway_order_id = %request.gateway_order_id))]
    pub async fn verify_client_payment(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<VerifiedPayment, ServiceError> {
        if !signature::verify_client_callback(
            &self.gateway_key_secret,
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
        ) {
            warn!(
                gateway_order_id = %request.gateway_order_id,
                "client verification signature mismatch"
            );
            let _ = self
                .payments
                .mark_failed(
                    &request.gateway_order_id,
                    "SIGNATURE_MISMATCH",
                    "Invalid signature",
                )
                .await;
            return Err(ServiceError::SignatureInvalid);
        }

        let intent = self
            .payments
            .find_by_gateway_order_id(&request.gateway_order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Payment intent for gateway order {} not found",
                    request.gateway_order_id
                ))
            })?;

        let context = MaterializeContext {
            user_id: request.user_id,
            items: &request.items,
            address: &request.address,
            payment_method: request.payment_method,
            clear_cart: request.clear_cart,
            expected_total: request.total_amount,
        };

        let txn = self.db.begin().await?;
        let run = self
            .materialize_in_txn(
                &txn,
                &intent,
                &context,
                &request.gateway_payment_id,
                VerificationChannel::ClientVerify,
            )
            .await;

        match run {
            Ok(MaterializeRun::Completed { payment, order }) => {
                txn.commit().await?;
                counter!("payments.reconciliation.succeeded", 1, "path" => "client-verify");
                self.after_materialization(&payment, &order).await;
                Ok(VerifiedPayment { payment, order })
            }
            Ok(MaterializeRun::Duplicate { payment }) => {
                txn.commit().await?;
                counter!("payments.reconciliation.duplicates", 1, "path" => "client-verify");
                let existing = self
                    .orders
                    .find_by_payment_intent(payment.id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Conflict(
                            "payment already processed but no order found".to_string(),
                        )
                    })?;
                info!(
                    gateway_order_id = %request.gateway_order_id,
                    order_id = %existing.id,
                    "payment already reconciled; returning existing order"
                );
                Ok(VerifiedPayment {
                    payment,
                    order: existing,
                })
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "transaction rollback failed");
                }
                // The transaction is gone; record the failure in its own write.
                let _ = self
                    .payments
                    .mark_failed(&request.gateway_order_id, err.code(), &err.to_string())
                    .await;
                counter!("payments.reconciliation.failed", 1, "path" => "client-verify");
                Err(err)
            }
        }
    }

    /// Webhook Path: at-least-once, possibly out-of-order delivery from the
    /// gateway. The caller has already verified the body signature; every
    /// outcome from here on is acknowledged with 200, so failures are
    /// logged and counted instead of surfaced.
    #[instrument(skip(self, envelope), fields(event = %envelope.event))]
    pub async fn process_webhook(&self, envelope: WebhookEnvelope) -> WebhookOutcome {
        let entity = match envelope
            .payload
            .as_ref()
            .and_then(|payload| payload.payment.as_ref())
        {
            Some(wrapper) => &wrapper.entity,
            None => {
                warn!(event = %envelope.event, "webhook without payment entity ignored");
                return WebhookOutcome::Ignored;
            }
        };

        match envelope.event.as_str() {
            "payment.captured" | "order.paid" => self.process_captured(entity).await,
            "payment.failed" => self.process_failed(entity).await,
            other => {
                info!(event = other, "unhandled webhook event type");
                WebhookOutcome::Ignored
            }
        }
    }

    async fn process_captured(&self, entity: &WebhookPaymentEntity) -> WebhookOutcome {
        let gateway_order_id = entity.order_id.as_str();

        let intent = match self.payments.find_by_gateway_order_id(gateway_order_id).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                warn!(gateway_order_id, "capture reported for unknown intent");
                counter!("payments.webhook.unknown_intent", 1);
                return WebhookOutcome::Ignored;
            }
            Err(err) => {
                return self.post_ack_failure(gateway_order_id, &err);
            }
        };

        // Idempotency fast path: a completed intent means the order exists
        // and this delivery is a duplicate or lost the race.
        if intent.parsed_status() == PaymentStatus::Success {
            info!(gateway_order_id, "payment already reconciled; acknowledging duplicate");
            counter!("payments.reconciliation.duplicates", 1, "path" => "webhook");
            return WebhookOutcome::Duplicate;
        }

        // The webhook has no HTTP session; the metadata recorded at intent
        // creation is the only order context available.
        let metadata: IntentMetadata = match serde_json::from_value(intent.metadata.clone()) {
            Ok(metadata) => metadata,
            Err(err) => {
                error!(
                    gateway_order_id,
                    error = %err,
                    "intent metadata unusable; order cannot be rebuilt"
                );
                counter!("payments.webhook.post_ack_failures", 1);
                return WebhookOutcome::Failed;
            }
        };

        let context = MaterializeContext {
            user_id: metadata.user_id,
            items: &metadata.items,
            address: &metadata.address,
            payment_method: metadata.payment_method,
            clear_cart: metadata.clear_cart,
            expected_total: None,
        };

        let txn = match self.db.begin().await {
            Ok(txn) => txn,
            Err(err) => {
                return self.post_ack_failure(gateway_order_id, &err.into());
            }
        };

        let run = self
            .materialize_in_txn(&txn, &intent, &context, &entity.id, VerificationChannel::Webhook)
            .await;

        match run {
            Ok(MaterializeRun::Completed { payment, order }) => {
                if let Err(err) = txn.commit().await {
                    return self.post_ack_failure(gateway_order_id, &err.into());
                }
                counter!("payments.reconciliation.succeeded", 1, "path" => "webhook");
                info!(gateway_order_id, order_id = %order.id, "order created via webhook");
                self.after_materialization(&payment, &order).await;
                WebhookOutcome::Processed
            }
            Ok(MaterializeRun::Duplicate { .. }) => {
                let _ = txn.commit().await;
                counter!("payments.reconciliation.duplicates", 1, "path" => "webhook");
                WebhookOutcome::Duplicate
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "transaction rollback failed");
                }
                let _ = self
                    .payments
                    .mark_failed(gateway_order_id, err.code(), &err.to_string())
                    .await;
                self.post_ack_failure(gateway_order_id, &err)
            }
        }
    }

    async fn process_failed(&self, entity: &WebhookPaymentEntity) -> WebhookOutcome {
        let gateway_order_id = entity.order_id.as_str();
        let code = entity.error_code.as_deref().unwrap_or("PAYMENT_FAILED");
        let reason = entity
            .error_reason
            .as_deref()
            .or(entity.error_description.as_deref())
            .unwrap_or("Unknown");

        let intent = match self.payments.mark_failed(gateway_order_id, code, reason).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                warn!(gateway_order_id, "failure reported for unknown intent");
                return WebhookOutcome::Ignored;
            }
            Err(err) => {
                return self.post_ack_failure(gateway_order_id, &err);
            }
        };

        // Normally nothing has been materialized for a failed payment, but a
        // late failure after a won race must unwind the order it paid for.
        let existing = match self.orders.find_by_payment_intent(intent.id).await {
            Ok(existing) => existing,
            Err(err) => {
                return self.post_ack_failure(gateway_order_id, &err);
            }
        };

        let Some(order_model) = existing else {
            info!(gateway_order_id, "payment failed before materialization; nothing to unwind");
            return WebhookOutcome::Processed;
        };

        match self.compensate(&order_model, reason).await {
            Ok(cancelled) => {
                if cancelled {
                    counter!("payments.reconciliation.compensations", 1);
                }
                WebhookOutcome::Processed
            }
            Err(err) => self.post_ack_failure(gateway_order_id, &err),
        }
    }

    /// Cancels a materialized order and restores its stock in one
    /// transaction. Safe to call repeatedly; an already-cancelled order is
    /// left untouched.
    pub async fn compensate(
        &self,
        order_model: &order::Model,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let cancelled = self.orders.cancel_with_restock(&txn, order_model, reason).await?;
        txn.commit().await?;

        if cancelled {
            self.orders
                .event_sender()
                .send_or_log(Event::OrderCancelled {
                    order_id: order_model.id,
                    reason: reason.to_string(),
                })
                .await;
        }

        Ok(cancelled)
    }

    /// Shared materialization sequence for both paths: claim the intent,
    /// build the order, assert the amounts line up, clear the cart.
    async fn materialize_in_txn(
        &self,
        txn: &DatabaseTransaction,
        intent: &payment_intent::Model,
        context: &MaterializeContext<'_>,
        gateway_payment_id: &str,
        via: VerificationChannel,
    ) -> Result<MaterializeRun, ServiceError> {
        let claim = self
            .payments
            .mark_succeeded(txn, &intent.gateway_order_id, gateway_payment_id, via)
            .await?;

        let payment = match claim {
            ClaimOutcome::Claimed(payment) => payment,
            ClaimOutcome::AlreadySucceeded(payment) => {
                return Ok(MaterializeRun::Duplicate { payment });
            }
            ClaimOutcome::AlreadyFailed(_) => {
                return Err(ServiceError::Conflict(format!(
                    "payment {} already failed terminally",
                    intent.gateway_order_id
                )));
            }
        };

        let (order_model, _items) = self
            .orders
            .create_order(
                txn,
                context.user_id,
                context.items,
                context.address,
                context.payment_method,
                Some(payment.id),
            )
            .await?;

        // The intent's amount was priced from the same catalog at checkout;
        // a divergence means tampering or a stale catalog read.
        let order_minor = to_minor_units(order_model.total_amount)?;
        if order_minor != payment.amount_minor {
            return Err(ServiceError::AmountMismatch(format!(
                "order total {} does not match authorized amount {}",
                order_minor, payment.amount_minor
            )));
        }

        if let Some(expected) = context.expected_total {
            if expected != order_model.total_amount {
                return Err(ServiceError::AmountMismatch(format!(
                    "client total {} does not match order total {}",
                    expected, order_model.total_amount
                )));
            }
        }

        if context.clear_cart {
            carts::clear_cart(txn, context.user_id).await?;
        }

        Ok(MaterializeRun::Completed {
            payment,
            order: order_model,
        })
    }

    /// Post-commit side effects: domain events and the best-effort success
    /// notification. Nothing here may fail the request.
    async fn after_materialization(
        &self,
        payment: &payment_intent::Model,
        order_model: &order::Model,
    ) {
        let sender = self.orders.event_sender();
        sender
            .send_or_log(Event::PaymentCaptured {
                payment_intent_id: payment.id,
                verified_via: payment
                    .verified_via
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .await;
        sender.send_or_log(Event::OrderCreated(order_model.id)).await;

        let recipient = match address::Entity::find_by_id(order_model.address_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(addr)) => addr.email,
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "could not load address for notification");
                None
            }
        };

        let Some(to) = recipient else {
            info!(order_id = %order_model.id, "no recipient email; skipping notification");
            return;
        };

        let job = NotificationJob {
            kind: NotificationKind::OrderConfirmation,
            to,
            subject: format!("Your Wallcraft order {}", order_model.order_number),
            template_data: serde_json::json!({
                "order_number": order_model.order_number,
                "total_amount": order_model.total_amount,
                "status": order_model.status,
            }),
        };

        if self.notifications.enqueue(job).await.is_none() {
            warn!(order_id = %order_model.id, "order confirmation could not be enqueued");
        }
    }

    fn post_ack_failure(&self, gateway_order_id: &str, err: &ServiceError) -> WebhookOutcome {
        // The gateway has already been (or will be) told 200; this failure
        // is only visible operationally. The counter is the hook for the
        // reconciliation sweep and alerting.
        error!(
            gateway_order_id,
            error = %err,
            "webhook processing failed after acknowledgment"
        );
        counter!("payments.webhook.post_ack_failures", 1);
        WebhookOutcome::Failed
    }
}
