use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    handlers::payment_webhooks,
    services::payments::CreatePaymentOrderRequest,
    services::reconciliation::VerifyPaymentRequest,
    AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::json;

/// Creates the router for payment endpoints
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-order", post(create_payment_order))
        .route("/verify", post(verify_payment))
        .route("/webhook", post(payment_webhooks::payment_webhook))
}

/// Create a gateway payment intent for a checkout
#[utoipa::path(
    post,
    path = "/payments/create-order",
    request_body = CreatePaymentOrderRequest,
    responses(
        (status = 200, description = "Gateway intent and payment record created"),
        (status = 400, description = "Invalid items or price mismatch", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway rejected the request", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_order(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let (gateway_order, payment) = state.payments.create_payment_order(payload).await?;

    Ok(success_response(json!({
        "message": "Payment order created",
        "order": gateway_order,
        "payment": payment,
    })))
}

/// Client-verify callback: confirm the payment and materialize the order
#[utoipa::path(
    post,
    path = "/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and order created"),
        (status = 400, description = "Amount or price mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let verified = state.reconciliation.verify_client_payment(payload).await?;

    Ok(success_response(json!({
        "message": "Payment verified & order created",
        "payment": verified.payment,
        "order": verified.order,
    })))
}
