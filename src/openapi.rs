use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::payments::create_payment_order,
        crate::handlers::payments::verify_payment,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::payments::CreatePaymentOrderRequest,
        crate::services::reconciliation::VerifyPaymentRequest,
        crate::services::inventory::LineItemInput,
        crate::services::orders::AddressRef,
        crate::services::orders::NewAddress,
        crate::entities::order::PaymentMethod,
    )),
    tags(
        (name = "Payments", description = "Gateway payment intents and dual-path order reconciliation")
    ),
    info(
        title = "Wallcraft API",
        description = "Payment and order backend for the Wallcraft store"
    )
)]
pub struct ApiDoc;
