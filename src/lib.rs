//! Wallcraft API Library
//!
//! Payment-intent creation, dual-path payment reconciliation and
//! transactional order materialization for the Wallcraft store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod openapi;
pub mod services;
pub mod signature;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use gateway::GatewayClient;
use services::notifications::NotificationDispatcher;
use services::orders::OrderService;
use services::payments::PaymentIntentService;
use services::reconciliation::ReconciliationService;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub payments: Arc<PaymentIntentService>,
    pub orders: Arc<OrderService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub notifications: Arc<dyn NotificationDispatcher>,
}

impl AppState {
    /// Wires the service graph from its leaf dependencies. Used by the
    /// binary and by integration tests, which substitute their own gateway
    /// endpoint and dispatcher.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<GatewayClient>,
        notifications: Arc<dyn NotificationDispatcher>,
        event_sender: events::EventSender,
    ) -> Self {
        let payments = Arc::new(PaymentIntentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            config.default_currency.clone(),
        ));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let reconciliation = Arc::new(ReconciliationService::new(
            db.clone(),
            payments.clone(),
            orders.clone(),
            notifications.clone(),
            config.gateway_key_secret.clone(),
            config.payment_webhook_secret.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            payments,
            orders,
            reconciliation,
            notifications,
        }
    }
}

/// All HTTP routes exposed by this service.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/payments", handlers::payments::payment_routes())
        .route("/health", get(handlers::health::health_check))
}
