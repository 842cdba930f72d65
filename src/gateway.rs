use crate::config::AppConfig;
use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Thin typed client for the payment gateway's order-intent API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

/// Request body for creating a gateway order intent. Amounts are integer
/// minor units; `notes` round-trips arbitrary merchant metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GatewayClient {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            cfg.gateway_api_base.clone(),
            cfg.gateway_key_id.clone(),
            cfg.gateway_key_secret.clone(),
            Duration::from_secs(cfg.gateway_timeout_secs),
        )
    }

    pub fn new(
        api_base: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client build failed: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        })
    }

    /// Creates an order intent at the gateway. Non-2xx responses surface the
    /// gateway's status code so handlers can map it onto a small fixed set.
    #[instrument(skip(self, request), fields(amount = request.amount, currency = %request.currency))]
    pub async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<GatewayOrder, ServiceError> {
        let url = format!("{}/orders", self.api_base);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "gateway intent creation request failed");
                ServiceError::UpstreamGateway {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(502),
                    message: "payment gateway unreachable".to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "gateway rejected intent creation");
            return Err(ServiceError::UpstreamGateway {
                status: status.as_u16(),
                message: format!("gateway rejected intent creation: {}", truncate(&body, 256)),
            });
        }

        let order: GatewayOrder = response.json().await.map_err(|e| {
            error!(error = %e, "gateway returned malformed intent body");
            ServiceError::UpstreamGateway {
                status: 502,
                message: "malformed gateway response".to_string(),
            }
        })?;

        info!(gateway_order_id = %order.id, "gateway intent created");
        Ok(order)
    }
}

/// Converts a major-unit decimal amount to integer minor units (paise).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount {} out of range for minor units", amount))
        })
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
