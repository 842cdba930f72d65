use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the reconciliation engine. Consumers are
/// in-process; delivery is best-effort and must never gate a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PaymentIntentCreated {
        payment_intent_id: Uuid,
        gateway_order_id: String,
    },
    PaymentCaptured {
        payment_intent_id: Uuid,
        verified_via: String,
    },
    PaymentFailed {
        gateway_order_id: String,
        error_code: String,
    },
    OrderCreated(Uuid),
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget send for call sites where delivery failure only
    /// warrants a log line.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("event dropped: {}", e);
        }
    }
}

/// Drains the event channel, logging each event. Runs until every sender is
/// dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentIntentCreated {
                payment_intent_id,
                gateway_order_id,
            } => {
                info!(%payment_intent_id, %gateway_order_id, "payment intent created");
            }
            Event::PaymentCaptured {
                payment_intent_id,
                verified_via,
            } => {
                info!(%payment_intent_id, %verified_via, "payment captured");
            }
            Event::PaymentFailed {
                gateway_order_id,
                error_code,
            } => {
                warn!(%gateway_order_id, %error_code, "payment failed");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderCancelled { order_id, reason } => {
                info!(%order_id, %reason, "order cancelled");
            }
        }
    }
}
