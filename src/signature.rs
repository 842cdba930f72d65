use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over the exact payload bytes. Exposed so tests
/// and tools can produce signatures the verifier accepts.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex signature over raw payload bytes in constant time.
pub fn verify(secret: &str, payload: &[u8], provided: &str) -> bool {
    constant_time_eq(&sign(secret, payload), provided)
}

/// Client-verify callbacks sign `gatewayOrderId|gatewayPaymentId`.
pub fn verify_client_callback(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    provided: &str,
) -> bool {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    verify(secret, payload.as_bytes(), provided)
}

/// Webhook deliveries sign the full raw request body.
pub fn verify_webhook(secret: &str, body: &[u8], provided: &str) -> bool {
    verify(secret, body, provided)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
