use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use uuid::Uuid;

// ============================================================================
// Payment Gateway
// ============================================================================
//
// The gateway SDK is an external collaborator. Checkout only needs two
// things from it: an opaque gateway order id for online payments, and the
// ability to verify the `{gateway_order_id}|{payment_id}` signature the
// client hands back after paying.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid payment signature")]
    InvalidSignature,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register an order with the gateway and return its order id
    async fn create_order(&self, amount: Decimal, receipt: Uuid) -> Result<String, PaymentError>;

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> Result<(), PaymentError>;
}

/// Gateway stand-in for development: issues local order ids and checks
/// signatures against the configured key secret.
pub struct LocalGateway {
    key_secret: String,
}

impl LocalGateway {
    pub fn new(key_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_order(&self, amount: Decimal, receipt: Uuid) -> Result<String, PaymentError> {
        let gateway_order_id = format!("order_{}", Uuid::new_v4().simple());
        tracing::debug!(receipt = %receipt, amount = %amount, gateway_order_id = %gateway_order_id, "Gateway order created");
        Ok(gateway_order_id)
    }

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> Result<(), PaymentError> {
        verify_payment_signature(&self.key_secret, gateway_order_id, payment_id, signature)
    }
}

/// Hex-encoded HMAC-SHA256 of `{gateway_order_id}|{payment_id}`
pub fn sign_payment(key_secret: &str, gateway_order_id: &str, payment_id: &str) -> Result<String, PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key_secret.as_bytes())
        .map_err(|_| PaymentError::Unavailable("HMAC key error".to_string()))?;
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<(), PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key_secret.as_bytes())
        .map_err(|_| PaymentError::Unavailable("HMAC key error".to_string()))?;
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());

    // Constant-time comparison via hmac::verify_slice
    let sig_bytes = hex::decode(signature.trim()).map_err(|_| PaymentError::InvalidSignature)?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| PaymentError::InvalidSignature)
}
