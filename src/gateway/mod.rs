pub mod sslcommerz;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::payment::CustomerSnapshot;

pub use sslcommerz::SslCommerzGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway timed out")]
    Timeout,

    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    #[error("payment gateway rejected the request: {reason}")]
    Rejected { reason: String, raw: Value },

    #[error("payment gateway returned malformed data: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whatever the provider sent back, for the payment's audit trail.
    pub fn raw_response(&self) -> Value {
        match self {
            GatewayError::Rejected { raw, .. } => raw.clone(),
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub success: String,
    pub fail: String,
    pub cancel: String,
    pub ipn: String,
}

impl CallbackUrls {
    pub fn under(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            success: format!("{base}/payments/success"),
            fail: format!("{base}/payments/fail"),
            cancel: format!("{base}/payments/cancel"),
            ipn: format!("{base}/payments/ipn"),
        }
    }
}

/// Everything the provider needs to open a hosted checkout for one ride.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub ride_id: Uuid,
    pub user_id: Uuid,
    pub customer: CustomerSnapshot,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub callbacks: CallbackUrls,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_key: String,
    pub gateway_url: String,
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub transaction_id: Option<String>,
    pub raw: Value,
}

impl ValidationReport {
    /// Valid and, when the provider echoes a transaction id, issued for `transaction_id`.
    pub fn confirms(&self, transaction_id: &str) -> bool {
        self.status == ValidationStatus::Valid
            && self
                .transaction_id
                .as_deref()
                .is_none_or(|echoed| echoed == transaction_id)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    async fn validate(&self, val_id: &str) -> Result<ValidationReport, GatewayError>;
}
