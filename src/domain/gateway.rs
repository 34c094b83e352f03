use super::money::{Amount, Currency};
use super::payment::PaymentMethod;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Failures reported by a gateway adapter.
///
/// The services translate these into `PaymentError`; none of them say anything about
/// whether a signature was authentic.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway not configured: {0}")]
    NotConfigured(String),
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway timed out")]
    Timeout,
    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("gateway resource not found: {0}")]
    NotFound(String),
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub amount: Amount,
    pub currency: Currency,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub receipt: Option<String>,
    pub status: String,
}

/// Gateway-side state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    /// Funds were actually taken from the customer.
    pub fn is_captured(&self) -> bool {
        matches!(
            self,
            GatewayPaymentStatus::Authorized | GatewayPaymentStatus::Captured
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPaymentStatus::Created => "created",
            GatewayPaymentStatus::Authorized => "authorized",
            GatewayPaymentStatus::Captured => "captured",
            GatewayPaymentStatus::Refunded => "refunded",
            GatewayPaymentStatus::Failed => "failed",
            GatewayPaymentStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub status: GatewayPaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundCall {
    pub gateway_payment_id: String,
    pub amount: Amount,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub amount: Amount,
}

/// Outbound contract with the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError>;
    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
    async fn create_refund(&self, request: RefundCall) -> Result<GatewayRefund, GatewayError>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
