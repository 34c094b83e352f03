use crate::domain::payment::PaymentStatus;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    #[diagnostic(code(enrollpay::validation))]
    ValidationError(String),

    #[error("User {user} is already enrolled in course {course}")]
    #[diagnostic(
        code(enrollpay::already_enrolled),
        help("the course is already paid for; no new order is needed")
    )]
    AlreadyEnrolled { user: String, course: String },

    #[error("Payment already processed (status: {0})")]
    #[diagnostic(code(enrollpay::already_processed))]
    AlreadyProcessed(PaymentStatus),

    #[error("Not found: {0}")]
    #[diagnostic(code(enrollpay::not_found))]
    NotFound(String),

    #[error("Signature verification failed for order {order_id}")]
    #[diagnostic(
        code(enrollpay::signature_invalid),
        help("the payment has been marked failed; issue a fresh order to retry")
    )]
    SignatureInvalid { order_id: String },

    #[error("Payment gateway unavailable: {0}")]
    #[diagnostic(code(enrollpay::gateway_unavailable), help("safe to retry"))]
    GatewayUnavailable(String),

    #[error("Gateway payment does not match the order: {0}")]
    #[diagnostic(code(enrollpay::gateway_mismatch))]
    GatewayMismatch(String),

    #[error("Payment {payment_id} not captured by the gateway (gateway status: {status})")]
    #[diagnostic(code(enrollpay::not_captured))]
    PaymentNotCaptured { payment_id: String, status: String },

    #[error("Invalid refund amount: {0}")]
    #[diagnostic(code(enrollpay::invalid_refund_amount))]
    InvalidRefundAmount(String),

    #[error("Payment is not refundable in status {0}")]
    #[diagnostic(code(enrollpay::not_refundable))]
    NotRefundable(PaymentStatus),

    #[error("Refund failed: {0}")]
    #[diagnostic(code(enrollpay::refund_failed), help("the payment is still completed"))]
    RefundFailed(String),

    #[error("Illegal status transition {from} -> {to}")]
    #[diagnostic(code(enrollpay::invalid_transition))]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("Store error: {0}")]
    #[diagnostic(code(enrollpay::store))]
    StoreError(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(enrollpay::serialization))]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    #[diagnostic(code(enrollpay::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(enrollpay::io))]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    #[diagnostic(code(enrollpay::rocksdb))]
    RocksDBError(#[from] rocksdb::Error),
}

impl PaymentError {
    /// Whether the caller may retry the same request unchanged.
    ///
    /// Signature failures, business-rule rejections and idempotency short-circuits are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::GatewayUnavailable(_)
            | PaymentError::StoreError(_)
            | PaymentError::IoError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            PaymentError::RocksDBError(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_and_gateway_errors_are_classified_differently() {
        let forged = PaymentError::SignatureInvalid {
            order_id: "order_1".to_string(),
        };
        let down = PaymentError::GatewayUnavailable("timeout".to_string());

        assert!(!forged.is_retryable());
        assert!(down.is_retryable());
    }

    #[test]
    fn test_business_rejections_are_not_retryable() {
        assert!(!PaymentError::NotRefundable(PaymentStatus::Refunded).is_retryable());
        assert!(!PaymentError::InvalidRefundAmount("too much".to_string()).is_retryable());
        assert!(!PaymentError::AlreadyProcessed(PaymentStatus::Failed).is_retryable());
    }

    #[test]
    fn test_transition_error_message() {
        let err = PaymentError::InvalidTransition {
            from: PaymentStatus::Failed,
            to: PaymentStatus::Completed,
        };
        assert_eq!(err.to_string(), "Illegal status transition failed -> completed");
    }
}
