use super::money::{Amount, Currency};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// System-generated identity of a Payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PaymentId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| PaymentError::ValidationError(format!("Invalid payment id: {}", e)))
    }
}

/// Opaque reference to a user owned by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque reference to a course owned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub String);

macro_rules! opaque_id {
    ($ty:ident, $label:literal) => {
        impl $ty {
            pub fn parse(raw: impl Into<String>) -> Result<Self, PaymentError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(PaymentError::ValidationError(format!(
                        "{} must not be empty",
                        $label
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(UserId, "user id");
opaque_id!(CourseId, "course id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// The only legal edges: pending->completed, pending->failed, completed->refunded.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Completed)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }

    /// A captured payment keeps the user's purchase of the course, even once refunded.
    pub fn holds_purchase(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Payment method as reported by the gateway once a payment is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Netbanking,
    Wallet,
    Upi,
    #[serde(other)]
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub amount: Amount,
    pub gateway_refund_id: String,
    pub reason: String,
    pub processed_at: DateTime<Utc>,
}

/// Details recorded when a payment is verified.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub gateway_payment_id: String,
    pub signature: String,
    pub method: PaymentMethod,
    pub completed_at: DateTime<Utc>,
}

/// The ledger entry tracking one purchase attempt of one course by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user: UserId,
    pub course: CourseId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub signature: Option<String>,
    pub method: Option<PaymentMethod>,
    pub receipt: String,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
    pub refund: Option<RefundRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// A freshly issued payment, waiting for the customer to finish checkout.
    pub fn pending(
        user: UserId,
        course: CourseId,
        amount: Amount,
        currency: Currency,
        gateway_order_id: String,
        receipt: String,
        notes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            user,
            course,
            amount,
            currency,
            status: PaymentStatus::Pending,
            gateway_order_id,
            gateway_payment_id: None,
            signature: None,
            method: None,
            receipt,
            notes,
            refund: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), PaymentError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            Ok(())
        } else {
            Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    /// pending -> completed, recording the verified gateway payment.
    pub fn complete(&mut self, capture: Capture) -> Result<(), PaymentError> {
        if capture.gateway_payment_id.is_empty() || capture.signature.is_empty() {
            return Err(PaymentError::ValidationError(
                "A completed payment needs a gateway payment id and signature".to_string(),
            ));
        }
        self.transition(PaymentStatus::Completed)?;
        self.gateway_payment_id = Some(capture.gateway_payment_id);
        self.signature = Some(capture.signature);
        self.method = Some(capture.method);
        self.completed_at = Some(capture.completed_at);
        Ok(())
    }

    /// pending -> failed
    pub fn fail(&mut self) -> Result<(), PaymentError> {
        self.transition(PaymentStatus::Failed)
    }

    /// completed -> refunded. Terminal.
    pub fn refund(&mut self, record: RefundRecord) -> Result<(), PaymentError> {
        if record.amount > self.amount {
            return Err(PaymentError::InvalidRefundAmount(format!(
                "refund {} exceeds payment amount {}",
                record.amount, self.amount
            )));
        }
        self.transition(PaymentStatus::Refunded)?;
        self.refund = Some(record);
        Ok(())
    }
}

/// Read-only projection returned by the history query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub id: PaymentId,
    pub course: CourseId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub method: Option<PaymentMethod>,
    pub receipt: String,
    pub gateway_order_id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refund: Option<RefundRecord>,
}

impl From<&Payment> for PaymentSummary {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id,
            course: payment.course.clone(),
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
            receipt: payment.receipt.clone(),
            gateway_order_id: payment.gateway_order_id.clone(),
            created_at: payment.created_at,
            completed_at: payment.completed_at,
            refund: payment.refund.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_payment() -> Payment {
        Payment::pending(
            UserId::parse("user_1").unwrap(),
            CourseId::parse("course_1").unwrap(),
            Amount::new(2999).unwrap(),
            Currency::INR,
            "order_1".to_string(),
            "course_course_1_1".to_string(),
            BTreeMap::new(),
        )
    }

    fn capture() -> Capture {
        Capture {
            gateway_payment_id: "pay_1".to_string(),
            signature: "abc".to_string(),
            method: PaymentMethod::Upi,
            completed_at: Utc::now(),
        }
    }

    fn refund_of(minor: i64) -> RefundRecord {
        RefundRecord {
            amount: Amount::new(minor).unwrap(),
            gateway_refund_id: "rfnd_1".to_string(),
            reason: "duplicate purchase".to_string(),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_legal_edges() {
        use PaymentStatus::*;
        let all = [Pending, Completed, Failed, Refunded];
        let legal = [(Pending, Completed), (Pending, Failed), (Completed, Refunded)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_complete_records_capture() {
        let mut payment = pending_payment();
        payment.complete(capture()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(payment.method, Some(PaymentMethod::Upi));
        assert!(payment.completed_at.is_some());
        assert_eq!(payment.signature.as_deref(), Some("abc"));
    }

    #[test]
    fn test_complete_requires_payment_id() {
        let mut payment = pending_payment();
        let mut cap = capture();
        cap.gateway_payment_id.clear();

        assert!(matches!(
            payment.complete(cap),
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_refunded_payment_still_holds_purchase() {
        assert!(PaymentStatus::Completed.holds_purchase());
        assert!(PaymentStatus::Refunded.holds_purchase());
        assert!(!PaymentStatus::Pending.holds_purchase());
        assert!(!PaymentStatus::Failed.holds_purchase());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut payment = pending_payment();
        payment.fail().unwrap();

        assert!(matches!(
            payment.complete(capture()),
            Err(PaymentError::InvalidTransition { .. })
        ));
        assert!(payment.fail().is_err());
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.gateway_payment_id.is_none());
    }

    #[test]
    fn test_refund_only_from_completed() {
        let mut payment = pending_payment();
        assert!(matches!(
            payment.refund(refund_of(100)),
            Err(PaymentError::InvalidTransition { .. })
        ));

        payment.complete(capture()).unwrap();
        payment.refund(refund_of(2999)).unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);

        assert!(payment.refund(refund_of(1)).is_err());
        assert_eq!(payment.refund.as_ref().unwrap().amount.minor(), 2999);
    }

    #[test]
    fn test_refund_cannot_exceed_amount() {
        let mut payment = pending_payment();
        payment.complete(capture()).unwrap();

        assert!(matches!(
            payment.refund(refund_of(3000)),
            Err(PaymentError::InvalidRefundAmount(_))
        ));
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_unknown_method_deserializes_as_other() {
        let method: PaymentMethod = serde_json::from_str("\"emi\"").unwrap();
        assert_eq!(method, PaymentMethod::Other);
    }

    #[test]
    fn test_payment_round_trips_through_json() {
        let payment = pending_payment();
        let bytes = serde_json::to_vec(&payment).unwrap();
        let back: Payment = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, payment);
    }
}
