use crate::domain::gateway::{PaymentGatewayRef, RefundCall};
use crate::domain::money::Amount;
use crate::domain::payment::{PaymentId, PaymentStatus, RefundRecord};
use crate::domain::ports::{PaymentLedgerRef, SwapOutcome};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RequestRefund {
    pub payment_id: PaymentId,
    /// Minor units; must be positive and at most the payment amount.
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount: Amount,
    pub processed_at: DateTime<Utc>,
}

/// Marks a payment as having a refund in flight; cleared on drop.
struct InFlight {
    set: Arc<Mutex<HashSet<PaymentId>>>,
    id: PaymentId,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<HashSet<PaymentId>>>, id: PaymentId) -> Option<Self> {
        let mut guard = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(id).then(|| Self {
            set: set.clone(),
            id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(&self.id);
    }
}

pub struct RefundProcessor {
    ledger: PaymentLedgerRef,
    gateway: PaymentGatewayRef,
    in_flight: Arc<Mutex<HashSet<PaymentId>>>,
}

impl RefundProcessor {
    pub fn new(ledger: PaymentLedgerRef, gateway: PaymentGatewayRef) -> Self {
        Self {
            ledger,
            gateway,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Refunds a completed payment once. A refunded payment is final.
    pub async fn refund(&self, request: RequestRefund) -> Result<RefundReceipt> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::ValidationError(
                "refund reason is required".to_string(),
            ));
        }
        let amount = Amount::new(request.amount).map_err(|_| {
            PaymentError::InvalidRefundAmount(format!(
                "refund amount must be positive, got {}",
                request.amount
            ))
        })?;

        let payment = self
            .ledger
            .get(request.payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", request.payment_id)))?;

        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::NotRefundable(payment.status));
        }
        if amount > payment.amount {
            return Err(PaymentError::InvalidRefundAmount(format!(
                "refund {} exceeds payment amount {}",
                amount, payment.amount
            )));
        }
        let gateway_payment_id = payment.gateway_payment_id.clone().ok_or_else(|| {
            PaymentError::StoreError(format!(
                "completed payment {} has no gateway payment id",
                payment.id
            ))
        })?;

        let Some(_in_flight) = InFlight::acquire(&self.in_flight, payment.id) else {
            return Err(PaymentError::AlreadyProcessed(payment.status));
        };
        // A refund may have finished between the read above and taking the guard.
        if let Some(current) = self.ledger.get(payment.id).await?
            && current.status != PaymentStatus::Completed
        {
            return Err(PaymentError::NotRefundable(current.status));
        }

        let notes = BTreeMap::from([
            ("reason".to_string(), reason.to_string()),
            ("receipt".to_string(), payment.receipt.clone()),
        ]);
        let refund = self
            .gateway
            .create_refund(RefundCall {
                gateway_payment_id,
                amount,
                notes,
            })
            .await
            .map_err(|e| {
                warn!(payment_id = %payment.id, error = %e, "gateway refused refund");
                PaymentError::RefundFailed(e.to_string())
            })?;

        let record = RefundRecord {
            amount,
            gateway_refund_id: refund.id.clone(),
            reason: reason.to_string(),
            processed_at: Utc::now(),
        };
        let mut next = payment.clone();
        next.refund(record.clone())?;

        match self
            .ledger
            .compare_and_swap(PaymentStatus::Completed, next)
            .await?
        {
            SwapOutcome::Applied => {}
            SwapOutcome::Conflict(current) => {
                error!(
                    payment_id = %payment.id,
                    refund_id = %refund.id,
                    status = %current.status,
                    "gateway refund executed but payment changed underneath"
                );
                return Err(PaymentError::AlreadyProcessed(current.status));
            }
        }

        info!(
            payment_id = %payment.id,
            refund_id = %refund.id,
            amount = amount.minor(),
            "payment refunded"
        );
        Ok(RefundReceipt {
            refund_id: refund.id,
            amount,
            processed_at: record.processed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateway::{GatewayPayment, GatewayPaymentStatus};
    use crate::domain::money::Currency;
    use crate::domain::payment::{Capture, CourseId, Payment, PaymentMethod, UserId};
    use crate::domain::ports::PaymentLedger;
    use crate::domain::signature::GatewaySecret;
    use crate::infrastructure::in_memory::InMemoryLedger;
    use crate::infrastructure::sandbox::SandboxGateway;

    async fn setup() -> (Arc<InMemoryLedger>, Arc<SandboxGateway>, Payment) {
        let ledger = Arc::new(InMemoryLedger::new());
        let gateway = Arc::new(SandboxGateway::new(GatewaySecret::new("s")));
        gateway
            .insert_payment(GatewayPayment {
                id: "pay_1".to_string(),
                order_id: Some("order_1".to_string()),
                amount: Amount::new(2999).unwrap(),
                currency: Currency::INR,
                method: PaymentMethod::Card,
                status: GatewayPaymentStatus::Captured,
            })
            .await;

        let mut payment = Payment::pending(
            UserId("u1".to_string()),
            CourseId("c1".to_string()),
            Amount::new(2999).unwrap(),
            Currency::INR,
            "order_1".to_string(),
            "rcpt".to_string(),
            BTreeMap::new(),
        );
        ledger.insert(payment.clone()).await.unwrap();
        payment
            .complete(Capture {
                gateway_payment_id: "pay_1".to_string(),
                signature: "sig".to_string(),
                method: PaymentMethod::Card,
                completed_at: Utc::now(),
            })
            .unwrap();
        ledger
            .compare_and_swap(PaymentStatus::Pending, payment.clone())
            .await
            .unwrap();
        (ledger, gateway, payment)
    }

    fn request(payment: &Payment, amount: i64) -> RequestRefund {
        RequestRefund {
            payment_id: payment.id,
            amount,
            reason: "duplicate purchase".to_string(),
        }
    }

    #[tokio::test]
    async fn test_full_refund_is_terminal() {
        let (ledger, gateway, payment) = setup().await;
        let processor = RefundProcessor::new(ledger.clone(), gateway);

        let receipt = processor.refund(request(&payment, 2999)).await.unwrap();
        assert_eq!(receipt.refund_id, "rfnd_1");
        assert_eq!(receipt.amount.minor(), 2999);

        let stored = ledger.get(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(stored.refund.unwrap().reason, "duplicate purchase");

        let again = processor.refund(request(&payment, 1)).await;
        assert!(matches!(
            again,
            Err(PaymentError::NotRefundable(PaymentStatus::Refunded))
        ));
    }

    #[tokio::test]
    async fn test_amount_bounds() {
        let (ledger, gateway, payment) = setup().await;
        let processor = RefundProcessor::new(ledger.clone(), gateway);

        assert!(matches!(
            processor.refund(request(&payment, 3000)).await,
            Err(PaymentError::InvalidRefundAmount(_))
        ));
        assert!(matches!(
            processor.refund(request(&payment, 0)).await,
            Err(PaymentError::InvalidRefundAmount(_))
        ));
        assert_eq!(
            ledger.get(payment.id).await.unwrap().unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_partial_refund_is_still_one_shot() {
        let (ledger, gateway, payment) = setup().await;
        let processor = RefundProcessor::new(ledger.clone(), gateway);

        processor.refund(request(&payment, 1000)).await.unwrap();
        assert!(processor.refund(request(&payment, 1000)).await.is_err());

        let stored = ledger.get(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.refund.unwrap().amount.minor(), 1000);
    }

    #[tokio::test]
    async fn test_gateway_rejection_keeps_payment_completed() {
        let (ledger, gateway, payment) = setup().await;
        gateway.set_refunds_enabled(false);
        let processor = RefundProcessor::new(ledger.clone(), gateway);

        let result = processor.refund(request(&payment, 2999)).await;
        assert!(matches!(result, Err(PaymentError::RefundFailed(_))));

        let stored = ledger.get(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert!(stored.refund.is_none());
    }

    #[tokio::test]
    async fn test_reason_is_required() {
        let (ledger, gateway, payment) = setup().await;
        let processor = RefundProcessor::new(ledger, gateway);

        let mut req = request(&payment, 100);
        req.reason = "  ".to_string();
        assert!(matches!(
            processor.refund(req).await,
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let id = PaymentId::generate();

        let first = InFlight::acquire(&set, id);
        assert!(first.is_some());
        assert!(InFlight::acquire(&set, id).is_none());
        drop(first);
        assert!(InFlight::acquire(&set, id).is_some());
    }
}
