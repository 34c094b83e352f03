use super::enrollment::EnrollmentCompleter;
use super::issuance::{IssueOrder, IssuedOrder, OrderIssuer};
use super::refund::{RefundProcessor, RefundReceipt, RequestRefund};
use super::verification::{VerificationEngine, VerificationOutcome, VerifyPayment};
use crate::domain::enrollment::{GrantOutcome, UserEntitlements};
use crate::domain::gateway::{GatewayOrder, PaymentGatewayRef};
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentSummary, UserId};
use crate::domain::ports::{EntitlementStoreRef, PaymentLedgerRef};
use crate::domain::signature::GatewaySecret;
use crate::error::Result;
use std::sync::Arc;

/// The entry point the API layer talks to.
///
/// `CheckoutEngine` wires the issuance, verification, enrollment and refund services to one
/// ledger, one entitlement store and one gateway. It is `Send + Sync`; share it behind an
/// `Arc` across request handlers.
pub struct CheckoutEngine {
    ledger: PaymentLedgerRef,
    issuer: OrderIssuer,
    verifier: VerificationEngine,
    completer: Arc<EnrollmentCompleter>,
    refunds: RefundProcessor,
}

impl CheckoutEngine {
    /// Creates a new `CheckoutEngine`.
    ///
    /// # Arguments
    ///
    /// * `ledger` - The store for payment records.
    /// * `entitlements` - The store for granted enrollments and course counters.
    /// * `gateway` - The payment gateway adapter.
    /// * `secret` - The gateway's shared secret used to check checkout signatures.
    pub fn new(
        ledger: PaymentLedgerRef,
        entitlements: EntitlementStoreRef,
        gateway: PaymentGatewayRef,
        secret: GatewaySecret,
    ) -> Self {
        let completer = Arc::new(EnrollmentCompleter::new(ledger.clone(), entitlements));
        Self {
            issuer: OrderIssuer::new(ledger.clone(), gateway.clone()),
            verifier: VerificationEngine::new(
                ledger.clone(),
                gateway.clone(),
                secret,
                completer.clone(),
            ),
            refunds: RefundProcessor::new(ledger.clone(), gateway),
            completer,
            ledger,
        }
    }

    pub async fn issue_order(&self, request: IssueOrder) -> Result<IssuedOrder> {
        self.issuer.issue(request).await
    }

    pub async fn verify_payment(&self, request: VerifyPayment) -> Result<VerificationOutcome> {
        self.verifier.verify(request).await
    }

    pub async fn request_refund(&self, request: RequestRefund) -> Result<RefundReceipt> {
        self.refunds.refund(request).await
    }

    /// A user's payments, newest first.
    pub async fn history(&self, user: &UserId) -> Result<Vec<PaymentSummary>> {
        Ok(self
            .ledger
            .list_by_user(user)
            .await?
            .iter()
            .map(PaymentSummary::from)
            .collect())
    }

    pub async fn pending_orders(&self, user: &UserId, course: &CourseId) -> Result<Vec<Payment>> {
        self.issuer.pending_orders(user, course).await
    }

    pub async fn order_status(&self, gateway_order_id: &str) -> Result<GatewayOrder> {
        self.issuer.order_status(gateway_order_id).await
    }

    pub async fn retry_enrollment(&self, payment_id: PaymentId) -> Result<GrantOutcome> {
        self.completer.retry(payment_id).await
    }

    pub async fn payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.ledger.get(payment_id).await
    }

    pub async fn payment_by_order(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        self.ledger.find_by_order(gateway_order_id).await
    }

    pub async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements> {
        self.completer.entitlements(user).await
    }

    pub async fn enrollment_count(&self, course: &CourseId) -> Result<u64> {
        self.completer.enrollment_count(course).await
    }
}
