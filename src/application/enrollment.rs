use crate::domain::enrollment::{EnrollmentGrant, GrantOutcome, UserEntitlements};
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentStatus, UserId};
use crate::domain::ports::{EntitlementStoreRef, PaymentLedgerRef};
use crate::error::{PaymentError, Result};
use tracing::info;

/// Turns a completed payment into course access, once.
pub struct EnrollmentCompleter {
    ledger: PaymentLedgerRef,
    store: EntitlementStoreRef,
}

impl EnrollmentCompleter {
    pub fn new(ledger: PaymentLedgerRef, store: EntitlementStoreRef) -> Self {
        Self { ledger, store }
    }

    /// Grants the entitlement for `payment`. Safe to call any number of times.
    pub async fn complete(&self, payment: &Payment) -> Result<GrantOutcome> {
        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::ValidationError(format!(
                "payment {} is {}, only completed payments grant access",
                payment.id, payment.status
            )));
        }

        if self.store.is_granted(payment.id).await? {
            return Ok(GrantOutcome::AlreadyGranted);
        }
        let outcome = self.store.grant(EnrollmentGrant::for_payment(payment)).await?;
        if outcome == GrantOutcome::Granted {
            info!(
                payment_id = %payment.id,
                user = %payment.user,
                course = %payment.course,
                "enrollment granted"
            );
        }
        Ok(outcome)
    }

    /// Re-runs the grant for a payment whose enrollment was deferred.
    pub async fn retry(&self, payment_id: PaymentId) -> Result<GrantOutcome> {
        let payment = self
            .ledger
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", payment_id)))?;
        self.complete(&payment).await
    }

    pub async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements> {
        self.store.entitlements(user).await
    }

    pub async fn enrollment_count(&self, course: &CourseId) -> Result<u64> {
        self.store.enrollment_count(course).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Currency};
    use crate::domain::payment::{Capture, PaymentMethod};
    use crate::domain::ports::PaymentLedger;
    use crate::infrastructure::in_memory::{InMemoryEntitlementStore, InMemoryLedger};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    async fn completed_payment(ledger: &InMemoryLedger) -> Payment {
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
        payment
    }

    #[tokio::test]
    async fn test_complete_twice_counts_once() {
        let ledger = Arc::new(InMemoryLedger::new());
        let completer =
            EnrollmentCompleter::new(ledger.clone(), Arc::new(InMemoryEntitlementStore::new()));
        let payment = completed_payment(&ledger).await;

        assert_eq!(completer.complete(&payment).await.unwrap(), GrantOutcome::Granted);
        assert_eq!(
            completer.complete(&payment).await.unwrap(),
            GrantOutcome::AlreadyGranted
        );
        assert_eq!(completer.enrollment_count(&payment.course).await.unwrap(), 1);

        let entitlements = completer.entitlements(&payment.user).await.unwrap();
        assert_eq!(entitlements.enrollments.len(), 1);
        assert_eq!(entitlements.payment_history, vec![payment.id]);
    }

    #[tokio::test]
    async fn test_pending_payment_grants_nothing() {
        let ledger = Arc::new(InMemoryLedger::new());
        let completer =
            EnrollmentCompleter::new(ledger.clone(), Arc::new(InMemoryEntitlementStore::new()));
        let mut payment = completed_payment(&ledger).await;
        payment.status = PaymentStatus::Pending;

        assert!(matches!(
            completer.complete(&payment).await,
            Err(PaymentError::ValidationError(_))
        ));
        assert_eq!(completer.enrollment_count(&payment.course).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_loads_from_ledger() {
        let ledger = Arc::new(InMemoryLedger::new());
        let completer =
            EnrollmentCompleter::new(ledger.clone(), Arc::new(InMemoryEntitlementStore::new()));
        let payment = completed_payment(&ledger).await;

        assert_eq!(completer.retry(payment.id).await.unwrap(), GrantOutcome::Granted);
        assert!(matches!(
            completer.retry(PaymentId::generate()).await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
