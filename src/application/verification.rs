use super::enrollment::EnrollmentCompleter;
use crate::domain::enrollment::GrantOutcome;
use crate::domain::gateway::{GatewayError, GatewayPaymentStatus, PaymentGatewayRef};
use crate::domain::payment::{Capture, Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{PaymentLedgerRef, SwapOutcome};
use crate::domain::signature::GatewaySecret;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The confirmation a customer's browser posts back after checkout.
#[derive(Debug, Clone)]
pub struct VerifyPayment {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

impl VerifyPayment {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("order id", &self.gateway_order_id),
            ("payment id", &self.gateway_payment_id),
            ("signature", &self.signature),
        ] {
            if value.trim().is_empty() {
                return Err(PaymentError::ValidationError(format!(
                    "{} is required",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// What happened to the entitlement after the payment was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentState {
    Granted,
    AlreadyGranted,
    /// The payment stands; the grant failed and must be retried.
    Deferred(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub enrollment: EnrollmentState,
    /// True when this call repeated an already accepted verification.
    pub replayed: bool,
}

pub struct VerificationEngine {
    ledger: PaymentLedgerRef,
    gateway: PaymentGatewayRef,
    secret: GatewaySecret,
    completer: Arc<EnrollmentCompleter>,
}

impl VerificationEngine {
    pub fn new(
        ledger: PaymentLedgerRef,
        gateway: PaymentGatewayRef,
        secret: GatewaySecret,
        completer: Arc<EnrollmentCompleter>,
    ) -> Self {
        Self {
            ledger,
            gateway,
            secret,
            completer,
        }
    }

    /// Checks the signature, confirms the capture with the gateway, completes the payment
    /// and grants the enrollment.
    pub async fn verify(&self, request: VerifyPayment) -> Result<VerificationOutcome> {
        request.validate()?;

        let payment = self
            .ledger
            .find_by_order(&request.gateway_order_id)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("order {}", request.gateway_order_id))
            })?;

        if payment.status != PaymentStatus::Pending {
            return self.settled(payment, &request).await;
        }

        if !self.secret.verify(
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.signature,
        ) {
            warn!(
                order_id = %request.gateway_order_id,
                payment_id = %payment.id,
                "signature mismatch, marking payment failed"
            );
            self.mark_failed(&payment).await?;
            return Err(PaymentError::SignatureInvalid {
                order_id: request.gateway_order_id,
            });
        }

        let details = self
            .gateway
            .fetch_payment(&request.gateway_payment_id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => PaymentError::PaymentNotCaptured {
                    payment_id: request.gateway_payment_id.clone(),
                    status: "unknown".to_string(),
                },
                other => PaymentError::GatewayUnavailable(other.to_string()),
            })?;

        if details.order_id.as_deref() != Some(request.gateway_order_id.as_str())
            || details.amount != payment.amount
            || details.currency != payment.currency
        {
            warn!(
                order_id = %request.gateway_order_id,
                gateway_payment_id = %details.id,
                "gateway payment does not belong to this order"
            );
            self.mark_failed(&payment).await?;
            return Err(PaymentError::GatewayMismatch(format!(
                "payment {} is for order {:?} ({} {}), expected {} ({} {})",
                details.id,
                details.order_id,
                details.amount,
                details.currency,
                request.gateway_order_id,
                payment.amount,
                payment.currency
            )));
        }

        if !details.status.is_captured() {
            if details.status == GatewayPaymentStatus::Failed {
                self.mark_failed(&payment).await?;
            }
            return Err(PaymentError::PaymentNotCaptured {
                payment_id: details.id,
                status: details.status.as_str().to_string(),
            });
        }

        let mut next = payment.clone();
        next.complete(Capture {
            gateway_payment_id: request.gateway_payment_id.clone(),
            signature: request.signature.clone(),
            method: details.method,
            completed_at: Utc::now(),
        })?;

        match self
            .ledger
            .compare_and_swap(PaymentStatus::Pending, next.clone())
            .await
        {
            Ok(SwapOutcome::Applied) => {}
            Ok(SwapOutcome::Conflict(current)) => return self.settled(current, &request).await,
            Err(e @ PaymentError::AlreadyEnrolled { .. }) => {
                error!(
                    payment_id = %payment.id,
                    gateway_payment_id = %request.gateway_payment_id,
                    "captured payment for a course the user already owns, needs a manual refund"
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        info!(
            payment_id = %next.id,
            order_id = %next.gateway_order_id,
            "payment completed"
        );

        let enrollment = self.enroll(&next).await;
        Ok(VerificationOutcome {
            payment_id: next.id,
            status: next.status,
            completed_at: next.completed_at,
            enrollment,
            replayed: false,
        })
    }

    /// Answers a verification for a payment that is no longer pending.
    ///
    /// A repeat of the accepted confirmation returns the earlier result; anything else is
    /// rejected, including a second attempt after a failure.
    async fn settled(
        &self,
        payment: Payment,
        request: &VerifyPayment,
    ) -> Result<VerificationOutcome> {
        let same_capture = payment.status == PaymentStatus::Completed
            && payment.gateway_payment_id.as_deref() == Some(request.gateway_payment_id.as_str())
            && self.secret.verify(
                &request.gateway_order_id,
                &request.gateway_payment_id,
                &request.signature,
            );

        if !same_capture {
            return Err(PaymentError::AlreadyProcessed(payment.status));
        }

        let enrollment = self.enroll(&payment).await;
        Ok(VerificationOutcome {
            payment_id: payment.id,
            status: payment.status,
            completed_at: payment.completed_at,
            enrollment,
            replayed: true,
        })
    }

    async fn enroll(&self, payment: &Payment) -> EnrollmentState {
        match self.completer.complete(payment).await {
            Ok(GrantOutcome::Granted) => EnrollmentState::Granted,
            Ok(GrantOutcome::AlreadyGranted) => EnrollmentState::AlreadyGranted,
            Err(e) => {
                error!(payment_id = %payment.id, error = %e, "enrollment deferred");
                EnrollmentState::Deferred(e.to_string())
            }
        }
    }

    async fn mark_failed(&self, payment: &Payment) -> Result<()> {
        let mut failed = payment.clone();
        failed.fail()?;
        if let SwapOutcome::Conflict(current) = self
            .ledger
            .compare_and_swap(PaymentStatus::Pending, failed)
            .await?
        {
            warn!(
                payment_id = %payment.id,
                status = %current.status,
                "payment settled concurrently, leaving it as is"
            );
        }
        Ok(())
    }
}
