use super::csv::command_reader::{CommandKind, CommandRecord};
use crate::application::engine::CheckoutEngine;
use crate::application::issuance::IssueOrder;
use crate::application::refund::RequestRefund;
use crate::application::verification::VerifyPayment;
use crate::domain::money::Amount;
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentMethod, UserId};
use crate::error::{PaymentError, Result};
use crate::infrastructure::sandbox::SandboxGateway;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Feeds command rows through a `CheckoutEngine` and remembers which payments it touched.
pub struct ScriptRunner {
    engine: Arc<CheckoutEngine>,
    sandbox: Option<Arc<SandboxGateway>>,
    touched: Vec<PaymentId>,
}

impl ScriptRunner {
    /// `sandbox` enables the `pay` command; without it only explicit `verify` rows work.
    pub fn new(engine: Arc<CheckoutEngine>, sandbox: Option<Arc<SandboxGateway>>) -> Self {
        Self {
            engine,
            sandbox,
            touched: Vec::new(),
        }
    }

    pub async fn run(&mut self, record: CommandRecord) -> Result<()> {
        match record.command {
            CommandKind::Issue => {
                let currency = record.currency.unwrap_or_default();
                let amount = record.amount.ok_or_else(|| {
                    PaymentError::ValidationError("issue needs an amount".to_string())
                })?;
                let issued = self
                    .engine
                    .issue_order(IssueOrder {
                        user: UserId::parse(record.require("user", &record.user)?)?,
                        course: CourseId::parse(record.require("course", &record.course)?)?,
                        amount: Amount::from_major(amount, currency)?,
                        currency,
                        notes: BTreeMap::new(),
                    })
                    .await?;
                self.touch(issued.payment_id);
            }
            CommandKind::Pay => {
                let sandbox = self.sandbox.as_ref().ok_or_else(|| {
                    PaymentError::ValidationError(
                        "pay is only available with the sandbox gateway".to_string(),
                    )
                })?;
                let order = record.require("order", &record.order)?;
                let confirmation = sandbox
                    .checkout(order, PaymentMethod::Card)
                    .await
                    .map_err(|e| PaymentError::GatewayUnavailable(e.to_string()))?;
                let outcome = self
                    .engine
                    .verify_payment(VerifyPayment {
                        gateway_order_id: confirmation.order_id,
                        gateway_payment_id: confirmation.payment_id,
                        signature: confirmation.signature,
                    })
                    .await?;
                self.touch(outcome.payment_id);
            }
            CommandKind::Verify => {
                let request = VerifyPayment {
                    gateway_order_id: record.require("order", &record.order)?.to_string(),
                    gateway_payment_id: record.require("payment", &record.payment)?.to_string(),
                    signature: record.require("signature", &record.signature)?.to_string(),
                };
                let order = request.gateway_order_id.clone();
                let result = self.engine.verify_payment(request).await;
                // A rejected verification still changes what the ledger holds.
                if let Some(payment) = self.engine.payment_by_order(&order).await? {
                    self.touch(payment.id);
                }
                result?;
            }
            CommandKind::Refund => {
                let payment = self.by_order(&record).await?;
                let amount = record.amount.ok_or_else(|| {
                    PaymentError::ValidationError("refund needs an amount".to_string())
                })?;
                self.engine
                    .request_refund(RequestRefund {
                        payment_id: payment.id,
                        amount: Amount::from_major(amount, payment.currency)
                            .map_err(|e| PaymentError::InvalidRefundAmount(e.to_string()))?
                            .minor(),
                        reason: record.reason.clone().unwrap_or_default(),
                    })
                    .await?;
                self.touch(payment.id);
            }
            CommandKind::Retry => {
                let payment = self.by_order(&record).await?;
                self.engine.retry_enrollment(payment.id).await?;
            }
        }
        Ok(())
    }

    async fn by_order(&self, record: &CommandRecord) -> Result<Payment> {
        let order = record.require("order", &record.order)?;
        self.engine
            .payment_by_order(order)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("order {}", order)))
    }

    fn touch(&mut self, id: PaymentId) {
        if !self.touched.contains(&id) {
            self.touched.push(id);
        }
    }

    /// Final state of every payment the script touched, with its course's enrollment count.
    pub async fn into_results(self) -> Result<Vec<(Payment, u64)>> {
        let mut results = Vec::with_capacity(self.touched.len());
        for id in self.touched {
            if let Some(payment) = self.engine.payment(id).await? {
                let count = self.engine.enrollment_count(&payment.course).await?;
                results.push((payment, count));
            }
        }
        Ok(results)
    }
}
