use crate::domain::gateway::{GatewayError, GatewayOrder, OrderRequest, PaymentGatewayRef};
use crate::domain::money::{Amount, Currency};
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentStatus, UserId};
use crate::domain::ports::PaymentLedgerRef;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

/// A request to buy one course at its current catalog price.
#[derive(Debug, Clone)]
pub struct IssueOrder {
    pub user: UserId,
    pub course: CourseId,
    /// The authoritative price in minor units, as read from the catalog.
    pub amount: Amount,
    pub currency: Currency,
    /// Extra context forwarded to the gateway (course title, category).
    pub notes: BTreeMap<String, String>,
}

/// What the caller needs to send the customer to the gateway's checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedOrder {
    pub payment_id: PaymentId,
    pub gateway_order_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub receipt: String,
}

pub struct OrderIssuer {
    ledger: PaymentLedgerRef,
    gateway: PaymentGatewayRef,
}

impl OrderIssuer {
    pub fn new(ledger: PaymentLedgerRef, gateway: PaymentGatewayRef) -> Self {
        Self { ledger, gateway }
    }

    /// Creates a gateway order and records it as a `pending` payment.
    ///
    /// Nothing is written unless the gateway accepted the order.
    pub async fn issue(&self, request: IssueOrder) -> Result<IssuedOrder> {
        if self
            .ledger
            .has_purchased(&request.user, &request.course)
            .await?
        {
            return Err(PaymentError::AlreadyEnrolled {
                user: request.user.to_string(),
                course: request.course.to_string(),
            });
        }

        let receipt = receipt_for(&request.course);
        let mut gateway_notes = request.notes.clone();
        gateway_notes.insert("courseId".to_string(), request.course.to_string());
        gateway_notes.insert("userId".to_string(), request.user.to_string());

        let order = self
            .gateway
            .create_order(OrderRequest {
                amount: request.amount,
                currency: request.currency,
                receipt: receipt.clone(),
                notes: gateway_notes,
            })
            .await
            .map_err(|e| {
                warn!(course = %request.course, error = %e, "order creation failed");
                PaymentError::GatewayUnavailable(e.to_string())
            })?;

        if order.amount != request.amount || order.currency != request.currency {
            return Err(PaymentError::GatewayMismatch(format!(
                "order {} was created for {} {} instead of {} {}",
                order.id, order.amount, order.currency, request.amount, request.currency
            )));
        }

        let payment = Payment::pending(
            request.user,
            request.course,
            request.amount,
            request.currency,
            order.id.clone(),
            receipt.clone(),
            request.notes,
        );
        let issued = IssuedOrder {
            payment_id: payment.id,
            gateway_order_id: order.id,
            amount: payment.amount,
            currency: payment.currency,
            receipt,
        };
        self.ledger.insert(payment).await?;

        info!(
            payment_id = %issued.payment_id,
            order_id = %issued.gateway_order_id,
            amount = issued.amount.minor(),
            "order issued"
        );
        Ok(issued)
    }

    /// The gateway's current view of an order.
    pub async fn order_status(&self, gateway_order_id: &str) -> Result<GatewayOrder> {
        self.gateway
            .fetch_order(gateway_order_id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(id) => PaymentError::NotFound(format!("order {}", id)),
                other => PaymentError::GatewayUnavailable(other.to_string()),
            })
    }

    /// Pending payments for a user and course, so a caller can check before retrying.
    pub async fn pending_orders(&self, user: &UserId, course: &CourseId) -> Result<Vec<Payment>> {
        Ok(self
            .ledger
            .list_by_user(user)
            .await?
            .into_iter()
            .filter(|p| &p.course == course && p.status == PaymentStatus::Pending)
            .collect())
    }
}

/// `course_<course>_<unix millis>_<suffix>`; the suffix keeps same-millisecond requests apart.
fn receipt_for(course: &CourseId) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "course_{}_{}_{}",
        course,
        Utc::now().timestamp_millis(),
        &suffix[..8]
    )
}
