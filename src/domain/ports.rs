use super::enrollment::{EnrollmentGrant, GrantOutcome, UserEntitlements};
use super::payment::{CourseId, Payment, PaymentId, PaymentStatus, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a conditional ledger write.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    /// The stored status matched and the new record is now in place.
    Applied,
    /// Another writer got there first; carries the record as currently stored.
    Conflict(Payment),
}

/// Durable store of Payment records.
///
/// Every mutation after `insert` goes through `compare_and_swap`, which must be atomic per
/// payment: two callers expecting the same status can never both see `Applied`.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Stores a new payment. Fails if the id or the gateway order id is already known.
    async fn insert(&self, payment: Payment) -> Result<()>;

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_by_order(&self, gateway_order_id: &str) -> Result<Option<Payment>>;

    /// All payments of a user, newest first.
    async fn list_by_user(&self, user: &UserId) -> Result<Vec<Payment>>;

    /// Whether the user holds a `completed` or `refunded` payment for the course.
    async fn has_purchased(&self, user: &UserId, course: &CourseId) -> Result<bool>;

    /// Replaces the stored record with `next` iff its status is still `expected`.
    ///
    /// Implementations reject illegal status edges, amount changes, and completing a
    /// payment while another one already holds that user's purchase of the course.
    async fn compare_and_swap(&self, expected: PaymentStatus, next: Payment) -> Result<SwapOutcome>;
}

/// Store of granted entitlements and per-course counters.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Applies the grant as one atomic unit: the idempotency record, the user's enrollment
    /// and the course counter move together or not at all.
    async fn grant(&self, grant: EnrollmentGrant) -> Result<GrantOutcome>;

    async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements>;

    async fn enrollment_count(&self, course: &CourseId) -> Result<u64>;

    async fn is_granted(&self, payment: PaymentId) -> Result<bool>;
}

pub type PaymentLedgerRef = Arc<dyn PaymentLedger>;
pub type EntitlementStoreRef = Arc<dyn EntitlementStore>;

/// Checks shared by every ledger before a swap is written.
pub fn validate_swap(current: &Payment, expected: PaymentStatus, next: &Payment) -> Result<bool> {
    use crate::error::PaymentError;

    if current.status != expected {
        return Ok(false);
    }
    if current.id != next.id || current.gateway_order_id != next.gateway_order_id {
        return Err(PaymentError::StoreError(
            "swap must target the same payment".to_string(),
        ));
    }
    if current.amount != next.amount || current.currency != next.currency {
        return Err(PaymentError::ValidationError(
            "payment amount is immutable".to_string(),
        ));
    }
    if !current.status.can_transition_to(next.status) {
        return Err(PaymentError::InvalidTransition {
            from: current.status,
            to: next.status,
        });
    }
    Ok(true)
}
