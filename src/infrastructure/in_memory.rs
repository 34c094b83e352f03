use crate::domain::enrollment::{CourseStats, EnrollmentGrant, GrantOutcome, UserEntitlements};
use crate::domain::payment::{CourseId, Payment, PaymentId, PaymentStatus, UserId};
use crate::domain::ports::{EntitlementStore, PaymentLedger, SwapOutcome, validate_swap};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    payments: HashMap<PaymentId, Payment>,
    by_order: HashMap<String, PaymentId>,
}

/// A thread-safe in-memory payment ledger.
///
/// Both maps live behind one `RwLock`, so a compare-and-swap holds the write lock for the
/// whole read-check-write and is trivially atomic.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn insert(&self, payment: Payment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id) {
            return Err(PaymentError::StoreError(format!(
                "payment {} already exists",
                payment.id
            )));
        }
        if state.by_order.contains_key(&payment.gateway_order_id) {
            return Err(PaymentError::StoreError(format!(
                "gateway order {} already recorded",
                payment.gateway_order_id
            )));
        }
        state
            .by_order
            .insert(payment.gateway_order_id.clone(), payment.id);
        state.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn find_by_order(&self, gateway_order_id: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .by_order
            .get(gateway_order_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn list_by_user(&self, user: &UserId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| &p.user == user)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn has_purchased(&self, user: &UserId, course: &CourseId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .any(|p| &p.user == user && &p.course == course && p.status.holds_purchase()))
    }

    async fn compare_and_swap(&self, expected: PaymentStatus, next: Payment) -> Result<SwapOutcome> {
        let mut state = self.state.write().await;
        let current = state
            .payments
            .get(&next.id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", next.id)))?;

        if !validate_swap(&current, expected, &next)? {
            return Ok(SwapOutcome::Conflict(current));
        }

        if next.status == PaymentStatus::Completed
            && state.payments.values().any(|p| {
                p.id != next.id
                    && p.user == next.user
                    && p.course == next.course
                    && p.status.holds_purchase()
            })
        {
            return Err(PaymentError::AlreadyEnrolled {
                user: next.user.to_string(),
                course: next.course.to_string(),
            });
        }

        state.payments.insert(next.id, next);
        Ok(SwapOutcome::Applied)
    }
}

#[derive(Default)]
struct EntitlementState {
    users: HashMap<UserId, UserEntitlements>,
    courses: HashMap<CourseId, CourseStats>,
    granted: HashSet<PaymentId>,
}

/// A thread-safe in-memory entitlement store.
#[derive(Default, Clone)]
pub struct InMemoryEntitlementStore {
    state: Arc<RwLock<EntitlementState>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn grant(&self, grant: EnrollmentGrant) -> Result<GrantOutcome> {
        let mut state = self.state.write().await;
        if !state.granted.insert(grant.payment) {
            return Ok(GrantOutcome::AlreadyGranted);
        }
        state
            .users
            .entry(grant.user.clone())
            .or_insert_with(|| UserEntitlements::new(grant.user.clone()))
            .apply(&grant);
        state
            .courses
            .entry(grant.course.clone())
            .or_default()
            .enrollment_count += 1;
        Ok(GrantOutcome::Granted)
    }

    async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(user)
            .cloned()
            .unwrap_or_else(|| UserEntitlements::new(user.clone())))
    }

    async fn enrollment_count(&self, course: &CourseId) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .courses
            .get(course)
            .map(|s| s.enrollment_count)
            .unwrap_or(0))
    }

    async fn is_granted(&self, payment: PaymentId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.granted.contains(&payment))
    }
}
