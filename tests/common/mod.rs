#![allow(dead_code)]

use async_trait::async_trait;
use enrollpay::application::engine::CheckoutEngine;
use enrollpay::application::issuance::{IssueOrder, IssuedOrder};
use enrollpay::application::verification::VerifyPayment;
use enrollpay::domain::enrollment::{EnrollmentGrant, GrantOutcome, UserEntitlements};
use enrollpay::domain::money::{Amount, Currency};
use enrollpay::domain::payment::{CourseId, PaymentId, PaymentMethod, UserId};
use enrollpay::domain::ports::{EntitlementStore, EntitlementStoreRef};
use enrollpay::domain::signature::GatewaySecret;
use enrollpay::error::{PaymentError, Result};
use enrollpay::infrastructure::in_memory::{InMemoryEntitlementStore, InMemoryLedger};
use enrollpay::infrastructure::sandbox::SandboxGateway;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const SECRET: &str = "integration_secret";

pub struct Harness {
    pub engine: Arc<CheckoutEngine>,
    pub gateway: Arc<SandboxGateway>,
    pub secret: GatewaySecret,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(InMemoryEntitlementStore::new()))
}

pub fn harness_with(entitlements: EntitlementStoreRef) -> Harness {
    let secret = GatewaySecret::new(SECRET);
    let gateway = Arc::new(SandboxGateway::new(secret.clone()));
    let engine = CheckoutEngine::new(
        Arc::new(InMemoryLedger::new()),
        entitlements,
        gateway.clone(),
        secret.clone(),
    );
    Harness {
        engine: Arc::new(engine),
        gateway,
        secret,
    }
}

pub fn course_order(user: &str, course: &str, minor: i64) -> IssueOrder {
    IssueOrder {
        user: UserId::parse(user).unwrap(),
        course: CourseId::parse(course).unwrap(),
        amount: Amount::new(minor).unwrap(),
        currency: Currency::INR,
        notes: BTreeMap::new(),
    }
}

/// Pays the order at the sandbox checkout and returns the confirmation as a verify request.
pub async fn pay(h: &Harness, issued: &IssuedOrder) -> VerifyPayment {
    let c = h
        .gateway
        .checkout(&issued.gateway_order_id, PaymentMethod::Card)
        .await
        .unwrap();
    VerifyPayment {
        gateway_order_id: c.order_id,
        gateway_payment_id: c.payment_id,
        signature: c.signature,
    }
}

/// Entitlement store whose grants fail while `outage` is set.
pub struct FlakyEntitlements {
    inner: InMemoryEntitlementStore,
    outage: AtomicBool,
}

impl FlakyEntitlements {
    pub fn new(outage: bool) -> Self {
        Self {
            inner: InMemoryEntitlementStore::new(),
            outage: AtomicBool::new(outage),
        }
    }

    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntitlementStore for FlakyEntitlements {
    async fn grant(&self, grant: EnrollmentGrant) -> Result<GrantOutcome> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(PaymentError::StoreError("entitlement store offline".to_string()));
        }
        self.inner.grant(grant).await
    }

    async fn entitlements(&self, user: &UserId) -> Result<UserEntitlements> {
        self.inner.entitlements(user).await
    }

    async fn enrollment_count(&self, course: &CourseId) -> Result<u64> {
        self.inner.enrollment_count(course).await
    }

    async fn is_granted(&self, payment: PaymentId) -> Result<bool> {
        self.inner.is_granted(payment).await
    }
}
