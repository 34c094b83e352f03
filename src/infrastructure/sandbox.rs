use crate::domain::gateway::{
    GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus, GatewayRefund,
    OrderRequest, PaymentGateway, RefundCall,
};
use crate::domain::payment::PaymentMethod;
use crate::domain::signature::GatewaySecret;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// What the customer's browser receives after paying on the hosted checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutConfirmation {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Default)]
struct SandboxState {
    orders: HashMap<String, GatewayOrder>,
    payments: HashMap<String, GatewayPayment>,
    refunded: HashMap<String, i64>,
}

/// An in-process stand-in for the payment gateway.
///
/// Ids are sequential (`order_1`, `pay_1`, `rfnd_1`) so runs are reproducible. Checkout
/// confirmations are signed with the same secret the verification engine is given.
#[derive(Clone)]
pub struct SandboxGateway {
    secret: GatewaySecret,
    state: Arc<Mutex<SandboxState>>,
    next_order: Arc<AtomicU64>,
    next_payment: Arc<AtomicU64>,
    next_refund: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
    refunds_enabled: Arc<AtomicBool>,
}

impl SandboxGateway {
    pub fn new(secret: GatewaySecret) -> Self {
        Self {
            secret,
            state: Arc::new(Mutex::new(SandboxState::default())),
            next_order: Arc::new(AtomicU64::new(1)),
            next_payment: Arc::new(AtomicU64::new(1)),
            next_refund: Arc::new(AtomicU64::new(1)),
            available: Arc::new(AtomicBool::new(true)),
            refunds_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates an outage: every call fails with a timeout until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes refund calls be rejected by the gateway while everything else keeps working.
    pub fn set_refunds_enabled(&self, enabled: bool) {
        self.refunds_enabled.store(enabled, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), GatewayError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Timeout)
        }
    }

    /// Pays an open order in full and returns the signed confirmation.
    pub async fn checkout(
        &self,
        order_id: &str,
        method: PaymentMethod,
    ) -> Result<CheckoutConfirmation, GatewayError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))?;
        if order.status != "created" {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("order {} is already {}", order_id, order.status),
            });
        }
        order.status = "paid".to_string();

        let payment_id = format!("pay_{}", self.next_payment.fetch_add(1, Ordering::SeqCst));
        let payment = GatewayPayment {
            id: payment_id.clone(),
            order_id: Some(order_id.to_string()),
            amount: order.amount,
            currency: order.currency,
            method,
            status: GatewayPaymentStatus::Captured,
        };
        state.payments.insert(payment_id.clone(), payment);

        Ok(CheckoutConfirmation {
            order_id: order_id.to_string(),
            signature: self.secret.sign(order_id, &payment_id),
            payment_id,
        })
    }

    /// Overrides the status the gateway reports for a payment.
    pub async fn set_payment_status(&self, payment_id: &str, status: GatewayPaymentStatus) {
        let mut state = self.state.lock().await;
        if let Some(payment) = state.payments.get_mut(payment_id) {
            payment.status = status;
        }
    }

    /// Registers a payment the gateway knows about, regardless of any order.
    pub async fn insert_payment(&self, payment: GatewayPayment) {
        let mut state = self.state.lock().await;
        state.payments.insert(payment.id.clone(), payment);
    }

    pub fn orders_created(&self) -> u64 {
        self.next_order.load(Ordering::SeqCst) - 1
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError> {
        self.ensure_available()?;
        let id = format!("order_{}", self.next_order.fetch_add(1, Ordering::SeqCst));
        let order = GatewayOrder {
            id: id.clone(),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".to_string(),
        };
        self.state.lock().await.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        state
            .payments
            .get(payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(payment_id.to_string()))
    }

    async fn create_refund(&self, request: RefundCall) -> Result<GatewayRefund, GatewayError> {
        self.ensure_available()?;
        if !self.refunds_enabled.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "refunds are disabled for this account".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let payment = state
            .payments
            .get(&request.gateway_payment_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(request.gateway_payment_id.clone()))?;
        if !payment.status.is_captured() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("payment is {}", payment.status.as_str()),
            });
        }

        let already = state
            .refunded
            .get(&request.gateway_payment_id)
            .copied()
            .unwrap_or(0);
        if already + request.amount.minor() > payment.amount.minor() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "refund amount exceeds captured amount".to_string(),
            });
        }
        state
            .refunded
            .insert(request.gateway_payment_id.clone(), already + request.amount.minor());
        if already + request.amount.minor() == payment.amount.minor()
            && let Some(p) = state.payments.get_mut(&request.gateway_payment_id)
        {
            p.status = GatewayPaymentStatus::Refunded;
        }

        Ok(GatewayRefund {
            id: format!("rfnd_{}", self.next_refund.fetch_add(1, Ordering::SeqCst)),
            amount: request.amount,
        })
    }
}
