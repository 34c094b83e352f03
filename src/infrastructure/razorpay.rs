use crate::domain::gateway::{
    GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus, GatewayRefund,
    OrderRequest, PaymentGateway, RefundCall,
};
use crate::domain::money::{Amount, Currency};
use crate::domain::payment::PaymentMethod;
use crate::domain::signature::GatewaySecret;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";

/// Credentials and transport settings for the Razorpay API.
#[derive(Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl RazorpayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Razorpay signs checkout callbacks with the API key secret.
    pub fn signing_secret(&self) -> GatewaySecret {
        GatewaySecret::new(self.key_secret.clone())
    }

    fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

impl fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"***")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    id: String,
    order_id: Option<String>,
    amount: i64,
    currency: String,
    method: Option<PaymentMethod>,
    status: GatewayPaymentStatus,
}

#[derive(Debug, Deserialize)]
struct RefundBody {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    description: Option<String>,
}

fn amount_of(minor: i64) -> Result<Amount, GatewayError> {
    Amount::new(minor).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

fn currency_of(code: &str) -> Result<Currency, GatewayError> {
    code.parse()
        .map_err(|e: crate::error::PaymentError| GatewayError::InvalidResponse(e.to_string()))
}

impl TryFrom<OrderBody> for GatewayOrder {
    type Error = GatewayError;

    fn try_from(body: OrderBody) -> Result<Self, Self::Error> {
        Ok(Self {
            id: body.id,
            amount: amount_of(body.amount)?,
            currency: currency_of(&body.currency)?,
            receipt: body.receipt,
            status: body.status,
        })
    }
}

impl TryFrom<PaymentBody> for GatewayPayment {
    type Error = GatewayError;

    fn try_from(body: PaymentBody) -> Result<Self, Self::Error> {
        Ok(Self {
            id: body.id,
            order_id: body.order_id,
            amount: amount_of(body.amount)?,
            currency: currency_of(&body.currency)?,
            method: body.method.unwrap_or(PaymentMethod::Other),
            status: body.status,
        })
    }
}

/// HTTP client for the Razorpay orders, payments and refunds endpoints.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: RazorpayConfig,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured(
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET are required".to_string(),
            ));
        }

        let response = request
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.error.description)
            .unwrap_or(body);
        if status == StatusCode::NOT_FOUND {
            Err(GatewayError::NotFound(message))
        } else {
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let body = json!({
            "amount": request.amount.minor(),
            "currency": request.currency.code(),
            "receipt": request.receipt,
            "notes": request.notes,
        });
        let order: OrderBody = self
            .send(self.client.post(self.url("/v1/orders")).json(&body))
            .await?;
        order.try_into()
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let order: OrderBody = self
            .send(self.client.get(self.url(&format!("/v1/orders/{}", order_id))))
            .await?;
        order.try_into()
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let payment: PaymentBody = self
            .send(self.client.get(self.url(&format!("/v1/payments/{}", payment_id))))
            .await?;
        payment.try_into()
    }

    async fn create_refund(&self, request: RefundCall) -> Result<GatewayRefund, GatewayError> {
        let body = json!({
            "amount": request.amount.minor(),
            "notes": request.notes,
        });
        let path = format!("/v1/payments/{}/refund", request.gateway_payment_id);
        let refund: RefundBody = self
            .send(self.client.post(self.url(&path)).json(&body))
            .await?;
        Ok(GatewayRefund {
            id: refund.id,
            amount: amount_of(refund.amount)?,
        })
    }
}
