use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::domain::gateway_config::GatewayConfig;
use crate::domain::payment::amount_json;
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{
    check_init_response, currency_code, default_base_url, GatewayFactory, InitPaymentRequest,
    InitPaymentResponse, OperationResponse, PaymentDetails, VposGateway, SESSION_TIMEOUT_SECS,
};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Ameria vPOS 3.1 REST client.
pub struct AmeriaVposClient {
    pub client: reqwest::Client,
    pub base_url: String,
    pub client_id: String,
    pub username: String,
    pub password: SecretString,
    pub return_url: String,
    pub sandbox: bool,
    pub timeout_ms: u64,
}

impl AmeriaVposClient {
    pub fn from_config(
        config: &GatewayConfig,
        client: reqwest::Client,
        base_url_override: Option<&str>,
        timeout_ms: u64,
    ) -> Self {
        let base_url = base_url_override
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| default_base_url(config.test_mode).to_string());

        Self {
            client,
            base_url,
            client_id: config.client_id.clone(),
            username: config.username.clone(),
            password: SecretString::from(config.password.clone()),
            return_url: config.return_url.clone(),
            sandbox: config.test_mode,
            timeout_ms,
        }
    }

    async fn post_json<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> PaymentResult<T> {
        let url = format!("{}/api/VPOS/{}", self.base_url, endpoint);

        let resp = self
            .client
            .post(&url)
            .json(body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::GatewayTransport(format!(
                        "Ameria {endpoint} timed out after {}ms",
                        self.timeout_ms
                    ))
                } else {
                    PaymentError::GatewayTransport(format!("Ameria {endpoint} request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::error!(endpoint, status = status.as_u16(), "ameria returned non-success status");
            return Err(PaymentError::GatewayTransport(format!(
                "Ameria {endpoint} returned HTTP {}",
                status.as_u16()
            )));
        }

        resp.json::<T>().await.map_err(|e| {
            PaymentError::GatewayTransport(format!("Ameria {endpoint} returned an unreadable body: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl VposGateway for AmeriaVposClient {
    fn name(&self) -> &'static str {
        "ameria"
    }

    fn is_sandbox(&self) -> bool {
        self.sandbox
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn init_payment(&self, request: InitPaymentRequest) -> PaymentResult<InitPaymentResponse> {
        tracing::info!(
            order_id = request.order_id,
            amount = %request.amount,
            currency = %request.currency,
            sandbox = self.sandbox,
            "ameria init payment"
        );

        let body = json!({
            "ClientID": self.client_id,
            "Username": self.username,
            "Password": self.password.expose_secret(),
            "OrderID": request.order_id,
            "Amount": amount_json(request.amount),
            "Currency": currency_code(&request.currency),
            "BackURL": self.return_url,
            "Description": request.description.unwrap_or_default(),
            "Opaque": request.opaque.unwrap_or_else(|| request.order_id.to_string()),
            "Timeout": SESSION_TIMEOUT_SECS,
        });

        let response: InitPaymentResponse = self.post_json("InitPayment", &body).await?;
        let response = check_init_response(response).inspect_err(|err| {
            tracing::error!(order_id = request.order_id, error = %err, "ameria init payment rejected");
        })?;

        tracing::info!(
            order_id = request.order_id,
            payment_id = response.payment_id.as_deref().unwrap_or_default(),
            "ameria payment initialized"
        );
        Ok(response)
    }

    async fn get_payment_details(&self, payment_id: &str) -> PaymentResult<PaymentDetails> {
        // GetPaymentDetails does not take ClientID.
        let body = json!({
            "Username": self.username,
            "Password": self.password.expose_secret(),
            "PaymentID": payment_id,
        });

        let details: PaymentDetails = self.post_json("GetPaymentDetails", &body).await?;
        if details.response_code.as_deref() == Some("00") {
            tracing::info!(
                payment_id,
                payment_state = details.payment_state.as_deref().unwrap_or_default(),
                order_status = details.order_status.unwrap_or(-1),
                "ameria payment details retrieved"
            );
        } else {
            tracing::warn!(
                payment_id,
                response_code = details.response_code.as_deref().unwrap_or_default(),
                "ameria payment details returned error code"
            );
        }
        Ok(details)
    }

    async fn refund_payment(&self, payment_id: &str, amount: Option<Decimal>) -> PaymentResult<OperationResponse> {
        tracing::info!(payment_id, amount = ?amount, "ameria refund");

        let mut body = json!({
            "PaymentID": payment_id,
            "Username": self.username,
            "Password": self.password.expose_secret(),
        });
        if let Some(amount) = amount {
            body["Amount"] = amount_json(amount);
        }

        let response: OperationResponse = self.post_json("RefundPayment", &body).await?;
        response.check("refund_failed", "Refund failed")
    }

    async fn cancel_payment(&self, payment_id: &str) -> PaymentResult<OperationResponse> {
        tracing::info!(payment_id, "ameria cancel");

        let body = json!({
            "PaymentID": payment_id,
            "Username": self.username,
            "Password": self.password.expose_secret(),
        });

        let response: OperationResponse = self.post_json("CancelPayment", &body).await?;
        response.check("cancel_failed", "Payment cancellation failed")
    }
}

/// Builds a fresh [`AmeriaVposClient`] per call, sharing one connection pool.
#[derive(Clone)]
pub struct AmeriaGatewayFactory {
    pub client: reqwest::Client,
    pub base_url_override: Option<String>,
    pub timeout_ms: u64,
}

impl AmeriaGatewayFactory {
    pub fn new(base_url_override: Option<String>, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url_override,
            timeout_ms,
        }
    }
}

impl GatewayFactory for AmeriaGatewayFactory {
    fn build(&self, config: &GatewayConfig) -> PaymentResult<Arc<dyn VposGateway>> {
        let client: Arc<dyn VposGateway> = Arc::new(AmeriaVposClient::from_config(
            config,
            self.client.clone(),
            self.base_url_override.as_deref(),
            self.timeout_ms,
        ));
        Ok(client)
    }
}
