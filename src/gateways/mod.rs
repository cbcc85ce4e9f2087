use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::gateway_config::GatewayConfig;
use crate::error::{PaymentError, PaymentResult};

pub mod ameria;
pub mod error_codes;
pub mod mock;

pub const SANDBOX_BASE_URL: &str = "https://servicestest.ameriabank.am/VPOS";
pub const PRODUCTION_BASE_URL: &str = "https://services.ameriabank.am/VPOS";

/// Seconds the bank keeps a payment session open (its documented maximum).
pub const SESSION_TIMEOUT_SECS: u32 = 1200;

const SUCCESSFUL_STATE: &str = "Successful";
const ORDER_STATUS_DEPOSITED: i64 = 2;

pub fn default_base_url(sandbox: bool) -> &'static str {
    if sandbox {
        SANDBOX_BASE_URL
    } else {
        PRODUCTION_BASE_URL
    }
}

/// ISO 4217 numeric code as the bank expects it. Unknown currencies fall back to AMD.
pub fn currency_code(currency: &str) -> &'static str {
    match currency.trim().to_ascii_uppercase().as_str() {
        "AMD" => "051",
        "EUR" => "978",
        "USD" => "840",
        "RUB" => "643",
        "SEK" => "752",
        "GBP" => "826",
        _ => "051",
    }
}

/// Languages the hosted payment page offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentLanguage {
    #[default]
    En,
    Am,
    Ru,
}

impl PaymentLanguage {
    /// Shop language codes (`hy` for Armenian) to the bank's codes; anything else is English.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "hy" | "am" => Self::Am,
            "ru" => Self::Ru,
            _ => Self::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Am => "am",
            Self::Ru => "ru",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitPaymentRequest {
    pub order_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    /// Echoed back by the bank; defaults to the order id.
    pub opaque: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitPaymentResponse {
    #[serde(rename = "PaymentID", default, deserialize_with = "lenient_string")]
    pub payment_id: Option<String>,
    #[serde(rename = "ResponseCode", default, deserialize_with = "lenient_string")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseMessage", default, deserialize_with = "lenient_string")]
    pub response_message: Option<String>,
}

impl InitPaymentResponse {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `GetPaymentDetails` answer. Fields the bank adds later survive in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    #[serde(rename = "ResponseCode", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(rename = "PaymentState", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub payment_state: Option<String>,
    #[serde(rename = "OrderStatus", default, deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub order_status: Option<i64>,
    #[serde(
        rename = "Amount",
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    #[serde(
        rename = "ApprovedAmount",
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub approved_amount: Option<Decimal>,
    #[serde(
        rename = "DepositedAmount",
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub deposited_amount: Option<Decimal>,
    #[serde(
        rename = "RefundedAmount",
        default,
        deserialize_with = "lenient_decimal",
        serialize_with = "rust_decimal::serde::float_option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub refunded_amount: Option<Decimal>,
    #[serde(rename = "Currency", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(rename = "OrderID", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(rename = "PaymentID", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(rename = "Opaque", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub opaque: Option<String>,
    #[serde(rename = "CardNumber", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(rename = "ResponseMessage", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    #[serde(rename = "RespCode", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub resp_code: Option<String>,
    #[serde(rename = "RespMessage", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub resp_message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl PaymentDetails {
    /// The bank considers the money taken only when all three agree.
    pub fn is_successful(&self) -> bool {
        self.response_code.as_deref() == Some("00")
            && self.payment_state.as_deref() == Some(SUCCESSFUL_STATE)
            && self.order_status == Some(ORDER_STATUS_DEPOSITED)
    }

    pub fn failure_code(&self) -> String {
        self.response_code
            .clone()
            .or_else(|| self.resp_code.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }

    /// The bank's own text, else the code table in the shopper's language.
    pub fn failure_message(&self, lang: PaymentLanguage) -> String {
        self.resp_message
            .clone()
            .or_else(|| self.response_message.clone())
            .or_else(|| {
                self.response_code
                    .as_deref()
                    .filter(|c| *c != "00")
                    .or(self.resp_code.as_deref())
                    .map(|c| error_codes::describe(c, lang))
            })
            .unwrap_or_else(|| "Payment failed".to_string())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Answer to `RefundPayment` and `CancelPayment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(rename = "ResponseCode", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseMessage", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    #[serde(rename = "PaymentID", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(rename = "RespCode", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub resp_code: Option<String>,
    #[serde(rename = "RespMessage", default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub resp_message: Option<String>,
}

impl OperationResponse {
    /// Success iff `ResponseCode == "00"`; otherwise the bank's own message, then the
    /// code table, then `fallback`. Refund and cancel are admin operations, so the
    /// table is read in English.
    pub fn check(self, kind: &'static str, fallback: &str) -> PaymentResult<Self> {
        if self.response_code.as_deref() == Some("00") {
            return Ok(self);
        }

        let code = self.response_code.clone().or_else(|| self.resp_code.clone());
        let message = self
            .response_message
            .clone()
            .or_else(|| self.resp_message.clone())
            .or_else(|| code.as_deref().map(|c| error_codes::describe(c, PaymentLanguage::En)))
            .unwrap_or_else(|| fallback.to_string());

        Err(PaymentError::GatewayApplication { kind, code, message })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Accepts `InitPayment` only when `ResponseCode == 1`, `ResponseMessage == "OK"` and a
/// `PaymentID` came back.
pub fn check_init_response(response: InitPaymentResponse) -> PaymentResult<InitPaymentResponse> {
    let code_ok = response.response_code.as_deref() == Some("1");
    let message_ok = response.response_message.as_deref() == Some("OK");
    let has_id = response.payment_id.as_deref().is_some_and(|id| !id.trim().is_empty());

    if code_ok && message_ok && has_id {
        return Ok(response);
    }

    let code = response.response_code.clone();
    let message = match response.response_message.as_deref() {
        Some(msg) if !msg.is_empty() && !message_ok => msg.to_string(),
        _ if code_ok && message_ok => "Payment initialization returned no PaymentID".to_string(),
        _ => format!(
            "Payment initialization failed (ResponseCode: {})",
            code.as_deref().unwrap_or("none")
        ),
    };

    Err(PaymentError::GatewayApplication {
        kind: "payment_init_failed",
        code,
        message,
    })
}

/// `{base}/Payments/Pay?id=<id>&lang=<lang>`.
pub fn build_payment_url(base_url: &str, payment_id: &str, lang: PaymentLanguage) -> PaymentResult<String> {
    let payment_id = payment_id.trim();
    if payment_id.is_empty() {
        return Err(PaymentError::validation("PaymentID is required to generate payment URL"));
    }

    let mut url = url::Url::parse(&format!("{}/Payments/Pay", base_url.trim_end_matches('/')))
        .map_err(|e| PaymentError::internal("payment_url_error", e))?;
    url.query_pairs_mut()
        .append_pair("id", payment_id)
        .append_pair("lang", lang.as_str());
    Ok(url.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
}

#[async_trait::async_trait]
pub trait VposGateway: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_sandbox(&self) -> bool;

    fn base_url(&self) -> &str;

    async fn init_payment(&self, request: InitPaymentRequest) -> PaymentResult<InitPaymentResponse>;

    /// Non-`"00"` answers are returned, not raised; the caller decides.
    async fn get_payment_details(&self, payment_id: &str) -> PaymentResult<PaymentDetails>;

    /// `None` refunds the full amount.
    async fn refund_payment(&self, payment_id: &str, amount: Option<Decimal>) -> PaymentResult<OperationResponse>;

    async fn cancel_payment(&self, payment_id: &str) -> PaymentResult<OperationResponse>;

    fn payment_url(&self, payment_id: &str, lang: PaymentLanguage) -> PaymentResult<String> {
        build_payment_url(self.base_url(), payment_id, lang)
    }

    /// Registers a throwaway payment to prove the credentials work.
    async fn test_connection(&self) -> ConnectionCheck {
        let order_id = Utc::now().timestamp_millis().rem_euclid(1_000_000_000).max(1);
        let amount = if self.is_sandbox() { Decimal::from(10) } else { Decimal::ONE };

        let request = InitPaymentRequest {
            order_id,
            amount,
            currency: crate::domain::gateway_config::DEFAULT_CURRENCY.to_string(),
            description: Some("Connection test".to_string()),
            opaque: Some(order_id.to_string()),
        };

        match self.init_payment(request).await {
            Ok(_) => ConnectionCheck {
                success: true,
                message: "Connection successful. Credentials are valid.".to_string(),
            },
            Err(err) => {
                tracing::warn!(gateway = self.name(), error = %err, "connection test failed");
                ConnectionCheck {
                    success: false,
                    message: err.detail(),
                }
            }
        }
    }
}

/// Builds a client for the configuration in force at call time.
pub trait GatewayFactory: Send + Sync {
    fn build(&self, config: &GatewayConfig) -> PaymentResult<Arc<dyn VposGateway>>;
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The bank is loose about types: codes arrive as `1` or `"00"`, ids as numbers or strings.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(scalar_to_string))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Ok(None),
    };
    Ok(Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok())
}
