use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROVIDER: &str = "ameria";
pub const METHOD_CARD: &str = "card";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            "partially_refunded" => Some(Self::PartiallyRefunded),
            _ => None,
        }
    }

    /// Still waiting on the bank. At most one open payment per order and provider.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
                | (Completed, PartiallyRefunded)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub method: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub provider_transaction_id: Option<String>,
    pub provider_order_id: Option<i64>,
    pub provider_response: Option<serde_json::Value>,
    pub card_last4: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by every write.
    pub version: i64,
}

/// The slice of the shop's order this subsystem reads and writes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub id: Uuid,
    pub number: String,
    pub status: String,
    pub payment_status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
}

impl OrderRef {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: number.into(),
            status: "pending".to_string(),
            payment_status: "pending".to_string(),
            paid_at: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
}

impl OrderEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentInitiated => "payment_initiated",
            Self::PaymentCompleted => "payment_completed",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentRefunded => "payment_refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderEvent {
    pub order_id: Uuid,
    pub event_type: OrderEventType,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Everything written once the bank accepted `InitPayment`.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    /// A pending row for the order that gets promoted instead of inserting.
    pub existing: Option<(Uuid, i64)>,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub provider_order_id: i64,
    pub transaction_id: String,
    pub provider_response: serde_json::Value,
    pub event: NewOrderEvent,
}

#[derive(Debug, Clone)]
pub struct OrderPaymentUpdate {
    pub order_id: Uuid,
    pub payment_status: String,
    /// `None` leaves the order status untouched.
    pub status: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A payment row rewrite plus the order/event side effects that must land with it.
/// `payment.version` is the version the caller read.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub order_update: Option<OrderPaymentUpdate>,
    pub event: Option<NewOrderEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResult {
    pub payment_id: String,
    pub payment_url: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResult {
    pub success: bool,
    pub order_id: String,
    pub payment_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub status: PaymentStatus,
    pub order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResult {
    pub success: bool,
    pub message: String,
}

/// JSON number for an amount: integral amounts stay integers on the wire.
pub fn amount_json(amount: Decimal) -> serde_json::Value {
    if amount.fract().is_zero() {
        if let Some(whole) = amount.to_i64() {
            return serde_json::Value::from(whole);
        }
    }
    amount
        .to_f64()
        .map(serde_json::Value::from)
        .unwrap_or(serde_json::Value::Null)
}
