use axum::http::StatusCode;
use thiserror::Error;

use crate::gateways::error_codes;

/// Failures surfaced by the payment subsystem.
///
/// Every variant maps to a `{type, title, status, detail}` problem body. Variants are
/// passed through unchanged by the service layer; only foreign errors (sqlx, serde,
/// anyhow) get wrapped into [`PaymentError::Internal`].
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Ameria Bank payment configuration not found. Please configure it in admin panel.")]
    ConfigMissing,

    #[error("Ameria Bank payment system is not active. Please activate it in admin panel.")]
    ConfigInactive,

    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },

    #[error("{0}")]
    InvalidCallback(String),

    #[error("Order with ID '{0}' not found")]
    OrderNotFound(String),

    #[error("Payment with ID '{0}' not found")]
    PaymentNotFound(String),

    #[error("{0}")]
    InvalidRefund(String),

    /// Network failure, timeout, non-2xx status or an undecodable body.
    #[error("{0}")]
    GatewayTransport(String),

    /// The bank answered and said no. `message` is the bank's own text.
    #[error("{message}")]
    GatewayApplication {
        kind: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Decryption(String),

    #[error("Payment '{0}' was modified concurrently, retry the request")]
    ConcurrentModification(String),

    #[error("{detail}")]
    Internal { kind: &'static str, detail: String },
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl PaymentError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            errors: vec![message.clone()],
            message,
        }
    }

    pub fn validation_list(errors: Vec<String>) -> Self {
        Self::Validation {
            message: errors.join(", "),
            errors,
        }
    }

    pub fn internal(kind: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Internal {
            kind,
            detail: detail.to_string(),
        }
    }

    /// Adapter for `map_err` on `anyhow` results: a `PaymentError` travelling inside
    /// the `anyhow::Error` comes back out untouched, anything else is tagged `kind`.
    pub fn wrap(kind: &'static str) -> impl Fn(anyhow::Error) -> PaymentError {
        move |err| match err.downcast::<PaymentError>() {
            Ok(original) => original,
            Err(other) => PaymentError::internal(kind, other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ConfigMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigInactive => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation { .. } | Self::InvalidCallback(_) | Self::InvalidRefund(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OrderNotFound(_) | Self::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            Self::GatewayTransport(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayApplication { .. } => StatusCode::BAD_REQUEST,
            Self::Decryption(_) | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
        }
    }

    /// Stable machine-readable type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "payment_config_missing",
            Self::ConfigInactive => "payment_system_inactive",
            Self::Validation { .. } => "validation_error",
            Self::InvalidCallback(_) => "invalid_callback",
            Self::OrderNotFound(_) => "order_not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::InvalidRefund(_) => "invalid_refund",
            Self::GatewayTransport(_) => "gateway_unreachable",
            Self::GatewayApplication { kind, .. } => *kind,
            Self::Decryption(_) => "decryption_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Internal { kind, .. } => *kind,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "Payment Configuration Missing",
            Self::ConfigInactive => "Payment System Inactive",
            Self::Validation { .. } => "Validation Error",
            Self::InvalidCallback(_) => "Invalid Callback",
            Self::OrderNotFound(_) => "Order Not Found",
            Self::PaymentNotFound(_) => "Payment Not Found",
            Self::InvalidRefund(_) => "Invalid Refund",
            Self::GatewayTransport(_) => "Payment Gateway Unreachable",
            Self::GatewayApplication { kind, .. } => match *kind {
                "payment_init_failed" => "Payment Initialization Failed",
                "refund_failed" => "Refund Failed",
                "cancel_failed" => "Payment Cancellation Failed",
                _ => "Payment Gateway Error",
            },
            Self::Decryption(_) => "Credential Decryption Failed",
            Self::ConcurrentModification(_) => "Concurrent Modification",
            Self::Internal { .. } => "Internal Server Error",
        }
    }

    pub fn detail(&self) -> String {
        self.to_string()
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Self::Validation { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Worth retrying unchanged: transport trouble, lost optimistic races and the
    /// bank's own transient codes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GatewayTransport(_) | Self::ConcurrentModification(_) => true,
            Self::GatewayApplication {
                code: Some(code), ..
            } => error_codes::is_retryable(code),
            _ => false,
        }
    }
}
