use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::callback::CallbackParams;
use crate::domain::payment::{CallbackResult, PaymentInitResult, RefundResult, VerifyResult};
use crate::error::PaymentError;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub payment_id: String,
    pub amount: Option<Decimal>,
}

pub async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializeRequest>,
) -> Result<Json<PaymentInitResult>, PaymentError> {
    state
        .payment_service
        .initialize_payment(req.order_id, req.amount, req.description)
        .await
        .map(Json)
}

/// Browser return leg. Always answers with a redirect to the storefront.
pub async fn callback_redirect(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let params = CallbackParams::from_pairs(&query);
    let storefront = state.storefront_url.trim_end_matches('/');

    if params.payment_id.is_none() || params.opaque.is_none() {
        tracing::warn!(query_keys = ?query.keys().collect::<Vec<_>>(), "callback redirect without PaymentID or Opaque");
        return checkout_error(storefront, "Invalid payment callback");
    }

    match state.payment_service.handle_callback(params).await {
        Ok(result) if result.success => {
            Redirect::to(&order_page(storefront, &result.order_id, &[("payment", "success")])).into_response()
        }
        Ok(result) => Redirect::to(&order_page(
            storefront,
            &result.order_id,
            &[("payment", "failed"), ("error", result.message.as_str())],
        ))
        .into_response(),
        Err(err) => {
            tracing::error!(kind = err.kind(), error = %err, "callback redirect processing failed");
            checkout_error(storefront, &err.detail())
        }
    }
}

/// Server-to-server notification; same protocol as the redirect, JSON answer.
pub async fn callback_webhook(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CallbackResult>, PaymentError> {
    let params = CallbackParams::from_json(&body);
    state.payment_service.handle_callback(params).await.map(Json)
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResult>, PaymentError> {
    if req.payment_id.trim().is_empty() {
        return Err(PaymentError::validation("Payment ID is required"));
    }
    state.payment_service.verify_payment(req.payment_id.trim()).await.map(Json)
}

pub async fn refund(
    State(state): State<AppState>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundResult>, PaymentError> {
    if req.payment_id.trim().is_empty() {
        return Err(PaymentError::validation("Payment ID is required"));
    }
    state
        .payment_service
        .refund_payment(req.payment_id.trim(), req.amount)
        .await
        .map(Json)
}

fn checkout_error(storefront: &str, message: &str) -> Response {
    Redirect::to(&format!("{storefront}/checkout?error={}", encode(message))).into_response()
}

/// `{storefront}/orders/{number}` with the number as a single encoded path segment.
fn order_page(storefront: &str, order_number: &str, query: &[(&str, &str)]) -> String {
    let Ok(mut url) = url::Url::parse(storefront) else {
        let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={}", encode(v))).collect();
        return format!("{storefront}/orders/{}?{}", encode(order_number), pairs.join("&"));
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("orders").push(order_number);
    }
    url.query_pairs_mut().extend_pairs(query);
    url.to_string()
}

fn encode(message: &str) -> String {
    url::form_urlencoded::byte_serialize(message.as_bytes()).collect()
}
