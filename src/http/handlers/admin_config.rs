use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::gateway_config::GatewayConfigPatch;
use crate::error::PaymentError;
use crate::service::config_service::PaymentConfigService;
use crate::AppState;

pub async fn get_config(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PaymentError> {
    let config = state.config_service.get().await?;
    Ok(Json(json!({ "config": config.map(|c| c.view()) })))
}

/// Checks the edit as it would look once merged over the stored values, then saves.
pub async fn save_config(
    State(state): State<AppState>,
    Json(patch): Json<GatewayConfigPatch>,
) -> Result<Json<serde_json::Value>, PaymentError> {
    let merged = state
        .config_service
        .get()
        .await?
        .map(|existing| existing.to_patch())
        .unwrap_or_default()
        .overlay(patch.clone());

    let errors = PaymentConfigService::validate(&merged);
    if !errors.is_empty() {
        return Err(PaymentError::validation_list(errors));
    }

    let saved = state.config_service.save(patch).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Configuration saved successfully",
        "config": saved.view(),
    })))
}

pub async fn validate_and_activate(State(state): State<AppState>) -> Result<Response, PaymentError> {
    let outcome = state.config_service.validate_and_activate().await?;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome)).into_response())
}

pub async fn deactivate(State(state): State<AppState>) -> Result<Json<serde_json::Value>, PaymentError> {
    let config = state.config_service.deactivate().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Payment system deactivated",
        "config": config.map(|c| c.view()),
    })))
}
