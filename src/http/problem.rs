use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::PaymentError;

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), detail = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), detail = %self, "request rejected");
        }

        let mut body = json!({
            "type": self.kind(),
            "title": self.title(),
            "status": status.as_u16(),
            "detail": self.detail(),
        });
        if !self.errors().is_empty() {
            body["errors"] = json!(self.errors());
        }
        if self.is_retryable() {
            body["retryable"] = json!(true);
        }

        (status, [(header::CONTENT_TYPE, "application/problem+json")], Json(body)).into_response()
    }
}
