use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub const ADMIN_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Guards the admin routes. An empty configured key locks them entirely.
pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if expected.is_empty() || provided != expected {
        tracing::warn!(
            security_event = true,
            path = %request.uri().path(),
            key_present = !provided.is_empty(),
            "admin request rejected"
        );
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(json!({
                "type": "unauthorized",
                "title": "Unauthorized",
                "status": 401,
                "detail": format!("missing or invalid {ADMIN_KEY_HEADER} header"),
            })),
        )
            .into_response();
    }

    next.run(request).await
}
