use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::http::handlers::{admin_config, ops, payments};
use crate::http::middleware::admin_auth;
use crate::AppState;

pub fn router(state: AppState, admin_key: String) -> Router {
    let admin_routes = Router::new()
        .route("/admin/payments/refund", post(payments::refund))
        .route(
            "/admin/payments/config",
            get(admin_config::get_config).post(admin_config::save_config),
        )
        .route("/admin/payments/validate", post(admin_config::validate_and_activate))
        .route("/admin/payments/deactivate", post(admin_config::deactivate))
        .layer(from_fn_with_state(admin_key, admin_auth::require_internal_api_key));

    Router::new()
        .route("/health", get(ops::health))
        .route("/ops/readiness", get(ops::readiness))
        .route("/payments/ameria/initialize", post(payments::initialize))
        .route(
            "/payments/ameria/callback",
            get(payments::callback_redirect).post(payments::callback_webhook),
        )
        .route("/payments/ameria/verify", post(payments::verify))
        .merge(admin_routes)
        .with_state(state)
}
