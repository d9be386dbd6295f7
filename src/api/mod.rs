//! HTTP surface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::admin::AdminStatusController;
use crate::reconciler::OrderReconciler;
use crate::store::PushRecipientStore;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<OrderReconciler>,
    pub admin: Arc<AdminStatusController>,
    pub push_recipients: Arc<dyn PushRecipientStore>,
    pub webhook_secret: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .route("/api/checkout-session", post(handlers::create_checkout_session))
        .route("/api/webhooks/payment", post(handlers::payment_webhook))
        .route("/api/checkout/cash-on-delivery", post(handlers::cash_on_delivery))
        .route("/api/orders", get(handlers::list_orders))
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/admin/order-status", post(handlers::update_order_status))
        .route("/api/push-tokens", post(handlers::register_push_token))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
