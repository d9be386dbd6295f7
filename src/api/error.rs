use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::aggregates::OrderError;
use crate::payment::webhook::VerificationError;
use crate::payment::GatewayError;
use crate::pricing::PricingError;
use crate::CheckoutError;

/// Error type for HTTP handlers.
///
/// Wraps [`CheckoutError`] and adds request-level variants. Every response
/// carries `{"error": message, "code": CODE}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::BadRequest(errors.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "An internal error occurred".to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::Checkout(err) => match err {
                CheckoutError::Pricing(PricingError::BelowMinimum { .. }) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "BELOW_MINIMUM", err.to_string())
                }
                CheckoutError::Pricing(_) | CheckoutError::InvalidEmail(_) | CheckoutError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                CheckoutError::AmountMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "AMOUNT_MISMATCH", err.to_string()),
                CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                CheckoutError::Transition(OrderError::UnknownStatus(_)) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                CheckoutError::Transition(OrderError::InvalidTransition { .. }) => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
                }
                CheckoutError::ConcurrentUpdate(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
                CheckoutError::Verification(VerificationError::MalformedPayload(e)) => {
                    tracing::warn!(error = %e, "Signed webhook payload could not be decoded");
                    (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD", err.to_string())
                }
                CheckoutError::Verification(e) => {
                    tracing::warn!(error = %e, "Webhook verification failed");
                    (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", err.to_string())
                }
                CheckoutError::Gateway(GatewayError::Timeout) => {
                    tracing::error!("Payment provider timed out");
                    (StatusCode::GATEWAY_TIMEOUT, "PAYMENT_PROVIDER_TIMEOUT", err.to_string())
                }
                CheckoutError::Gateway(GatewayError::Rejected(msg)) => {
                    tracing::error!(error = %msg, "Payment provider rejected session");
                    (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR", msg.clone())
                }
                CheckoutError::Gateway(e) => {
                    tracing::error!(error = %e, "Payment provider error");
                    (StatusCode::BAD_GATEWAY, "PAYMENT_PROVIDER_ERROR", "Payment provider unavailable".to_string())
                }
                CheckoutError::ProviderAmountMismatch { session_id } => {
                    tracing::error!(%session_id, "Integrity violation on provider callback");
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY_ERROR", err.to_string())
                }
                CheckoutError::Persistence(e) => {
                    tracing::error!(error = %e, "Persistence error");
                    internal()
                }
            },
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use crate::store::StoreError;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    async fn body_of(err: impl Into<ApiError>) -> serde_json::Value {
        let response = err.into().into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn client_errors_are_4xx() {
        let mismatch = CheckoutError::AmountMismatch { declared: Money::new(22000), expected: Money::new(22560) };
        assert_eq!(status_of(mismatch), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(CheckoutError::Pricing(PricingError::EmptyCart)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CheckoutError::OrderNotFound(uuid::Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ApiError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backend_errors_are_sanitised() {
        assert_eq!(
            status_of(CheckoutError::from(StoreError::Backend("password=hunter2".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(CheckoutError::Gateway(GatewayError::Timeout)), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn undecodable_signed_payload_has_its_own_code() {
        let malformed = || CheckoutError::Verification(VerificationError::MalformedPayload("expected value".into()));
        assert_eq!(status_of(malformed()), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(malformed()).await["code"], "MALFORMED_PAYLOAD");
        assert_eq!(body_of(CheckoutError::Verification(VerificationError::SignatureMismatch)).await["code"], "INVALID_SIGNATURE");
    }
}
