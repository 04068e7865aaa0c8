use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::StoreError;

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::PaymentVerification(_) => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage details stay in the logs.
        let message = match &self {
            Self::Storage(detail) => {
                tracing::error!(error = %detail, "storage failure");
                "internal error".to_string()
            }
            Self::Gateway(detail) => {
                tracing::error!(error = %detail, "payment gateway failure");
                self.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": self.kind(), "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StoreError::not_found("pizza 1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(StoreError::InvalidTransition("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(StoreError::PaymentVerification("x".into()).status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(StoreError::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_storage_detail_hidden() {
        let response = StoreError::Storage("connection refused on 10.0.0.5".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "storage");
        assert_eq!(body["message"], "internal error");
    }
}
