//! API Errors
//!
//! Every failure leaves the server as `{ "error": ..., "code": ... }`.

use assistant_core::AssistantError;
use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use market_alerts::AlertError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    /// Body could not be decoded into the expected payload
    #[error("{0}")]
    Body(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

fn classify(err: &AssistantError) -> (StatusCode, &'static str) {
    use AssistantError as E;

    match err {
        E::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        E::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        E::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        E::ContentRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, "CONTENT_REJECTED"),
        E::ProviderConfig(_) => (StatusCode::BAD_REQUEST, "PROVIDER_CONFIG"),
        E::ProviderAuth(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_AUTH"),
        E::ProviderQuotaExceeded(_) => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED"),
        E::ProviderUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE"),
        E::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROVIDER_ERROR"),
        E::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Assistant(err) | ApiError::Alert(AlertError::Store(err)) => classify(err),
            ApiError::Alert(AlertError::Config(_) | AlertError::UnsupportedAsset(_)) => {
                (StatusCode::BAD_REQUEST, "MARKET_DATA_CONFIG")
            }
            ApiError::Alert(AlertError::Unavailable(_) | AlertError::Network(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "MARKET_DATA_UNAVAILABLE")
            }
            ApiError::Alert(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ALERT_ERROR"),
            ApiError::Body(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        }
    }

    fn user_message(&self) -> String {
        match self {
            ApiError::Assistant(err) | ApiError::Alert(AlertError::Store(err)) => {
                err.user_message()
            }
            ApiError::Alert(err) => err.user_message(),
            ApiError::Body(msg) => format!("Invalid request: {msg}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.user_message(),
            code: code.into(),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AssistantError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AssistantError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AssistantError::NotFound("Thread".into()), StatusCode::NOT_FOUND),
            (AssistantError::ContentRejected("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AssistantError::ProviderConfig("x".into()), StatusCode::BAD_REQUEST),
            (AssistantError::ProviderAuth("x".into()), StatusCode::BAD_GATEWAY),
            (AssistantError::ProviderQuotaExceeded("x".into()), StatusCode::TOO_MANY_REQUESTS),
            (AssistantError::ProviderUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AssistantError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_and_code().0, expected);
        }
    }

    #[test]
    fn test_alert_store_errors_map_like_core_errors() {
        let err = ApiError::from(AlertError::Store(AssistantError::NotFound("Alert".into())));
        assert_eq!(err.status_and_code(), (StatusCode::NOT_FOUND, "NOT_FOUND"));

        let err = ApiError::from(AlertError::Config("TradingView API key not found".into()));
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);
    }
}
