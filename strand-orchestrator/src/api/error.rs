//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::AnalysisError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    StoreError(StoreError),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                "Internal server error".to_string()
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NotFound(id) => ApiError::NotFound(format!("Analysis {} not found", id)),
            AnalysisError::SampleNotFound(id) => {
                ApiError::NotFound(format!("Sample {} not found", id))
            }
            AnalysisError::Validation(msg) => ApiError::BadRequest(msg),
            AnalysisError::InvalidTransition(err) => ApiError::InternalError(err.to_string()),
            AnalysisError::Store(err) => ApiError::StoreError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_status_mapping() {
        let not_found = ApiError::from(AnalysisError::NotFound(Uuid::new_v4()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let missing_sample = ApiError::from(AnalysisError::SampleNotFound(Uuid::new_v4()));
        assert_eq!(missing_sample.status(), StatusCode::NOT_FOUND);

        let invalid = ApiError::from(AnalysisError::Validation("bad".to_string()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let store = ApiError::from(AnalysisError::Store(StoreError::Missing(Uuid::new_v4())));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            store.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
