use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::services::{ErrorKind, ServiceError};

// ============================================================================
// API Errors
// ============================================================================
//
// Every failure leaves the API as `{ "success": false, "message": ... }`.
// Internal errors are logged here with their detail and answered with a
// generic message.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::State => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Service(e) => {
                if e.kind() == ErrorKind::Internal {
                    tracing::error!(error = %e, "Request failed with an internal error");
                }
                e.public_message()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            message,
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderError;
    use crate::event_sourcing::StoreError;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(ServiceError::OrderNotFound(id)).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ServiceError::from(OrderError::NothingToCancel)).status_code(),
            StatusCode::BAD_REQUEST
        );
        let conflict = StoreError::ConcurrencyConflict { aggregate_id: id, expected: 2, actual: 3 };
        assert_eq!(ApiError::from(ServiceError::from(conflict)).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ServiceError::Internal("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
