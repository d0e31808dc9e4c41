use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tutorhub_shared::DomainError;
use tutorhub_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Domain(domain) => ServerError::Domain(domain),
            other => ServerError::Store(other),
        }
    }
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Domain(e) => match e {
                DomainError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                DomainError::Forbidden(_) | DomainError::NotVerified => StatusCode::FORBIDDEN,
                DomainError::Conflict(_)
                | DomainError::AlreadyAccepted
                | DomainError::NotEditable => StatusCode::CONFLICT,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Store(_) | ServerError::BlobStorage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Domain(DomainError::Forbidden(reason)) => {
                tracing::warn!(reason = %reason, "Authorization denied");
                self.to_string()
            }
            ServerError::Domain(DomainError::AlreadyAccepted) => {
                "This action is no longer available".to_string()
            }
            ServerError::Store(_) | ServerError::BlobStorage(_) | ServerError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (DomainError::validation("x"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::forbidden("x"), StatusCode::FORBIDDEN),
            (DomainError::NotVerified, StatusCode::FORBIDDEN),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::AlreadyAccepted, StatusCode::CONFLICT),
            (DomainError::NotEditable, StatusCode::CONFLICT),
            (DomainError::NotFound("offering"), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(ServerError::from(error).into_response().status(), status);
        }
    }

    #[test]
    fn store_errors_unwrap_domain_failures() {
        let err = ServerError::from(StoreError::Domain(DomainError::NotEditable));
        assert!(matches!(err, ServerError::Domain(DomainError::NotEditable)));

        let err = ServerError::from(StoreError::Migration("boom".into()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
