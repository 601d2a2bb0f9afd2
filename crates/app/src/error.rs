//! Unified error handling for the app server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::shopify::ShopifyError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// The commerce platform returned a failure (status and body carried by
    /// the inner error) or could not be reached.
    #[error("External call failed: {0}")]
    ExternalCallFailed(#[from] ShopifyError),

    /// Account, list or selection absent when required.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid token, or a request signature that did not verify.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A webhook could not be mapped to a known account.
    #[error("Unresolvable: {0}")]
    Unresolvable(String),

    /// Malformed input from a client or webhook sender.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable code, used as the `reason` on the failure page.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Database(_) | Self::Internal(_) => "internal",
            Self::ExternalCallFailed(_) => "external_call_failed",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unresolvable(_) => "unresolvable",
            Self::BadRequest(_) => "bad_request",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ExternalCallFailed(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) | Self::Unresolvable(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Send server-side failures to Sentry; log everything else at warn.
    pub fn report(&self) {
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::ExternalCallFailed(_)
        ) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::ExternalCallFailed(_) => "External service error".to_string(),
            _ => self.to_string(),
        };

        (self.status(), message).into_response()
    }
}

/// Tag the current Sentry scope with the shop being served.
pub fn set_sentry_shop(shop: &str) {
    sentry::configure_scope(|scope| {
        scope.set_tag("shop", shop);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("account cool-store.myshopify.com".to_string());
        assert_eq!(err.to_string(), "Not found: account cool-store.myshopify.com");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unresolvable("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::ExternalCallFailed(ShopifyError::Api {
                status: 500,
                body: String::new(),
            })),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_reasons() {
        assert_eq!(
            AppError::ExternalCallFailed(ShopifyError::RateLimited(2)).reason(),
            "external_call_failed"
        );
        assert_eq!(AppError::NotFound(String::new()).reason(), "not_found");
        assert_eq!(
            AppError::Database(RepositoryError::NotFound).reason(),
            "internal"
        );
    }
}
