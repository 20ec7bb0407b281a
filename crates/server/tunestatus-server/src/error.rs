//! HTTP mapping of account linking failures

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;
use tunestatus_oauth2::LinkError;

/// A [`LinkError`] on its way out as an HTTP response.
///
/// The body only ever carries the error code, the attributable provider and a
/// fixed message; upstream bodies and store errors stay in the log.
#[derive(Debug)]
pub struct ApiError(pub LinkError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LinkError::InvalidCredentialCarrier => StatusCode::BAD_REQUEST,
            LinkError::StateMismatch => StatusCode::FORBIDDEN,
            LinkError::AuthorizationExchangeFailed { .. } => StatusCode::BAD_GATEWAY,
            LinkError::ProviderAuthBadRequest { .. } => StatusCode::BAD_GATEWAY,
            LinkError::PersistenceFailure(_)
            | LinkError::EntropyUnavailable(_)
            | LinkError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match &self.0 {
            LinkError::InvalidCredentialCarrier => {
                "Your sign-in session is missing or has expired. Please start again from Slack."
            }
            LinkError::StateMismatch => "The authorization response could not be verified.",
            LinkError::AuthorizationExchangeFailed { .. } => {
                "The provider did not accept the authorization."
            }
            LinkError::ProviderAuthBadRequest { .. } => {
                "The provider returned an unexpected authorization response."
            }
            LinkError::PersistenceFailure(_) => "Your accounts could not be saved. Please try again.",
            LinkError::EntropyUnavailable(_) | LinkError::Internal(_) => "Internal server error",
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Account linking failed");
        }

        let body = json!({
            "error": {
                "code": self.0.code(),
                "provider": self.0.provider(),
                "message": self.message(),
            }
        });

        (status, Json(body)).into_response()
    }
}
