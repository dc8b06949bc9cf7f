pub mod auth;
pub mod challenges;
pub mod devices;
pub mod health;
pub mod types;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use tracing::error;

use crate::error::AuthError;

/// Render a business failure as a `{success: false, error}` body.
///
/// Infrastructure faults are logged with their detail so an outage never
/// hides behind the generic user-facing message.
pub(crate) fn error_response(err: &AuthError) -> Response {
    if let AuthError::Infrastructure(inner) = err {
        error!("infrastructure failure: {inner:#}");
    }
    (
        err.status(),
        Json(json!({
            "success": false,
            "error": err.public_message(),
        })),
    )
        .into_response()
}

pub(crate) fn missing_payload() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": "missing payload",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_sets_status_and_body() {
        let response = error_response(&AuthError::Conflict("username already taken"));
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = error_response(&AuthError::Expired);
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[test]
    fn missing_payload_is_bad_request() {
        assert_eq!(missing_payload().status(), StatusCode::BAD_REQUEST);
    }
}
