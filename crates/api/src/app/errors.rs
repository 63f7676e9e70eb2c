use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fieldhand_auth::{AuthError, StoreError};
use fieldhand_core::DomainError;

/// Map an engine error to its HTTP response.
///
/// `Forbidden` stays opaque; `MembershipInactive` and `AssignmentDenied` carry
/// their user-facing explanation. Store failures are logged and reported as a
/// generic 500.
pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    match err {
        AuthError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "unauthenticated" })),
        )
            .into_response(),
        AuthError::MembershipInactive { reason, .. } => (
            StatusCode::FORBIDDEN,
            axum::Json(json!({
                "error": "membership_inactive",
                "reason": reason,
                "message": reason.message(),
            })),
        )
            .into_response(),
        AuthError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "missing capability"),
        AuthError::AssignmentDenied(denial) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "assignment_denied", denial.message())
        }
        AuthError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        AuthError::Domain(e) => domain_error_to_response(e),
        AuthError::Store(e) => store_error_to_response(e),
    }
}

fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Validation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Missing(_) => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path id, answering 400 on garbage.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}
