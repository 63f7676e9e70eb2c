use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::app::{dto::AssignmentCheckRequest, errors, AppState};
use crate::context::Ctx;

/// POST /assignments/check - may the caller delegate to `target_member_id`?
///
/// A refusal is a 200 with `allowed: false` and a readable reason.
pub async fn check(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Json(body): Json<AssignmentCheckRequest>,
) -> Response {
    match state.engine().can_assign(&ctx, body.target_member_id).await {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
