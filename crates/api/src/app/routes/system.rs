use axum::{http::StatusCode, Json};

use crate::app::dto::MeResponse;
use crate::context::{Authenticated, Ctx};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /me - the caller's identity and resolved context.
pub async fn me(Authenticated(identity): Authenticated, Ctx(context): Ctx) -> Json<MeResponse> {
    Json(MeResponse { identity, context })
}
