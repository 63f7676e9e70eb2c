use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use fieldhand_auth::{NewRole, RolePatch};
use fieldhand_core::RoleId;

use crate::app::{errors, AppState};
use crate::context::Ctx;

/// GET /roles - the Owner role followed by the tenant's roles.
pub async fn list(Extension(state): Extension<Arc<AppState>>, Ctx(ctx): Ctx) -> Response {
    match state.engine().roles().list(&ctx).await {
        Ok(roles) => (StatusCode::OK, Json(json!({ "roles": roles }))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Json(body): Json<NewRole>,
) -> Response {
    match state.engine().roles().create(&ctx, body).await {
        Ok(role) => (StatusCode::CREATED, Json(role)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /roles/defaults - create the Manager and Worker templates if missing.
pub async fn seed_defaults(Extension(state): Extension<Arc<AppState>>, Ctx(ctx): Ctx) -> Response {
    match state.engine().roles().seed_defaults(&ctx).await {
        Ok(created) => (StatusCode::OK, Json(json!({ "created": created }))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(body): Json<RolePatch>,
) -> Response {
    let id = match errors::parse_id::<RoleId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.engine().roles().update(&ctx, id, body).await {
        Ok(role) => (StatusCode::OK, Json(role)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_id::<RoleId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    match state.engine().roles().delete(&ctx, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}
