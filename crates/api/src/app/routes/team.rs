use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use fieldhand_auth::{AuthResult, TeamMembership};
use fieldhand_core::MembershipId;

use crate::app::dto::{ChangeRoleRequest, CustomPermissionsRequest, InviteRequest};
use crate::app::{errors, AppState};
use crate::context::{Authenticated, Ctx};

fn respond(status: StatusCode, result: AuthResult<TeamMembership>) -> Response {
    match result {
        Ok(membership) => (status, Json(membership)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn list_members(Extension(state): Extension<Arc<AppState>>, Ctx(ctx): Ctx) -> Response {
    match state.engine().team().list_members(&ctx).await {
        Ok(members) => (StatusCode::OK, Json(json!({ "members": members }))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

pub async fn invite(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Json(body): Json<InviteRequest>,
) -> Response {
    let result = state.engine().team().invite(&ctx, body.member_id, body.role_id).await;
    respond(StatusCode::CREATED, result)
}

/// POST /team/invites/:id/accept - needs only an identity; pending members have no context yet.
pub async fn accept(
    Extension(state): Extension<Arc<AppState>>,
    Authenticated(identity): Authenticated,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(StatusCode::OK, state.engine().team().accept(&identity, id).await)
}

pub async fn revoke(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(StatusCode::OK, state.engine().team().revoke(&ctx, id).await)
}

pub async fn deactivate(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(StatusCode::OK, state.engine().team().deactivate(&ctx, id).await)
}

pub async fn reactivate(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(StatusCode::OK, state.engine().team().reactivate(&ctx, id).await)
}

pub async fn change_role(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(body): Json<ChangeRoleRequest>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(
        StatusCode::OK,
        state.engine().team().change_role(&ctx, id, body.role_id).await,
    )
}

pub async fn set_permissions(
    Extension(state): Extension<Arc<AppState>>,
    Ctx(ctx): Ctx,
    Path(id): Path<String>,
    Json(body): Json<CustomPermissionsRequest>,
) -> Response {
    let id = match errors::parse_id::<MembershipId>(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    respond(
        StatusCode::OK,
        state
            .engine()
            .team()
            .set_custom_permissions(&ctx, id, body.into_override())
            .await,
    )
}
