use axum::{
    routing::{get, patch, post, put},
    Router,
};

pub mod assignments;
pub mod roles;
pub mod system;
pub mod team;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .route("/assignments/check", post(assignments::check))
        .route("/roles", get(roles::list).post(roles::create))
        .route("/roles/defaults", post(roles::seed_defaults))
        .route("/roles/:id", patch(roles::update).delete(roles::delete))
        .route("/team/members", get(team::list_members))
        .route("/team/invites", post(team::invite))
        .route("/team/invites/:id/accept", post(team::accept))
        .route("/team/members/:id/revoke", post(team::revoke))
        .route("/team/members/:id/deactivate", post(team::deactivate))
        .route("/team/members/:id/reactivate", post(team::reactivate))
        .route("/team/members/:id/role", put(team::change_role))
        .route("/team/members/:id/permissions", put(team::set_permissions))
}
