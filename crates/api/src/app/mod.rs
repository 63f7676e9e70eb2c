//! HTTP API application wiring (Axum router + state).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use fieldhand_auth::AuthEngine;
use fieldhand_infra::SharedDirectory;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Shared, immutable state handed to every request.
#[derive(Clone)]
pub struct AppState {
    engine: AuthEngine<SharedDirectory>,
    session_cookie: String,
}

impl AppState {
    pub fn new(directory: SharedDirectory, session_cookie: impl Into<String>) -> Self {
        Self {
            engine: AuthEngine::new(directory),
            session_cookie: session_cookie.into(),
        }
    }

    pub fn engine(&self) -> &AuthEngine<SharedDirectory> {
        &self.engine
    }

    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let state = Arc::new(state);

    // Protected routes: require a session and carry the resolved context.
    let protected = routes::router()
        .layer(Extension(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
