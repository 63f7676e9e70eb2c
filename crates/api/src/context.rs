//! Per-request authorization context, as seen by handlers.

use axum::{extract::FromRequestParts, http::request::Parts, response::Response};

use fieldhand_auth::{AuthError, Identity, UserContext};

use crate::app::errors::auth_error_to_response;

/// What the auth middleware learned about the caller.
///
/// The identity is always resolved (otherwise the request never gets here).
/// The team context may have failed, e.g. for a pending member; handlers that
/// only need the identity (accepting an invite) still work in that case.
#[derive(Debug, Clone)]
pub struct RequestContext {
    identity: Identity,
    context: Result<UserContext, AuthError>,
}

impl RequestContext {
    pub fn new(identity: Identity, context: Result<UserContext, AuthError>) -> Self {
        Self { identity, context }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn context(&self) -> Result<&UserContext, &AuthError> {
        self.context.as_ref()
    }
}

fn request_context(parts: &Parts) -> Result<&RequestContext, Response> {
    parts
        .extensions
        .get::<RequestContext>()
        .ok_or_else(|| auth_error_to_response(AuthError::Unauthenticated))
}

/// Extracts the resolved [`UserContext`]; rejects with the resolution error.
#[derive(Debug, Clone)]
pub struct Ctx(pub UserContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match request_context(parts)?.context() {
            Ok(ctx) => Ok(Ctx(ctx.clone())),
            Err(err) => Err(auth_error_to_response(err.clone())),
        }
    }
}

/// Extracts the authenticated [`Identity`] whatever its team state.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Authenticated(request_context(parts)?.identity().clone()))
    }
}
