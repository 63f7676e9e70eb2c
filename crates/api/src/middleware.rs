use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use fieldhand_auth::{AuthError, RawCredentials};

use crate::app::errors::auth_error_to_response;
use crate::app::AppState;
use crate::context::RequestContext;

/// Resolve the caller's identity and team context once per request.
///
/// Nothing is cached: identity, membership and role are reloaded here on every
/// request, so a deactivation is visible on the caller's very next request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let credentials = extract_credentials(req.headers(), state.session_cookie());
    let sent_cookie = credentials.session_cookie.is_some();

    let identity = match state.engine().authenticate(&credentials, Utc::now()).await {
        Ok(identity) => identity,
        Err(AuthError::Unauthenticated) if sent_cookie => {
            return clear_session_cookie(
                auth_error_to_response(AuthError::Unauthenticated),
                state.session_cookie(),
            );
        }
        Err(err) => return auth_error_to_response(err),
    };

    let context = state.engine().contexts().resolve(&identity).await;
    req.extensions_mut()
        .insert(RequestContext::new(identity, context));

    next.run(req).await
}

/// Session cookie first; the bearer header is consulted only without one.
fn extract_credentials(headers: &HeaderMap, cookie_name: &str) -> RawCredentials {
    match extract_cookie(headers, cookie_name) {
        Some(token) => RawCredentials::from_cookie(token),
        None => match extract_bearer(headers) {
            Some(token) => RawCredentials::from_bearer(token),
            None => RawCredentials::default(),
        },
    }
}

fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn clear_session_cookie(response: Response, cookie_name: &str) -> Response {
    let expired = format!("{cookie_name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    match HeaderValue::from_str(&expired) {
        Ok(value) => ([(header::SET_COOKIE, value)], response).into_response(),
        Err(_) => response,
    }
}
