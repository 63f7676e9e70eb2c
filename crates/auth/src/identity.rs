//! Identity & session resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use fieldhand_core::{Entity, IdentityId};

use crate::error::{AuthError, AuthResult};
use crate::session::{validate_session, SessionToken};
use crate::store::{IdentityStore, SessionStore};

/// Hint recorded at signup about how an identity entered the system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleHint {
    /// Signed up on their own; may run a business (be a tenant root).
    OwnerCapable,
    /// Entered through a team invite.
    Member,
}

impl RoleHint {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "owner_capable" => Some(RoleHint::OwnerCapable),
            "member" => Some(RoleHint::Member),
            _ => None,
        }
    }
}

/// A principal capable of authenticating.
///
/// Identities are deactivated, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub role_hint: RoleHint,
    pub created_at: DateTime<Utc>,
}

impl Entity for Identity {
    type Id = IdentityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Raw credentials as lifted off a request by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    pub session_cookie: Option<SessionToken>,
    pub bearer: Option<SessionToken>,
}

impl RawCredentials {
    pub fn from_cookie(token: impl Into<String>) -> Self {
        Self {
            session_cookie: Some(SessionToken::new(token)),
            bearer: None,
        }
    }

    pub fn from_bearer(token: impl Into<String>) -> Self {
        Self {
            session_cookie: None,
            bearer: Some(SessionToken::new(token)),
        }
    }

    /// The session id to look up: the cookie when present, otherwise the bearer.
    ///
    /// Both transports feed the same lookup; the bearer is never consulted
    /// when a cookie was sent.
    pub fn session_token(&self) -> Option<&SessionToken> {
        self.session_cookie.as_ref().or(self.bearer.as_ref())
    }
}

/// Resolves raw credentials to a freshly loaded, active identity.
#[derive(Debug, Clone)]
pub struct IdentityResolver<S> {
    store: S,
}

impl<S> IdentityResolver<S>
where
    S: IdentityStore + SessionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Resolve credentials to the current identity, or fail closed.
    ///
    /// The identity is reloaded from the store on every call. If the session
    /// is expired, or its identity is gone or deactivated, the session is
    /// invalidated before the request is rejected.
    #[instrument(skip_all, err)]
    pub async fn resolve(
        &self,
        credentials: &RawCredentials,
        now: DateTime<Utc>,
    ) -> AuthResult<Identity> {
        let token = credentials.session_token().ok_or(AuthError::Unauthenticated)?;

        let Some(session) = self.store.find_session(token).await? else {
            return Err(AuthError::Unauthenticated);
        };

        if let Err(e) = validate_session(&session, now) {
            tracing::debug!(identity_id = %session.identity_id, reason = %e, "session rejected");
            self.store.invalidate_session(token).await?;
            return Err(AuthError::Unauthenticated);
        }

        match self.store.find_identity(session.identity_id).await? {
            Some(identity) if identity.is_active => Ok(identity),
            Some(_) | None => {
                tracing::warn!(
                    identity_id = %session.identity_id,
                    "identity missing or deactivated; invalidating session"
                );
                self.store.invalidate_session(token).await?;
                Err(AuthError::Unauthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDirectory;
    use chrono::Duration;

    fn resolver(dir: &InMemoryDirectory) -> IdentityResolver<InMemoryDirectory> {
        IdentityResolver::new(dir.clone())
    }

    #[tokio::test]
    async fn cookie_and_bearer_share_one_lookup() {
        let dir = InMemoryDirectory::new();
        let who = dir.signup("ana@yard.test", RoleHint::OwnerCapable);
        let token = dir.open_session(who.id, Duration::hours(1));

        let via_cookie = resolver(&dir)
            .resolve(&RawCredentials::from_cookie(token.as_str()), Utc::now())
            .await
            .unwrap();
        let via_bearer = resolver(&dir)
            .resolve(&RawCredentials::from_bearer(token.as_str()), Utc::now())
            .await
            .unwrap();
        assert_eq!(via_cookie, via_bearer);
    }

    #[tokio::test]
    async fn cookie_wins_over_bearer() {
        let dir = InMemoryDirectory::new();
        let ana = dir.signup("ana@yard.test", RoleHint::OwnerCapable);
        let ben = dir.signup("ben@yard.test", RoleHint::OwnerCapable);
        let credentials = RawCredentials {
            session_cookie: Some(dir.open_session(ana.id, Duration::hours(1))),
            bearer: Some(dir.open_session(ben.id, Duration::hours(1))),
        };

        let resolved = resolver(&dir).resolve(&credentials, Utc::now()).await.unwrap();
        assert_eq!(resolved.id, ana.id);
    }

    #[tokio::test]
    async fn missing_or_unknown_credentials_are_unauthenticated() {
        let dir = InMemoryDirectory::new();

        let none = resolver(&dir).resolve(&RawCredentials::default(), Utc::now()).await;
        assert_eq!(none, Err(AuthError::Unauthenticated));

        let unknown = resolver(&dir)
            .resolve(&RawCredentials::from_cookie("not-a-session"), Utc::now())
            .await;
        assert_eq!(unknown, Err(AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn expired_session_is_rejected_and_removed() {
        let dir = InMemoryDirectory::new();
        let who = dir.signup("ana@yard.test", RoleHint::OwnerCapable);
        let issued = Utc::now() - Duration::hours(2);
        let token = dir.open_session_at(who.id, issued, issued + Duration::hours(1));

        let err = resolver(&dir)
            .resolve(&RawCredentials::from_cookie(token.as_str()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert!(dir.find_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deactivated_identity_loses_its_session() {
        let dir = InMemoryDirectory::new();
        let who = dir.signup("ana@yard.test", RoleHint::OwnerCapable);
        let token = dir.open_session(who.id, Duration::hours(1));
        dir.set_identity_active(who.id, false);

        let err = resolver(&dir)
            .resolve(&RawCredentials::from_cookie(token.as_str()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert!(dir.find_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identity_is_reloaded_not_taken_from_the_session() {
        let dir = InMemoryDirectory::new();
        let mut who = dir.signup("ana@yard.test", RoleHint::OwnerCapable);
        let token = dir.open_session(who.id, Duration::hours(1));

        who.display_name = "Ana Renamed".to_string();
        dir.insert_identity(who.clone());

        let resolved = resolver(&dir)
            .resolve(&RawCredentials::from_cookie(token.as_str()), Utc::now())
            .await
            .unwrap();
        assert_eq!(resolved.display_name, "Ana Renamed");
    }
}
