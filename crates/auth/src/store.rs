//! Durable-store contracts consumed by the engine.
//!
//! The engine never caches anything read through these traits: every request
//! reloads identity, membership and role so that a deactivation, revocation or
//! role change is visible from the very next request.

use std::sync::Arc;

use thiserror::Error;

use fieldhand_core::{IdentityId, MembershipId, RoleId, TenantId};

use crate::identity::Identity;
use crate::membership::{MembershipPatch, TeamMembership};
use crate::roles::Role;
use crate::session::{Session, SessionToken};

/// Store operation error.
///
/// These are infrastructure errors, never authorization outcomes. The engine
/// propagates them unchanged; they are not downgraded to a denial or a grant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness or concurrency constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write targeted a record that does not exist.
    #[error("record missing: {0}")]
    Missing(String),

    /// Connection, query or decoding failure.
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError>;

    /// Remove the session so it can never resolve again (logout).
    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    /// The member's most recent membership, whatever its state.
    async fn find_membership(
        &self,
        member_id: IdentityId,
    ) -> Result<Option<TeamMembership>, StoreError>;

    async fn find_membership_by_id(
        &self,
        id: MembershipId,
    ) -> Result<Option<TeamMembership>, StoreError>;

    /// Every membership of the tenant owned by `owner_id`, including revoked ones.
    async fn list_memberships(&self, owner_id: IdentityId)
    -> Result<Vec<TeamMembership>, StoreError>;

    async fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError>;

    async fn update_membership(
        &self,
        id: MembershipId,
        patch: MembershipPatch,
    ) -> Result<TeamMembership, StoreError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    /// Built-in roles plus the custom roles of one tenant.
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError>;

    async fn insert_role(&self, role: Role) -> Result<(), StoreError>;

    async fn update_role(&self, role: Role) -> Result<(), StoreError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;
}

/// Everything the engine reads from (and the few things it writes to).
pub trait Directory: IdentityStore + SessionStore + MembershipStore + RoleStore {}

impl<T> Directory for T where T: IdentityStore + SessionStore + MembershipStore + RoleStore {}

#[async_trait::async_trait]
impl<S> IdentityStore for Arc<S>
where
    S: IdentityStore + ?Sized,
{
    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        (**self).find_identity(id).await
    }
}

#[async_trait::async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        (**self).find_session(token).await
    }

    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        (**self).invalidate_session(token).await
    }
}

#[async_trait::async_trait]
impl<S> MembershipStore for Arc<S>
where
    S: MembershipStore + ?Sized,
{
    async fn find_membership(
        &self,
        member_id: IdentityId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        (**self).find_membership(member_id).await
    }

    async fn find_membership_by_id(
        &self,
        id: MembershipId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        (**self).find_membership_by_id(id).await
    }

    async fn list_memberships(
        &self,
        owner_id: IdentityId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        (**self).list_memberships(owner_id).await
    }

    async fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError> {
        (**self).insert_membership(membership).await
    }

    async fn update_membership(
        &self,
        id: MembershipId,
        patch: MembershipPatch,
    ) -> Result<TeamMembership, StoreError> {
        (**self).update_membership(id, patch).await
    }
}

#[async_trait::async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        (**self).find_role(id).await
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        (**self).list_roles(tenant_id).await
    }

    async fn insert_role(&self, role: Role) -> Result<(), StoreError> {
        (**self).insert_role(role).await
    }

    async fn update_role(&self, role: Role) -> Result<(), StoreError> {
        (**self).update_role(role).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        (**self).delete_role(id).await
    }
}
