//! Team lifecycle: invites, acceptance, revocation, (de)activation, role and
//! permission changes.
//!
//! Each operation loads the membership, runs the pure transition on
//! [`TeamMembership`] and persists the resulting patch. Memberships are never
//! deleted; revocation is terminal and keeps the row for history.

use chrono::Utc;
use tracing::instrument;

use fieldhand_core::{DomainError, IdentityId, MembershipId, RoleId};

use crate::authorize::{ensure_tenant, require};
use crate::capability::{Capability, CapabilitySet};
use crate::context::UserContext;
use crate::error::{AuthError, AuthResult};
use crate::identity::Identity;
use crate::membership::{MembershipPatch, TeamMembership};
use crate::roles::Role;
use crate::store::{IdentityStore, MembershipStore, RoleStore};

#[derive(Debug, Clone)]
pub struct TeamService<S> {
    store: S,
}

impl<S> TeamService<S>
where
    S: IdentityStore + MembershipStore + RoleStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Every membership of the caller's tenant, revoked ones included.
    pub async fn list_members(&self, ctx: &UserContext) -> AuthResult<Vec<TeamMembership>> {
        require(ctx, [Capability::ManageTeam, Capability::ViewAll].as_slice())?;
        Ok(self
            .store
            .list_memberships(ctx.effective_tenant_id().owner())
            .await?)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), member_id = %member_id), err)]
    pub async fn invite(
        &self,
        ctx: &UserContext,
        member_id: IdentityId,
        role_id: RoleId,
    ) -> AuthResult<TeamMembership> {
        require(ctx, Capability::ManageTeam)?;

        let owner_id = ctx.effective_tenant_id().owner();
        if member_id == ctx.acting_id() || member_id == owner_id {
            return Err(DomainError::validation("cannot invite yourself or the business owner").into());
        }

        let identity = self
            .store
            .find_identity(member_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !identity.is_active {
            return Err(DomainError::validation("identity is deactivated").into());
        }

        if let Some(existing) = self.store.find_membership(member_id).await? {
            if existing.is_current() {
                return Err(DomainError::conflict("identity cannot be invited").into());
            }
        }
        let runs_a_team = self
            .store
            .list_memberships(member_id)
            .await?
            .iter()
            .any(TeamMembership::is_current);
        if runs_a_team {
            return Err(DomainError::conflict("identity cannot be invited").into());
        }

        self.assignable_role(ctx, role_id).await?;

        let membership = TeamMembership::invite(member_id, owner_id, role_id, Utc::now());
        self.store.insert_membership(membership.clone()).await?;
        tracing::info!(membership_id = %membership.id, "member invited");
        Ok(membership)
    }

    /// Accept a pending invite on behalf of the invited identity.
    ///
    /// Another identity's invite reads as missing.
    #[instrument(skip(self, identity), fields(identity_id = %identity.id, membership_id = %membership_id), err)]
    pub async fn accept(
        &self,
        identity: &Identity,
        membership_id: MembershipId,
    ) -> AuthResult<TeamMembership> {
        let membership = self
            .store
            .find_membership_by_id(membership_id)
            .await?
            .filter(|m| m.member_id == identity.id)
            .ok_or(AuthError::NotFound)?;

        let patch = membership.accept(Utc::now())?;
        self.persist(membership_id, patch).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), membership_id = %membership_id), err)]
    pub async fn revoke(&self, ctx: &UserContext, membership_id: MembershipId) -> AuthResult<TeamMembership> {
        let membership = self.manageable(ctx, membership_id).await?;
        let patch = membership.revoke(Utc::now())?;
        self.persist(membership_id, patch).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), membership_id = %membership_id), err)]
    pub async fn deactivate(&self, ctx: &UserContext, membership_id: MembershipId) -> AuthResult<TeamMembership> {
        let membership = self.manageable(ctx, membership_id).await?;
        let patch = membership.deactivate(Utc::now())?;
        self.persist(membership_id, patch).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), membership_id = %membership_id), err)]
    pub async fn reactivate(&self, ctx: &UserContext, membership_id: MembershipId) -> AuthResult<TeamMembership> {
        let membership = self.manageable(ctx, membership_id).await?;
        let patch = membership.reactivate(Utc::now())?;
        self.persist(membership_id, patch).await
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), membership_id = %membership_id, role_id = %role_id), err)]
    pub async fn change_role(
        &self,
        ctx: &UserContext,
        membership_id: MembershipId,
        role_id: RoleId,
    ) -> AuthResult<TeamMembership> {
        let membership = self.manageable(ctx, membership_id).await?;
        self.assignable_role(ctx, role_id).await?;
        let patch = membership.change_role(role_id, Utc::now())?;
        self.persist(membership_id, patch).await
    }

    /// `Some` replaces the role's permissions outright; `None` reverts to them.
    #[instrument(skip(self, ctx, permissions), fields(tenant_id = %ctx.effective_tenant_id(), membership_id = %membership_id), err)]
    pub async fn set_custom_permissions(
        &self,
        ctx: &UserContext,
        membership_id: MembershipId,
        permissions: Option<CapabilitySet>,
    ) -> AuthResult<TeamMembership> {
        let membership = self.manageable(ctx, membership_id).await?;
        match &permissions {
            Some(granted) if !ctx.is_owner() && !ctx.permissions().is_superset(granted) => {
                return Err(AuthError::Forbidden);
            }
            // Reverting hands back the role's own set, which must be grantable too.
            None if !ctx.is_owner() => {
                self.assignable_role(ctx, membership.role_id).await?;
            }
            _ => {}
        }
        let patch = membership.set_custom_permissions(permissions, Utc::now())?;
        self.persist(membership_id, patch).await
    }

    async fn persist(&self, id: MembershipId, patch: MembershipPatch) -> AuthResult<TeamMembership> {
        let updated = self.store.update_membership(id, patch).await?;
        tracing::info!(status = %updated.invite_status.as_str(), is_active = updated.is_active, "membership updated");
        Ok(updated)
    }

    /// Load a membership of the caller's tenant that the caller outranks.
    async fn manageable(&self, ctx: &UserContext, id: MembershipId) -> AuthResult<TeamMembership> {
        require(ctx, Capability::ManageTeam)?;

        let membership = self
            .store
            .find_membership_by_id(id)
            .await?
            .ok_or(AuthError::NotFound)?;
        ensure_tenant(ctx, membership.tenant_id())?;

        if ctx.is_owner() {
            return Ok(membership);
        }
        if membership.member_id == ctx.acting_id() {
            return Err(AuthError::Forbidden);
        }
        match self.store.find_role(membership.role_id).await? {
            Some(role) if role.rank < ctx.hierarchy_rank() => Ok(membership),
            _ => Err(AuthError::Forbidden),
        }
    }

    /// A role of the caller's tenant that the caller may hand out.
    async fn assignable_role(&self, ctx: &UserContext, id: RoleId) -> AuthResult<Role> {
        let role = self.store.find_role(id).await?.ok_or(AuthError::NotFound)?;
        if role.is_protected() {
            return Err(AuthError::Forbidden);
        }
        if !role.belongs_to(ctx.effective_tenant_id()) {
            return Err(AuthError::NotFound);
        }
        if !ctx.may_grant(role.rank, &role.permissions) {
            return Err(AuthError::Forbidden);
        }
        Ok(role)
    }
}
