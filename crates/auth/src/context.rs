//! Team context resolution: who is acting, for which tenant, with what.

use serde::Serialize;
use tracing::instrument;

use fieldhand_core::{IdentityId, MembershipId, TenantId};

use crate::capability::{Capability, CapabilitySet};
use crate::error::{AuthError, AuthResult};
use crate::identity::{Identity, RoleHint};
use crate::membership::TeamMembership;
use crate::roles::{HierarchyRank, Role};
use crate::store::{IdentityStore, MembershipStore, RoleStore};

/// The resolved authorization context for one request.
///
/// Computed fresh per request and never persisted, cached or accepted from
/// client-supplied data; it can only be built by [`TeamContextResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    acting_id: IdentityId,
    effective_tenant_id: TenantId,
    is_owner: bool,
    membership_id: Option<MembershipId>,
    permissions: CapabilitySet,
    hierarchy_rank: HierarchyRank,
}

impl UserContext {
    /// Context of an identity that owns its own tenant.
    pub(crate) fn tenant_root(acting_id: IdentityId) -> Self {
        Self {
            acting_id,
            effective_tenant_id: acting_id.as_tenant(),
            is_owner: true,
            membership_id: None,
            permissions: Role::owner_permissions(),
            hierarchy_rank: HierarchyRank::Owner,
        }
    }

    /// Context of a team member acting inside the owner's tenant.
    pub(crate) fn member(acting_id: IdentityId, membership: &TeamMembership, role: &Role) -> Self {
        Self {
            acting_id,
            effective_tenant_id: membership.tenant_id(),
            is_owner: false,
            membership_id: Some(membership.id),
            permissions: effective_permissions(membership, role),
            hierarchy_rank: role.rank,
        }
    }

    pub fn acting_id(&self) -> IdentityId {
        self.acting_id
    }

    /// The tenant every data operation of this request must be scoped to.
    pub fn effective_tenant_id(&self) -> TenantId {
        self.effective_tenant_id
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn membership_id(&self) -> Option<MembershipId> {
        self.membership_id
    }

    pub fn permissions(&self) -> &CapabilitySet {
        &self.permissions
    }

    pub fn hierarchy_rank(&self) -> HierarchyRank {
        self.hierarchy_rank
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.permissions.contains(capability)
    }

    /// Whether this actor may hand out a role of `rank` carrying `permissions`.
    ///
    /// Owners may grant anything below Owner. Everyone else may only grant
    /// ranks strictly below their own and capabilities they hold themselves.
    pub fn may_grant(&self, rank: HierarchyRank, permissions: &CapabilitySet) -> bool {
        if rank >= HierarchyRank::Owner {
            return false;
        }
        if self.is_owner {
            return true;
        }
        rank < self.hierarchy_rank && self.permissions.is_superset(permissions)
    }
}

/// Permission resolution rule for a member.
///
/// With `use_custom_permissions` the custom set replaces the role's set
/// outright; the two are never merged.
pub fn effective_permissions(membership: &TeamMembership, role: &Role) -> CapabilitySet {
    if membership.use_custom_permissions {
        membership.custom_permissions.clone()
    } else {
        role.permissions.clone()
    }
}

/// Resolves an authenticated identity to its [`UserContext`].
///
/// Performs reads only and holds no state between calls, so concurrent
/// resolutions for different identities never interact.
#[derive(Debug, Clone)]
pub struct TeamContextResolver<S> {
    store: S,
}

impl<S> TeamContextResolver<S>
where
    S: IdentityStore + MembershipStore + RoleStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(identity_id = %identity.id), err)]
    pub async fn resolve(&self, identity: &Identity) -> AuthResult<UserContext> {
        let Some(current) = self.store.find_identity(identity.id).await? else {
            return Err(AuthError::NotFound);
        };
        if !current.is_active {
            return Err(AuthError::Unauthenticated);
        }

        let membership = match self.store.find_membership(current.id).await? {
            Some(m) if m.member_id == current.id => m,
            Some(m) => {
                tracing::warn!(membership_id = %m.id, "store returned a membership for another identity");
                return Err(AuthError::Forbidden);
            }
            None => return Ok(UserContext::tenant_root(current.id)),
        };

        match membership.access() {
            Ok(()) => self.member_context(&current, &membership).await,
            Err(reason) if current.role_hint == RoleHint::OwnerCapable => {
                tracing::debug!(membership_id = %membership.id, reason = ?reason, "inactive membership; acting as own tenant");
                Ok(UserContext::tenant_root(current.id))
            }
            Err(reason) => Err(AuthError::MembershipInactive {
                membership_id: membership.id,
                reason,
            }),
        }
    }

    async fn member_context(
        &self,
        identity: &Identity,
        membership: &TeamMembership,
    ) -> AuthResult<UserContext> {
        let Some(role) = self.store.find_role(membership.role_id).await? else {
            tracing::warn!(
                membership_id = %membership.id,
                role_id = %membership.role_id,
                "membership references a missing role; denying"
            );
            return Err(AuthError::Forbidden);
        };

        if role.is_protected() || !role.belongs_to(membership.tenant_id()) {
            tracing::warn!(
                membership_id = %membership.id,
                role_id = %role.id,
                "membership references a role it may not hold; denying"
            );
            return Err(AuthError::Forbidden);
        }

        Ok(UserContext::member(identity.id, membership, &role))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDirectory;
    use crate::membership::{InactiveReason, InviteStatus, MembershipPatch};
    use crate::roles::RoleKind;
    use crate::store::MembershipStore;
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn manager_role(tenant_id: TenantId) -> Role {
        Role::custom(
            tenant_id,
            "Manager",
            HierarchyRank::Manager,
            CapabilitySet::from([Capability::ReadJobs, Capability::WriteJobs]),
        )
    }

    async fn team_of_one() -> (InMemoryDirectory, Identity, Identity, TeamMembership, Role) {
        let dir = InMemoryDirectory::new();
        let owner = dir.signup("owner@acme.test", RoleHint::OwnerCapable);
        let member = dir.signup("mia@acme.test", RoleHint::Member);
        let role = manager_role(owner.id.as_tenant());
        dir.put_role(role.clone());

        let membership = TeamMembership::invite(member.id, owner.id, role.id, Utc::now());
        dir.insert_membership(membership.clone()).await.unwrap();
        (dir, owner, member, membership, role)
    }

    async fn accept(dir: &InMemoryDirectory, m: &TeamMembership) {
        let patch = m.accept(Utc::now()).unwrap();
        dir.update_membership(m.id, patch).await.unwrap();
    }

    #[tokio::test]
    async fn identity_without_membership_is_a_tenant_root() {
        let dir = InMemoryDirectory::new();
        let owner = dir.signup("owner@acme.test", RoleHint::OwnerCapable);

        let ctx = TeamContextResolver::new(dir).resolve(&owner).await.unwrap();

        assert!(ctx.is_owner());
        assert_eq!(ctx.effective_tenant_id(), owner.id.as_tenant());
        assert_eq!(ctx.permissions(), &CapabilitySet::all());
        assert_eq!(ctx.hierarchy_rank(), HierarchyRank::Owner);
        assert_eq!(ctx.membership_id(), None);
    }

    #[tokio::test]
    async fn pending_then_accepted_invite() {
        let (dir, owner, member, membership, _) = team_of_one().await;
        let resolver = TeamContextResolver::new(dir.clone());

        let err = resolver.resolve(&member).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::MembershipInactive {
                membership_id: membership.id,
                reason: InactiveReason::Pending
            }
        );

        accept(&dir, &membership).await;
        let ctx = resolver.resolve(&member).await.unwrap();

        assert_eq!(ctx.effective_tenant_id(), owner.id.as_tenant());
        assert!(!ctx.is_owner());
        assert_eq!(ctx.membership_id(), Some(membership.id));
        assert_eq!(
            ctx.permissions(),
            &CapabilitySet::from([Capability::ReadJobs, Capability::WriteJobs])
        );
        assert_eq!(ctx.hierarchy_rank(), HierarchyRank::Manager);
    }

    #[tokio::test]
    async fn deactivation_is_visible_on_the_next_resolution() {
        let (dir, _, member, membership, _) = team_of_one().await;
        accept(&dir, &membership).await;
        let resolver = TeamContextResolver::new(dir.clone());
        assert!(resolver.resolve(&member).await.is_ok());

        dir.update_membership(membership.id, MembershipPatch::new().with_active(false))
            .await
            .unwrap();

        let err = resolver.resolve(&member).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::MembershipInactive { reason: InactiveReason::Deactivated, .. }
        ));
    }

    #[tokio::test]
    async fn revoked_member_without_owner_hint_stays_locked_out() {
        let (dir, _, member, membership, _) = team_of_one().await;
        dir.update_membership(membership.id, MembershipPatch::new().with_status(InviteStatus::Revoked))
            .await
            .unwrap();

        let err = TeamContextResolver::new(dir).resolve(&member).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::MembershipInactive { reason: InactiveReason::Revoked, .. }
        ));
    }

    #[tokio::test]
    async fn revoked_owner_capable_identity_falls_back_to_its_own_tenant() {
        let dir = InMemoryDirectory::new();
        let owner = dir.signup("owner@acme.test", RoleHint::OwnerCapable);
        let other = dir.signup("solo@plumbing.test", RoleHint::OwnerCapable);
        let role = manager_role(owner.id.as_tenant());
        dir.put_role(role.clone());
        let mut m = TeamMembership::invite(other.id, owner.id, role.id, Utc::now());
        m.invite_status = InviteStatus::Revoked;
        dir.insert_membership(m).await.unwrap();

        let ctx = TeamContextResolver::new(dir).resolve(&other).await.unwrap();

        assert!(ctx.is_owner());
        assert_eq!(ctx.effective_tenant_id(), other.id.as_tenant());
        assert_ne!(ctx.effective_tenant_id(), owner.id.as_tenant());
    }

    #[tokio::test]
    async fn pending_invite_does_not_lock_an_owner_out_of_its_own_tenant() {
        let dir = InMemoryDirectory::new();
        let rival = dir.signup("rival@mowing.test", RoleHint::OwnerCapable);
        let solo = dir.signup("solo@plumbing.test", RoleHint::OwnerCapable);
        let role = manager_role(rival.id.as_tenant());
        dir.put_role(role.clone());
        dir.insert_membership(TeamMembership::invite(solo.id, rival.id, role.id, Utc::now()))
            .await
            .unwrap();

        let ctx = TeamContextResolver::new(dir).resolve(&solo).await.unwrap();

        assert!(ctx.is_owner());
        assert_eq!(ctx.effective_tenant_id(), solo.id.as_tenant());
    }

    #[tokio::test]
    async fn deactivated_owner_capable_identity_falls_back_to_its_own_tenant() {
        let dir = InMemoryDirectory::new();
        let owner = dir.signup("owner@acme.test", RoleHint::OwnerCapable);
        let other = dir.signup("solo@plumbing.test", RoleHint::OwnerCapable);
        let role = manager_role(owner.id.as_tenant());
        dir.put_role(role.clone());
        let mut m = TeamMembership::invite(other.id, owner.id, role.id, Utc::now());
        m.invite_status = InviteStatus::Accepted;
        m.is_active = false;
        dir.insert_membership(m).await.unwrap();

        let ctx = TeamContextResolver::new(dir).resolve(&other).await.unwrap();

        assert!(ctx.is_owner());
        assert_eq!(ctx.effective_tenant_id(), other.id.as_tenant());
    }

    #[tokio::test]
    async fn custom_permissions_replace_role_defaults() {
        let (dir, _, member, membership, _) = team_of_one().await;
        accept(&dir, &membership).await;
        let custom = CapabilitySet::from([Capability::ReadJobs]);
        dir.update_membership(
            membership.id,
            MembershipPatch::new().with_custom_permissions(Some(custom.clone())),
        )
        .await
        .unwrap();

        let ctx = TeamContextResolver::new(dir).resolve(&member).await.unwrap();

        assert_eq!(ctx.permissions(), &custom);
        assert!(!ctx.has(Capability::WriteJobs));
    }

    #[tokio::test]
    async fn empty_custom_set_grants_nothing() {
        let (dir, _, member, membership, _) = team_of_one().await;
        accept(&dir, &membership).await;
        dir.update_membership(
            membership.id,
            MembershipPatch::new().with_custom_permissions(Some(CapabilitySet::empty())),
        )
        .await
        .unwrap();

        let ctx = TeamContextResolver::new(dir).resolve(&member).await.unwrap();
        assert!(ctx.permissions().is_empty());
    }

    #[tokio::test]
    async fn role_from_another_tenant_fails_closed() {
        let (dir, _, member, membership, _) = team_of_one().await;
        accept(&dir, &membership).await;
        let foreign = manager_role(TenantId::new());
        dir.put_role(foreign.clone());
        dir.update_membership(membership.id, MembershipPatch::new().with_role(foreign.id))
            .await
            .unwrap();

        let err = TeamContextResolver::new(dir).resolve(&member).await.unwrap_err();
        assert_eq!(err, AuthError::Forbidden);
    }

    #[tokio::test]
    async fn builtin_owner_role_on_a_member_fails_closed() {
        let (dir, _, member, membership, _) = team_of_one().await;
        accept(&dir, &membership).await;
        dir.update_membership(membership.id, MembershipPatch::new().with_role(dir.owner_role_id()))
            .await
            .unwrap();

        let err = TeamContextResolver::new(dir).resolve(&member).await.unwrap_err();
        assert_eq!(err, AuthError::Forbidden);
    }

    #[tokio::test]
    async fn missing_identity_is_not_found() {
        let dir = InMemoryDirectory::new();
        let ghost = Identity {
            id: IdentityId::new(),
            email: "ghost@nowhere.test".into(),
            display_name: "Ghost".into(),
            is_active: true,
            role_hint: RoleHint::OwnerCapable,
            created_at: Utc::now(),
        };

        let err = TeamContextResolver::new(dir).resolve(&ghost).await.unwrap_err();
        assert_eq!(err, AuthError::NotFound);
    }

    #[test]
    fn may_grant_never_exceeds_the_granter() {
        let owner = testing::owner(IdentityId::new());
        let all = CapabilitySet::all();
        assert!(owner.may_grant(HierarchyRank::Manager, &all));
        assert!(!owner.may_grant(HierarchyRank::Owner, &all));

        let manager = testing::member(
            IdentityId::new(),
            TenantId::new(),
            HierarchyRank::Manager,
            CapabilitySet::from([Capability::ReadJobs, Capability::ManageTeam]),
        );
        assert!(manager.may_grant(HierarchyRank::Worker, &CapabilitySet::from([Capability::ReadJobs])));
        assert!(!manager.may_grant(HierarchyRank::Manager, &CapabilitySet::empty()));
        assert!(!manager.may_grant(
            HierarchyRank::Worker,
            &CapabilitySet::from([Capability::ManageBilling])
        ));
    }

    fn capability_set() -> impl Strategy<Value = CapabilitySet> {
        proptest::sample::subsequence(Capability::ALL.to_vec(), 0..=Capability::ALL.len())
            .prop_map(|caps| caps.into_iter().collect())
    }

    proptest! {
        #[test]
        fn override_replaces_and_never_merges(role_set in capability_set(), custom in capability_set()) {
            let tenant = TenantId::new();
            let mut role = manager_role(tenant);
            role.permissions = role_set.clone();
            let mut membership = TeamMembership::invite(IdentityId::new(), tenant.owner(), role.id, Utc::now());

            membership.use_custom_permissions = true;
            membership.custom_permissions = custom.clone();
            prop_assert_eq!(effective_permissions(&membership, &role), custom);

            membership.use_custom_permissions = false;
            prop_assert_eq!(effective_permissions(&membership, &role), role_set);
        }

        #[test]
        fn member_context_is_always_scoped_to_the_owner(
            owner in any::<u128>(),
            member in any::<u128>(),
            other in any::<u128>(),
        ) {
            prop_assume!(owner != member && owner != other);
            let owner = IdentityId::from_uuid(Uuid::from_u128(owner));
            let member = IdentityId::from_uuid(Uuid::from_u128(member));
            let other = IdentityId::from_uuid(Uuid::from_u128(other));
            let role = manager_role(owner.as_tenant());
            let membership = TeamMembership::invite(member, owner, role.id, Utc::now());

            let ctx = UserContext::member(member, &membership, &role);
            prop_assert_eq!(ctx.effective_tenant_id(), owner.as_tenant());
            prop_assert_ne!(ctx.effective_tenant_id(), other.as_tenant());
            let is_custom = matches!(role.kind, RoleKind::Custom { .. });
            prop_assert!(is_custom);
        }
    }
}
