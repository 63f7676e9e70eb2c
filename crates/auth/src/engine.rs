//! The three entry points every business handler goes through.

use chrono::{DateTime, Utc};
use tracing::instrument;

use fieldhand_core::IdentityId;

use crate::assignment::{AssignmentChecker, AssignmentDecision};
use crate::authorize::{require, Requirement};
use crate::context::{TeamContextResolver, UserContext};
use crate::error::AuthResult;
use crate::identity::{Identity, IdentityResolver, RawCredentials};
use crate::roles::RoleRegistry;
use crate::store::Directory;
use crate::team::TeamService;

/// Identity → team context → gate, wired over one directory.
///
/// Holds no per-request state; clone it freely across handlers.
#[derive(Debug, Clone)]
pub struct AuthEngine<D> {
    identities: IdentityResolver<D>,
    contexts: TeamContextResolver<D>,
    assignments: AssignmentChecker<D>,
    roles: RoleRegistry<D>,
    team: TeamService<D>,
}

impl<D> AuthEngine<D>
where
    D: Directory + Clone,
{
    pub fn new(directory: D) -> Self {
        Self {
            identities: IdentityResolver::new(directory.clone()),
            contexts: TeamContextResolver::new(directory.clone()),
            assignments: AssignmentChecker::new(directory.clone()),
            roles: RoleRegistry::new(directory.clone()),
            team: TeamService::new(directory),
        }
    }

    /// Credentials to a freshly loaded identity.
    pub async fn authenticate(
        &self,
        credentials: &RawCredentials,
        now: DateTime<Utc>,
    ) -> AuthResult<Identity> {
        self.identities.resolve(credentials, now).await
    }

    /// Credentials to the per-request [`UserContext`].
    #[instrument(skip_all, err)]
    pub async fn resolve_context(
        &self,
        credentials: &RawCredentials,
        now: DateTime<Utc>,
    ) -> AuthResult<UserContext> {
        let identity = self.authenticate(credentials, now).await?;
        self.contexts.resolve(&identity).await
    }

    pub fn require_capability(
        &self,
        ctx: &UserContext,
        requirement: impl Into<Requirement>,
    ) -> AuthResult<()> {
        require(ctx, requirement)
    }

    pub async fn can_assign(
        &self,
        ctx: &UserContext,
        target_member_id: IdentityId,
    ) -> AuthResult<AssignmentDecision> {
        self.assignments.can_assign(ctx, target_member_id).await
    }

    pub fn contexts(&self) -> &TeamContextResolver<D> {
        &self.contexts
    }

    pub fn roles(&self) -> &RoleRegistry<D> {
        &self.roles
    }

    pub fn team(&self) -> &TeamService<D> {
        &self.team
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilitySet};
    use crate::error::AuthError;
    use crate::identity::RoleHint;
    use crate::membership::InactiveReason;
    use crate::memory::InMemoryDirectory;
    use crate::roles::{HierarchyRank, NewRole};
    use chrono::Duration;

    #[tokio::test]
    async fn owner_invites_a_manager_who_delegates_to_a_worker() {
        let dir = InMemoryDirectory::new();
        let engine = AuthEngine::new(dir.clone());

        let owner = dir.signup("olga@mowers.test", RoleHint::OwnerCapable);
        let manager = dir.signup("mo@mowers.test", RoleHint::Member);
        let worker = dir.signup("wu@mowers.test", RoleHint::Member);

        let owner_creds = RawCredentials::from_cookie(dir.open_session(owner.id, Duration::hours(8)).as_str());
        let manager_creds = RawCredentials::from_bearer(dir.open_session(manager.id, Duration::hours(8)).as_str());

        let owner_ctx = engine.resolve_context(&owner_creds, Utc::now()).await.unwrap();
        assert!(owner_ctx.is_owner());

        let manager_role = engine
            .roles()
            .create(
                &owner_ctx,
                NewRole {
                    name: "Manager".into(),
                    permissions: CapabilitySet::from([Capability::ReadJobs, Capability::WriteJobs]),
                    rank: HierarchyRank::Manager,
                    description: None,
                },
            )
            .await
            .unwrap();
        let worker_role = engine
            .roles()
            .create(
                &owner_ctx,
                NewRole {
                    name: "Worker".into(),
                    permissions: CapabilitySet::from([Capability::ReadJobs]),
                    rank: HierarchyRank::Worker,
                    description: None,
                },
            )
            .await
            .unwrap();

        let invite = engine.team().invite(&owner_ctx, manager.id, manager_role.id).await.unwrap();
        let err = engine.resolve_context(&manager_creds, Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::MembershipInactive { reason: InactiveReason::Pending, .. }
        ));

        engine.team().accept(&manager, invite.id).await.unwrap();
        let worker_invite = engine.team().invite(&owner_ctx, worker.id, worker_role.id).await.unwrap();
        engine.team().accept(&worker, worker_invite.id).await.unwrap();

        let ctx = engine.resolve_context(&manager_creds, Utc::now()).await.unwrap();
        assert_eq!(ctx.effective_tenant_id(), owner.id.as_tenant());
        assert!(!ctx.is_owner());
        assert_eq!(
            ctx.permissions(),
            &CapabilitySet::from([Capability::ReadJobs, Capability::WriteJobs])
        );
        assert_eq!(ctx.hierarchy_rank(), HierarchyRank::Manager);

        assert_eq!(engine.can_assign(&ctx, worker.id).await.unwrap(), AssignmentDecision::allowed());
        let to_owner = engine.can_assign(&ctx, owner.id).await.unwrap();
        assert!(!to_owner.allowed);
        assert_eq!(
            to_owner.reason.as_deref(),
            Some("Managers cannot assign to the business owner")
        );

        engine.require_capability(&ctx, Capability::WriteJobs).unwrap();
        assert_eq!(
            engine.require_capability(&ctx, Capability::ManageBilling),
            Err(AuthError::Forbidden)
        );
    }

    #[tokio::test]
    async fn deactivation_takes_effect_on_the_next_request() {
        let dir = InMemoryDirectory::new();
        let engine = AuthEngine::new(dir.clone());
        let owner = dir.signup("olga@mowers.test", RoleHint::OwnerCapable);
        let member = dir.signup("mo@mowers.test", RoleHint::Member);
        let owner_ctx = engine
            .resolve_context(
                &RawCredentials::from_cookie(dir.open_session(owner.id, Duration::hours(1)).as_str()),
                Utc::now(),
            )
            .await
            .unwrap();
        let roles = engine.roles().seed_defaults(&owner_ctx).await.unwrap();
        let worker_role = roles.iter().find(|r| r.rank == HierarchyRank::Worker).unwrap();

        let invite = engine.team().invite(&owner_ctx, member.id, worker_role.id).await.unwrap();
        engine.team().accept(&member, invite.id).await.unwrap();
        let creds = RawCredentials::from_cookie(dir.open_session(member.id, Duration::hours(1)).as_str());
        assert!(engine.resolve_context(&creds, Utc::now()).await.is_ok());

        engine.team().deactivate(&owner_ctx, invite.id).await.unwrap();
        assert!(matches!(
            engine.resolve_context(&creds, Utc::now()).await,
            Err(AuthError::MembershipInactive { reason: InactiveReason::Deactivated, .. })
        ));
    }

    #[tokio::test]
    async fn deactivated_identity_is_logged_out() {
        let dir = InMemoryDirectory::new();
        let engine = AuthEngine::new(dir.clone());
        let owner = dir.signup("olga@mowers.test", RoleHint::OwnerCapable);
        let token = dir.open_session(owner.id, Duration::hours(1));
        let creds = RawCredentials::from_cookie(token.as_str());

        dir.set_identity_active(owner.id, false);
        assert_eq!(
            engine.resolve_context(&creds, Utc::now()).await.unwrap_err(),
            AuthError::Unauthenticated
        );

        // Reactivating the identity does not revive the invalidated session.
        dir.set_identity_active(owner.id, true);
        assert_eq!(
            engine.resolve_context(&creds, Utc::now()).await.unwrap_err(),
            AuthError::Unauthenticated
        );
    }
}
