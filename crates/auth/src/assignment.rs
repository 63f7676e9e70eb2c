//! Assignment authority: may this actor delegate a record to that member?
//!
//! Unlike the permission gate, a denial here is a business rule the user is
//! meant to read, so it comes back as an explained decision, not an opaque 403.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use fieldhand_core::IdentityId;

use crate::context::UserContext;
use crate::error::{AuthError, AuthResult};
use crate::roles::HierarchyRank;
use crate::store::{IdentityStore, MembershipStore, RoleStore};

/// Why a delegation was refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentDenial {
    WorkerCannotAssign,
    ManagerSelfAssignment,
    ManagerToOwner,
    ManagerToManager,
    NotOnTeam,
}

impl AssignmentDenial {
    pub fn message(&self) -> &'static str {
        match self {
            AssignmentDenial::WorkerCannotAssign => "Workers cannot assign work",
            AssignmentDenial::ManagerSelfAssignment => "Managers cannot assign work to themselves",
            AssignmentDenial::ManagerToOwner => "Managers cannot assign to the business owner",
            AssignmentDenial::ManagerToManager => "Managers can only assign to Workers",
            AssignmentDenial::NotOnTeam => "The assignee is not an active member of your team",
        }
    }
}

impl core::fmt::Display for AssignmentDenial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of [`AssignmentChecker::can_assign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AssignmentDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(denial: AssignmentDenial) -> Self {
        Self {
            allowed: false,
            reason: Some(denial.message().to_string()),
        }
    }

    fn from_evaluation(result: Result<(), AssignmentDenial>) -> Self {
        match result {
            Ok(()) => Self::allowed(),
            Err(denial) => Self::denied(denial),
        }
    }
}

/// Who the proposed assignee is, relative to the assigner's tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assignee {
    /// The owner of the assigner's tenant.
    TenantOwner,
    /// An accepted, active member of the assigner's tenant.
    Member(HierarchyRank),
    /// Anyone else: another tenant, a pending/inactive member, an unknown id.
    Outsider,
}

/// Pure hierarchy rule.
///
/// Owner may assign to anyone on the team, including themself. Manager may
/// assign only to Workers, never to themself. Worker may never assign.
pub fn evaluate(
    assigner: HierarchyRank,
    is_self: bool,
    assignee: Assignee,
) -> Result<(), AssignmentDenial> {
    match assigner {
        HierarchyRank::Worker => Err(AssignmentDenial::WorkerCannotAssign),
        HierarchyRank::Owner => match assignee {
            Assignee::Outsider => Err(AssignmentDenial::NotOnTeam),
            Assignee::TenantOwner | Assignee::Member(_) => Ok(()),
        },
        HierarchyRank::Manager => {
            if is_self {
                return Err(AssignmentDenial::ManagerSelfAssignment);
            }
            match assignee {
                Assignee::Outsider => Err(AssignmentDenial::NotOnTeam),
                Assignee::TenantOwner | Assignee::Member(HierarchyRank::Owner) => {
                    Err(AssignmentDenial::ManagerToOwner)
                }
                Assignee::Member(HierarchyRank::Manager) => Err(AssignmentDenial::ManagerToManager),
                Assignee::Member(HierarchyRank::Worker) => Ok(()),
            }
        }
    }
}

/// Validates proposed delegations before the business handler writes them.
///
/// Read-only: nothing is persisted here.
#[derive(Debug, Clone)]
pub struct AssignmentChecker<S> {
    store: S,
}

impl<S> AssignmentChecker<S>
where
    S: IdentityStore + MembershipStore + RoleStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx), fields(acting_id = %ctx.acting_id(), rank = %ctx.hierarchy_rank()), err)]
    pub async fn can_assign(
        &self,
        ctx: &UserContext,
        target_member_id: IdentityId,
    ) -> AuthResult<AssignmentDecision> {
        let assigner = ctx.hierarchy_rank();
        if assigner == HierarchyRank::Worker {
            return Ok(AssignmentDecision::denied(AssignmentDenial::WorkerCannotAssign));
        }

        let is_self = target_member_id == ctx.acting_id();
        let assignee = self.classify(ctx, target_member_id).await?;
        let decision = AssignmentDecision::from_evaluation(evaluate(assigner, is_self, assignee));

        tracing::debug!(target_member_id = %target_member_id, allowed = decision.allowed, "assignment checked");
        Ok(decision)
    }

    /// Like [`can_assign`](Self::can_assign), but a refusal becomes `AssignmentDenied`.
    pub async fn ensure_can_assign(
        &self,
        ctx: &UserContext,
        target_member_id: IdentityId,
    ) -> AuthResult<()> {
        let is_self = target_member_id == ctx.acting_id();
        let assignee = if ctx.hierarchy_rank() == HierarchyRank::Worker {
            Assignee::Outsider
        } else {
            self.classify(ctx, target_member_id).await?
        };
        evaluate(ctx.hierarchy_rank(), is_self, assignee).map_err(AuthError::AssignmentDenied)
    }

    async fn classify(&self, ctx: &UserContext, target: IdentityId) -> AuthResult<Assignee> {
        match self.store.find_identity(target).await? {
            Some(identity) if identity.is_active => {}
            _ => return Ok(Assignee::Outsider),
        }
        if target.as_tenant() == ctx.effective_tenant_id() {
            return Ok(Assignee::TenantOwner);
        }

        let Some(membership) = self.store.find_membership(target).await? else {
            return Ok(Assignee::Outsider);
        };
        if membership.member_id != target
            || membership.tenant_id() != ctx.effective_tenant_id()
            || !membership.grants_access()
        {
            return Ok(Assignee::Outsider);
        }

        match self.store.find_role(membership.role_id).await? {
            Some(role) if !role.is_protected() && role.belongs_to(membership.tenant_id()) => {
                Ok(Assignee::Member(role.rank))
            }
            _ => {
                tracing::warn!(membership_id = %membership.id, "assignee has no usable role");
                Ok(Assignee::Outsider)
            }
        }
    }
}
