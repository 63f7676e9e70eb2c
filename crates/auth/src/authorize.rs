//! Permission gate.
//!
//! One code path for everyone: the Owner passes because its resolved set is
//! every capability, not because of a bypass.

use serde::Serialize;

use fieldhand_core::{IdentityId, TenantId};

use crate::capability::{Capability, CapabilitySet};
use crate::context::UserContext;
use crate::error::{AuthError, AuthResult};
use crate::roles::HierarchyRank;

/// What an operation needs from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// The single capability must be held.
    One(Capability),
    /// At least one of the listed capabilities must be held. Empty never matches.
    AnyOf(Vec<Capability>),
}

impl Requirement {
    pub fn is_met_by(&self, permissions: &CapabilitySet) -> bool {
        match self {
            Requirement::One(c) => permissions.contains(*c),
            Requirement::AnyOf(cs) => permissions.contains_any(cs),
        }
    }

    fn capabilities(&self) -> &[Capability] {
        match self {
            Requirement::One(c) => core::slice::from_ref(c),
            Requirement::AnyOf(cs) => cs,
        }
    }
}

impl From<Capability> for Requirement {
    fn from(value: Capability) -> Self {
        Requirement::One(value)
    }
}

impl From<&[Capability]> for Requirement {
    fn from(value: &[Capability]) -> Self {
        Requirement::AnyOf(value.to_vec())
    }
}

impl From<Vec<Capability>> for Requirement {
    fn from(value: Vec<Capability>) -> Self {
        Requirement::AnyOf(value)
    }
}

/// Operation-side authorization contract.
///
/// Implement this on business operations; handlers check it before acting.
pub trait CapabilityGated {
    fn required_capabilities(&self) -> Requirement;
}

/// Allow or reject a call for the resolved context.
///
/// - No IO
/// - No panics
/// - Denial carries no detail beyond "missing capability"
pub fn require(ctx: &UserContext, requirement: impl Into<Requirement>) -> AuthResult<()> {
    let requirement = requirement.into();
    if requirement.is_met_by(ctx.permissions()) {
        Ok(())
    } else {
        tracing::debug!(
            acting_id = %ctx.acting_id(),
            required = ?requirement,
            "permission gate denied"
        );
        Err(AuthError::Forbidden)
    }
}

/// Gate a [`CapabilityGated`] operation.
pub fn authorize_operation<O: CapabilityGated>(ctx: &UserContext, operation: &O) -> AuthResult<()> {
    require(ctx, operation.required_capabilities())
}

/// Check that a record's tenant matches the request's effective tenant.
///
/// A mismatch reads as `NotFound` so callers learn nothing about other tenants.
pub fn ensure_tenant(ctx: &UserContext, record_tenant_id: TenantId) -> AuthResult<()> {
    if ctx.effective_tenant_id() == record_tenant_id {
        Ok(())
    } else {
        tracing::warn!(
            acting_id = %ctx.acting_id(),
            "cross-tenant access attempt"
        );
        Err(AuthError::NotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a gate decision, for audit logs and owner-facing
/// tooling. Never returned to the denied caller.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub requirement: Requirement,
    pub granted: bool,
    pub reason: String,
    pub context: ContextState,
    /// Required capabilities the context lacks (empty when granted).
    pub missing: Vec<Capability>,
}

/// Snapshot of the context a decision was made against.
#[derive(Debug, Clone, Serialize)]
pub struct ContextState {
    pub acting_id: IdentityId,
    pub effective_tenant_id: TenantId,
    pub is_owner: bool,
    pub hierarchy_rank: HierarchyRank,
    pub effective_permissions: Vec<Capability>,
}

/// Explain why the gate would allow or deny `requirement` for `ctx`.
pub fn explain(ctx: &UserContext, requirement: impl Into<Requirement>) -> AuthorizationExplanation {
    let requirement = requirement.into();
    let granted = requirement.is_met_by(ctx.permissions());

    let missing: Vec<Capability> = requirement
        .capabilities()
        .iter()
        .copied()
        .filter(|c| !ctx.has(*c))
        .collect();

    let reason = match (&requirement, granted) {
        (Requirement::One(c), true) => format!("context holds '{c}'"),
        (Requirement::One(c), false) => format!("context lacks '{c}'"),
        (Requirement::AnyOf(cs), _) if cs.is_empty() => "no capability can satisfy an empty requirement".to_string(),
        (Requirement::AnyOf(_), true) => "context holds at least one of the listed capabilities".to_string(),
        (Requirement::AnyOf(_), false) => "context holds none of the listed capabilities".to_string(),
    };

    AuthorizationExplanation {
        context: ContextState {
            acting_id: ctx.acting_id(),
            effective_tenant_id: ctx.effective_tenant_id(),
            is_owner: ctx.is_owner(),
            hierarchy_rank: ctx.hierarchy_rank(),
            effective_permissions: ctx.permissions().iter().collect(),
        },
        requirement,
        granted,
        reason,
        missing,
    }
}
