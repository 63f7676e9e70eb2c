//! Team membership records and their lifecycle transitions.
//!
//! A membership links a member identity to a tenant owner. It confers access
//! only while `invite_status == Accepted` and `is_active == true`; both are
//! re-read on every request. Transitions are validated here as pure functions
//! that produce a [`MembershipPatch`]; persisting the patch is the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldhand_core::{DomainError, DomainResult, Entity, IdentityId, MembershipId, RoleId, TenantId};

use crate::capability::CapabilitySet;

/// Invite lifecycle: `Pending → Accepted | Revoked`, `Accepted → Revoked`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Revoked => "revoked",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "revoked" => Some(InviteStatus::Revoked),
            _ => None,
        }
    }
}

/// Why an existing membership confers no access.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    Pending,
    Deactivated,
    Revoked,
}

impl InactiveReason {
    /// User-facing explanation with a remediation hint.
    pub fn message(&self) -> &'static str {
        match self {
            InactiveReason::Pending => {
                "Your invitation is still pending. Accept it to access the team."
            }
            InactiveReason::Deactivated => {
                "Your team access has been deactivated. Ask the business owner to reactivate your account."
            }
            InactiveReason::Revoked => {
                "Your invitation was revoked. Ask the business owner to send a new invitation."
            }
        }
    }
}

impl core::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            InactiveReason::Pending => f.write_str("invite pending"),
            InactiveReason::Deactivated => f.write_str("membership deactivated"),
            InactiveReason::Revoked => f.write_str("invite revoked"),
        }
    }
}

/// Relationship between a member identity and the tenant owner.
///
/// Never deleted while anything references the member: removal is a state
/// change (revoke or deactivate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub id: MembershipId,
    pub member_id: IdentityId,
    pub owner_id: IdentityId,
    pub role_id: RoleId,
    pub invite_status: InviteStatus,
    /// Independent of `invite_status`: an accepted membership can be paused.
    pub is_active: bool,
    pub custom_permissions: CapabilitySet,
    /// When set, `custom_permissions` replaces the role's permissions outright.
    pub use_custom_permissions: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for TeamMembership {
    type Id = MembershipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Partial update of a membership (the `updateMembership` write contract).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPatch {
    pub role_id: Option<RoleId>,
    pub invite_status: Option<InviteStatus>,
    pub is_active: Option<bool>,
    pub custom_permissions: Option<CapabilitySet>,
    pub use_custom_permissions: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MembershipPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn with_status(mut self, status: InviteStatus) -> Self {
        self.invite_status = Some(status);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn with_custom_permissions(mut self, permissions: Option<CapabilitySet>) -> Self {
        self.use_custom_permissions = Some(permissions.is_some());
        self.custom_permissions = Some(permissions.unwrap_or_default());
        self
    }

    pub fn touched_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

impl TeamMembership {
    /// A fresh invite: pending, active, role defaults in effect.
    pub fn invite(
        member_id: IdentityId,
        owner_id: IdentityId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MembershipId::new(),
            member_id,
            owner_id,
            role_id,
            invite_status: InviteStatus::Pending,
            is_active: true,
            custom_permissions: CapabilitySet::empty(),
            use_custom_permissions: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The tenant this membership grants access to.
    pub fn tenant_id(&self) -> TenantId {
        self.owner_id.as_tenant()
    }

    /// `Ok` only for accepted and active memberships.
    pub fn access(&self) -> Result<(), InactiveReason> {
        match (self.invite_status, self.is_active) {
            (InviteStatus::Revoked, _) => Err(InactiveReason::Revoked),
            (InviteStatus::Pending, _) => Err(InactiveReason::Pending),
            (InviteStatus::Accepted, false) => Err(InactiveReason::Deactivated),
            (InviteStatus::Accepted, true) => Ok(()),
        }
    }

    pub fn grants_access(&self) -> bool {
        self.access().is_ok()
    }

    /// Pending or accepted (the member still belongs to this team).
    pub fn is_current(&self) -> bool {
        self.invite_status != InviteStatus::Revoked
    }

    /// Apply a patch in place (used by stores without a native partial update).
    pub fn apply(&mut self, patch: &MembershipPatch) {
        if let Some(role_id) = patch.role_id {
            self.role_id = role_id;
        }
        if let Some(status) = patch.invite_status {
            self.invite_status = status;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(custom) = &patch.custom_permissions {
            self.custom_permissions = custom.clone();
        }
        if let Some(use_custom) = patch.use_custom_permissions {
            self.use_custom_permissions = use_custom;
        }
        if let Some(at) = patch.updated_at {
            self.updated_at = at;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_not_revoked(&self) -> DomainResult<()> {
        if self.invite_status == InviteStatus::Revoked {
            return Err(DomainError::conflict("membership has been revoked"));
        }
        Ok(())
    }

    pub fn accept(&self, now: DateTime<Utc>) -> DomainResult<MembershipPatch> {
        match self.invite_status {
            InviteStatus::Pending => Ok(MembershipPatch::new()
                .with_status(InviteStatus::Accepted)
                .touched_at(now)),
            InviteStatus::Accepted => Err(DomainError::conflict("invite already accepted")),
            InviteStatus::Revoked => Err(DomainError::conflict("invite was revoked")),
        }
    }

    pub fn revoke(&self, now: DateTime<Utc>) -> DomainResult<MembershipPatch> {
        self.ensure_not_revoked()?;
        Ok(MembershipPatch::new()
            .with_status(InviteStatus::Revoked)
            .touched_at(now))
    }

    pub fn deactivate(&self, now: DateTime<Utc>) -> DomainResult<MembershipPatch> {
        self.ensure_not_revoked()?;
        if !self.is_active {
            return Err(DomainError::conflict("membership already inactive"));
        }
        Ok(MembershipPatch::new().with_active(false).touched_at(now))
    }

    pub fn reactivate(&self, now: DateTime<Utc>) -> DomainResult<MembershipPatch> {
        self.ensure_not_revoked()?;
        if self.is_active {
            return Err(DomainError::conflict("membership already active"));
        }
        Ok(MembershipPatch::new().with_active(true).touched_at(now))
    }

    pub fn change_role(&self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<MembershipPatch> {
        self.ensure_not_revoked()?;
        if self.role_id == role_id {
            return Err(DomainError::conflict("role already assigned"));
        }
        Ok(MembershipPatch::new().with_role(role_id).touched_at(now))
    }

    /// `Some` makes the set authoritative; `None` reverts to the role defaults.
    pub fn set_custom_permissions(
        &self,
        permissions: Option<CapabilitySet>,
        now: DateTime<Utc>,
    ) -> DomainResult<MembershipPatch> {
        self.ensure_not_revoked()?;
        Ok(MembershipPatch::new()
            .with_custom_permissions(permissions)
            .touched_at(now))
    }
}
