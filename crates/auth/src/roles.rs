//! Roles, hierarchy ranks and the tenant-scoped role registry.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use fieldhand_core::{DomainError, Entity, RoleId, TenantId};

use crate::authorize::require;
use crate::capability::{Capability, CapabilitySet};
use crate::context::UserContext;
use crate::error::{AuthError, AuthResult};
use crate::store::{MembershipStore, RoleStore};

/// Ordered delegation tier. Declaration order is rank order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyRank {
    Worker,
    Manager,
    Owner,
}

impl HierarchyRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyRank::Worker => "worker",
            HierarchyRank::Manager => "manager",
            HierarchyRank::Owner => "owner",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "worker" => Some(HierarchyRank::Worker),
            "manager" => Some(HierarchyRank::Manager),
            "owner" => Some(HierarchyRank::Owner),
            _ => None,
        }
    }
}

impl core::fmt::Display for HierarchyRank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a role comes from.
///
/// Tagged rather than name-matched so that a tenant can never shadow the
/// built-in Owner role by naming a custom role "Owner".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoleKind {
    Builtin,
    Custom { tenant_id: TenantId },
}

/// A named, ranked bundle of capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub kind: RoleKind,
    pub name: String,
    pub permissions: CapabilitySet,
    pub rank: HierarchyRank,
    pub description: Option<String>,
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Role {
    pub const OWNER_NAME: &'static str = "Owner";

    /// The built-in Owner role.
    ///
    /// Its permissions are always computed as every known capability, so a
    /// capability added later is never missing from the Owner.
    pub fn owner(id: RoleId) -> Self {
        Self {
            id,
            kind: RoleKind::Builtin,
            name: Self::OWNER_NAME.to_string(),
            permissions: Self::owner_permissions(),
            rank: HierarchyRank::Owner,
            description: Some("Business owner with every capability".to_string()),
        }
    }

    pub fn owner_permissions() -> CapabilitySet {
        CapabilitySet::all()
    }

    pub fn custom(
        tenant_id: TenantId,
        name: impl Into<String>,
        rank: HierarchyRank,
        permissions: CapabilitySet,
    ) -> Self {
        Self {
            id: RoleId::new(),
            kind: RoleKind::Custom { tenant_id },
            name: name.into(),
            permissions,
            rank,
            description: None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, RoleKind::Builtin)
    }

    /// Roles that can never be edited, deleted or handed to a member.
    ///
    /// Matches on the name as well as the tag so that a stored Owner row keeps
    /// its protection even if its id or kind column is rewritten.
    pub fn is_protected(&self) -> bool {
        self.is_builtin() || is_reserved_name(&self.name)
    }

    /// Whether this role may be used inside `tenant_id`.
    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        match self.kind {
            RoleKind::Builtin => true,
            RoleKind::Custom { tenant_id: t } => t == tenant_id,
        }
    }
}

fn is_reserved_name(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(Role::OWNER_NAME)
}

/// Input for creating a custom role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub permissions: CapabilitySet,
    pub rank: HierarchyRank,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a custom role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub permissions: Option<CapabilitySet>,
    pub rank: Option<HierarchyRank>,
    pub description: Option<String>,
}

/// Default role templates offered to a new tenant.
pub fn default_role_templates() -> Vec<NewRole> {
    vec![
        NewRole {
            name: "Manager".to_string(),
            permissions: CapabilitySet::from([
                Capability::ReadClients,
                Capability::WriteClients,
                Capability::ReadJobs,
                Capability::WriteJobs,
                Capability::ReadQuotes,
                Capability::WriteQuotes,
                Capability::ReadInvoices,
                Capability::ViewAll,
            ]),
            rank: HierarchyRank::Manager,
            description: Some("Runs day-to-day work and delegates to workers".to_string()),
        },
        NewRole {
            name: "Worker".to_string(),
            permissions: CapabilitySet::from([
                Capability::ReadClients,
                Capability::ReadJobs,
                Capability::WriteJobs,
            ]),
            rank: HierarchyRank::Worker,
            description: Some("Works the jobs assigned to them".to_string()),
        },
    ]
}

/// CRUD over roles, scoped to the caller's tenant.
#[derive(Debug, Clone)]
pub struct RoleRegistry<S> {
    store: S,
}

impl<S> RoleRegistry<S>
where
    S: RoleStore + MembershipStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Look up a role by id.
    ///
    /// The built-in role always comes back with its computed permission set,
    /// whatever the stored row says.
    pub async fn resolve(&self, id: RoleId) -> AuthResult<Role> {
        match self.store.find_role(id).await? {
            Some(role) if role.is_builtin() => Ok(Role::owner(role.id)),
            Some(role) => Ok(role),
            None => Err(AuthError::NotFound),
        }
    }

    /// Resolve a role visible to the caller's tenant (other tenants' roles read as missing).
    pub async fn resolve_in_tenant(&self, ctx: &UserContext, id: RoleId) -> AuthResult<Role> {
        let role = self.resolve(id).await?;
        if !role.belongs_to(ctx.effective_tenant_id()) {
            return Err(AuthError::NotFound);
        }
        Ok(role)
    }

    /// The Owner role followed by the tenant's custom roles.
    pub async fn list(&self, ctx: &UserContext) -> AuthResult<Vec<Role>> {
        require(ctx, [Capability::ManageRoles, Capability::ManageTeam].as_slice())?;

        let mut roles: Vec<Role> = self
            .store
            .list_roles(ctx.effective_tenant_id())
            .await?
            .into_iter()
            .filter(|r| r.belongs_to(ctx.effective_tenant_id()))
            .map(|r| if r.is_builtin() { Role::owner(r.id) } else { r })
            .collect();
        roles.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    #[instrument(skip(self, ctx, new), fields(tenant_id = %ctx.effective_tenant_id(), name = %new.name), err)]
    pub async fn create(&self, ctx: &UserContext, new: NewRole) -> AuthResult<Role> {
        require(ctx, Capability::ManageRoles)?;

        let role = Role {
            id: RoleId::new(),
            kind: RoleKind::Custom {
                tenant_id: ctx.effective_tenant_id(),
            },
            name: new.name.trim().to_string(),
            permissions: new.permissions,
            rank: new.rank,
            description: new.description,
        };
        self.validate(ctx, &role).await?;

        self.store.insert_role(role.clone()).await?;
        tracing::info!(role_id = %role.id, "role created");
        Ok(role)
    }

    #[instrument(skip(self, ctx, patch), fields(tenant_id = %ctx.effective_tenant_id(), role_id = %id), err)]
    pub async fn update(&self, ctx: &UserContext, id: RoleId, patch: RolePatch) -> AuthResult<Role> {
        require(ctx, Capability::ManageRoles)?;

        let existing = self.resolve_in_tenant(ctx, id).await?;
        self.ensure_editable(ctx, &existing)?;

        let mut role = existing;
        if let Some(name) = patch.name {
            role.name = name.trim().to_string();
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = permissions;
        }
        if let Some(rank) = patch.rank {
            role.rank = rank;
        }
        if let Some(description) = patch.description {
            role.description = Some(description);
        }
        self.validate(ctx, &role).await?;

        self.store.update_role(role.clone()).await?;
        tracing::info!("role updated");
        Ok(role)
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.effective_tenant_id(), role_id = %id), err)]
    pub async fn delete(&self, ctx: &UserContext, id: RoleId) -> AuthResult<()> {
        require(ctx, Capability::ManageRoles)?;

        let existing = self.resolve_in_tenant(ctx, id).await?;
        self.ensure_editable(ctx, &existing)?;

        let in_use = self
            .store
            .list_memberships(ctx.effective_tenant_id().owner())
            .await?
            .iter()
            .any(|m| m.role_id == id && m.is_current());
        if in_use {
            return Err(DomainError::conflict("role is still assigned to team members").into());
        }

        self.store.delete_role(id).await?;
        tracing::info!("role deleted");
        Ok(())
    }

    /// Create the default Manager and Worker roles, skipping names already taken.
    pub async fn seed_defaults(&self, ctx: &UserContext) -> AuthResult<Vec<Role>> {
        require(ctx, Capability::ManageRoles)?;

        let existing = self.store.list_roles(ctx.effective_tenant_id()).await?;
        let mut created = Vec::new();
        for template in default_role_templates() {
            let taken = existing
                .iter()
                .any(|r| r.name.eq_ignore_ascii_case(&template.name));
            if !taken {
                created.push(self.create(ctx, template).await?);
            }
        }
        Ok(created)
    }

    fn ensure_editable(&self, ctx: &UserContext, role: &Role) -> AuthResult<()> {
        if role.is_protected() {
            return Err(AuthError::Forbidden);
        }
        if !ctx.may_grant(role.rank, &role.permissions) {
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }

    async fn validate(&self, ctx: &UserContext, role: &Role) -> AuthResult<()> {
        if is_reserved_name(&role.name) || role.rank == HierarchyRank::Owner {
            return Err(AuthError::Forbidden);
        }
        if role.name.is_empty() {
            return Err(DomainError::validation("role name cannot be empty").into());
        }
        if !ctx.may_grant(role.rank, &role.permissions) {
            return Err(AuthError::Forbidden);
        }

        let duplicate = self
            .store
            .list_roles(ctx.effective_tenant_id())
            .await?
            .iter()
            .any(|r| r.id != role.id && r.name.eq_ignore_ascii_case(&role.name));
        if duplicate {
            return Err(DomainError::conflict(format!("a role named '{}' already exists", role.name)).into());
        }
        Ok(())
    }
}
