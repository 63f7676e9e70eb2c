//! In-memory directory for tests and local development.
//!
//! - No IO
//! - Cloning shares the same underlying maps
//! - Enforces the same uniqueness rules as the SQL schema

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use fieldhand_core::{IdentityId, MembershipId, RoleId, TenantId};

use crate::identity::{Identity, RoleHint};
use crate::membership::{MembershipPatch, TeamMembership};
use crate::roles::Role;
use crate::session::{Session, SessionToken};
use crate::store::{IdentityStore, MembershipStore, RoleStore, SessionStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    identities: HashMap<IdentityId, Identity>,
    sessions: HashMap<String, Session>,
    memberships: HashMap<MembershipId, TeamMembership>,
    roles: HashMap<RoleId, Role>,
}

/// Thread-safe in-memory implementation of every store trait.
#[derive(Debug, Clone)]
pub struct InMemoryDirectory {
    tables: Arc<RwLock<Tables>>,
    owner_role_id: RoleId,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDirectory {
    /// A fresh directory holding only the built-in Owner role.
    pub fn new() -> Self {
        let owner_role_id = RoleId::new();
        let mut tables = Tables::default();
        tables.roles.insert(owner_role_id, Role::owner(owner_role_id));
        Self {
            tables: Arc::new(RwLock::new(tables)),
            owner_role_id,
        }
    }

    pub fn owner_role_id(&self) -> RoleId {
        self.owner_role_id
    }

    /// Create and store an active identity.
    pub fn signup(&self, email: &str, role_hint: RoleHint) -> Identity {
        let identity = Identity {
            id: IdentityId::new(),
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            is_active: true,
            role_hint,
            created_at: Utc::now(),
        };
        self.insert_identity(identity.clone());
        identity
    }

    pub fn insert_identity(&self, identity: Identity) {
        self.write_unchecked().identities.insert(identity.id, identity);
    }

    pub fn set_identity_active(&self, id: IdentityId, is_active: bool) {
        if let Some(identity) = self.write_unchecked().identities.get_mut(&id) {
            identity.is_active = is_active;
        }
    }

    pub fn insert_session(&self, session: Session) {
        self.write_unchecked()
            .sessions
            .insert(session.token.as_str().to_string(), session);
    }

    /// Issue a session for `identity_id` valid from now for `ttl`.
    pub fn open_session(&self, identity_id: IdentityId, ttl: Duration) -> SessionToken {
        let now = Utc::now();
        self.open_session_at(identity_id, now, now + ttl)
    }

    pub fn open_session_at(
        &self,
        identity_id: IdentityId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> SessionToken {
        let token = SessionToken::new(Uuid::new_v4().simple().to_string());
        self.insert_session(Session {
            token: token.clone(),
            identity_id,
            issued_at,
            expires_at,
        });
        token
    }

    /// Insert or overwrite a role without any validation.
    pub fn put_role(&self, role: Role) {
        self.write_unchecked().roles.insert(role.id, role);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("directory lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("directory lock poisoned".to_string()))
    }

    // Seeding helpers are infallible; a poisoned lock still holds usable data.
    fn write_unchecked(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryDirectory {
    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.read()?.identities.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemoryDirectory {
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        Ok(self.read()?.sessions.get(token.as_str()).cloned())
    }

    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        self.write()?.sessions.remove(token.as_str());
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipStore for InMemoryDirectory {
    async fn find_membership(
        &self,
        member_id: IdentityId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        Ok(self
            .read()?
            .memberships
            .values()
            .filter(|m| m.member_id == member_id)
            .max_by_key(|m| (m.created_at, m.id))
            .cloned())
    }

    async fn find_membership_by_id(
        &self,
        id: MembershipId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        Ok(self.read()?.memberships.get(&id).cloned())
    }

    async fn list_memberships(
        &self,
        owner_id: IdentityId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        let mut out: Vec<TeamMembership> = self
            .read()?
            .memberships
            .values()
            .filter(|m| m.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.created_at, m.id));
        Ok(out)
    }

    async fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.memberships.contains_key(&membership.id) {
            return Err(StoreError::Conflict(format!(
                "membership {} already exists",
                membership.id
            )));
        }
        if membership.is_current()
            && tables
                .memberships
                .values()
                .any(|m| m.member_id == membership.member_id && m.is_current())
        {
            return Err(StoreError::Conflict(format!(
                "identity {} already has a current membership",
                membership.member_id
            )));
        }
        tables.memberships.insert(membership.id, membership);
        Ok(())
    }

    async fn update_membership(
        &self,
        id: MembershipId,
        patch: MembershipPatch,
    ) -> Result<TeamMembership, StoreError> {
        let mut tables = self.write()?;
        let membership = tables
            .memberships
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("membership {id}")))?;
        membership.apply(&patch);
        Ok(membership.clone())
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryDirectory {
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        Ok(self
            .read()?
            .roles
            .values()
            .filter(|r| r.belongs_to(tenant_id))
            .cloned()
            .collect())
    }

    async fn insert_role(&self, role: Role) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict(format!("role {} already exists", role.id)));
        }
        ensure_unique_name(&tables, &role)?;
        tables.roles.insert(role.id, role);
        Ok(())
    }

    async fn update_role(&self, role: Role) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.roles.contains_key(&role.id) {
            return Err(StoreError::Missing(format!("role {}", role.id)));
        }
        ensure_unique_name(&tables, &role)?;
        tables.roles.insert(role.id, role);
        Ok(())
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.write()?
            .roles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::Missing(format!("role {id}")))
    }
}

// Mirrors the (tenant_id, lower(name)) unique index.
fn ensure_unique_name(tables: &Tables, role: &Role) -> Result<(), StoreError> {
    let clash = tables.roles.values().any(|r| {
        r.id != role.id && r.kind == role.kind && r.name.eq_ignore_ascii_case(&role.name)
    });
    if clash {
        return Err(StoreError::Conflict(format!("role name '{}' is taken", role.name)));
    }
    Ok(())
}
