//! Postgres-backed directory.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Missing` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |
//!
//! Rows that fail to decode (unknown status or rank tokens) surface as
//! `Backend` rather than being guessed at. Unknown capability tokens are
//! dropped with a warning by `CapabilitySet::from_tokens`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use fieldhand_auth::{
    CapabilitySet, HierarchyRank, Identity, IdentityStore, InviteStatus, MembershipPatch,
    MembershipStore, Role, RoleHint, RoleKind, RoleStore, Session, SessionStore, SessionToken,
    StoreError, TeamMembership,
};
use fieldhand_core::{IdentityId, MembershipId, RoleId, TenantId};

const SCHEMA: &str = include_str!("../../migrations/0001_directory.sql");

const MEMBERSHIP_COLUMNS: &str = "id, member_id, owner_id, role_id, invite_status, is_active, \
     custom_permissions, use_custom_permissions, created_at, updated_at";

const ROLE_COLUMNS: &str = "id, tenant_id, name, permissions, hierarchy_rank, description";

/// Directory backed by the `identities`, `sessions`, `roles` and
/// `team_memberships` tables.
///
/// Every read goes to the database; nothing is cached in-process.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect with a bounded pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the (idempotent) schema.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityStore for PostgresDirectory {
    #[instrument(skip(self), fields(identity_id = %id), err)]
    async fn find_identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, display_name, is_active, role_hint, created_at
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_identity", e))?;

        row.map(|r| identity_from_row(&r)).transpose()
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresDirectory {
    #[instrument(skip_all, err)]
    async fn find_session(&self, token: &SessionToken) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT token, identity_id, issued_at, expires_at
            FROM sessions
            WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_session", e))?;

        row.map(|r| session_from_row(&r)).transpose()
    }

    #[instrument(skip_all, err)]
    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("invalidate_session", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MembershipStore for PostgresDirectory {
    #[instrument(skip(self), fields(member_id = %member_id), err)]
    async fn find_membership(
        &self,
        member_id: IdentityId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM team_memberships \
             WHERE member_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(member_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_membership", e))?;

        row.map(|r| membership_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(membership_id = %id), err)]
    async fn find_membership_by_id(
        &self,
        id: MembershipId,
    ) -> Result<Option<TeamMembership>, StoreError> {
        let sql = format!("SELECT {MEMBERSHIP_COLUMNS} FROM team_memberships WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_membership_by_id", e))?;

        row.map(|r| membership_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn list_memberships(
        &self,
        owner_id: IdentityId,
    ) -> Result<Vec<TeamMembership>, StoreError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM team_memberships \
             WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_memberships", e))?;

        rows.iter().map(membership_from_row).collect()
    }

    #[instrument(skip(self, membership), fields(membership_id = %membership.id), err)]
    async fn insert_membership(&self, membership: TeamMembership) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO team_memberships (
                id, member_id, owner_id, role_id, invite_status, is_active,
                custom_permissions, use_custom_permissions, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(membership.id.as_uuid())
        .bind(membership.member_id.as_uuid())
        .bind(membership.owner_id.as_uuid())
        .bind(membership.role_id.as_uuid())
        .bind(membership.invite_status.as_str())
        .bind(membership.is_active)
        .bind(membership.custom_permissions.to_tokens())
        .bind(membership.use_custom_permissions)
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_membership", e))?;
        Ok(())
    }

    /// Partial update in one statement; absent patch fields keep their value.
    #[instrument(skip(self, patch), fields(membership_id = %id), err)]
    async fn update_membership(
        &self,
        id: MembershipId,
        patch: MembershipPatch,
    ) -> Result<TeamMembership, StoreError> {
        let sql = format!(
            r#"
            UPDATE team_memberships SET
                role_id = COALESCE($2::uuid, role_id),
                invite_status = COALESCE($3::text, invite_status),
                is_active = COALESCE($4::boolean, is_active),
                custom_permissions = COALESCE($5::text[], custom_permissions),
                use_custom_permissions = COALESCE($6::boolean, use_custom_permissions),
                updated_at = COALESCE($7::timestamptz, updated_at)
            WHERE id = $1
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.role_id.map(|r| *r.as_uuid()))
            .bind(patch.invite_status.map(|s| s.as_str()))
            .bind(patch.is_active)
            .bind(patch.custom_permissions.as_ref().map(CapabilitySet::to_tokens))
            .bind(patch.use_custom_permissions)
            .bind(patch.updated_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_membership", e))?;

        match row {
            Some(r) => membership_from_row(&r),
            None => Err(StoreError::Missing(format!("membership {id}"))),
        }
    }
}

#[async_trait::async_trait]
impl RoleStore for PostgresDirectory {
    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role", e))?;

        row.map(|r| role_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_roles(&self, tenant_id: TenantId) -> Result<Vec<Role>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE tenant_id IS NULL OR tenant_id = $1 ORDER BY name"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn insert_role(&self, role: Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, tenant_id, name, permissions, hierarchy_rank, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role_tenant(&role))
        .bind(&role.name)
        .bind(role.permissions.to_tokens())
        .bind(role.rank.as_str())
        .bind(&role.description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(&self, role: Role) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, permissions = $3, hierarchy_rank = $4, description = $5
            WHERE id = $1
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(role.permissions.to_tokens())
        .bind(role.rank.as_str())
        .bind(&role.description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_role", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("role {}", role.id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1 AND tenant_id IS NOT NULL")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("role {id}")));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn decode_err(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {what} row: {err}"))
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let get = |e| decode_err("identity", e);
    let hint: String = row.try_get("role_hint").map_err(get)?;
    Ok(Identity {
        id: IdentityId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        email: row.try_get("email").map_err(get)?,
        display_name: row.try_get("display_name").map_err(get)?,
        is_active: row.try_get("is_active").map_err(get)?,
        role_hint: RoleHint::from_token(&hint)
            .ok_or_else(|| StoreError::Backend(format!("unknown role_hint '{hint}'")))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(get)?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, StoreError> {
    let get = |e| decode_err("session", e);
    Ok(Session {
        token: SessionToken::new(row.try_get::<String, _>("token").map_err(get)?),
        identity_id: IdentityId::from_uuid(row.try_get::<Uuid, _>("identity_id").map_err(get)?),
        issued_at: row.try_get("issued_at").map_err(get)?,
        expires_at: row.try_get("expires_at").map_err(get)?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<TeamMembership, StoreError> {
    let get = |e| decode_err("membership", e);
    let status: String = row.try_get("invite_status").map_err(get)?;
    let custom: Vec<String> = row.try_get("custom_permissions").map_err(get)?;
    Ok(TeamMembership {
        id: MembershipId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        member_id: IdentityId::from_uuid(row.try_get::<Uuid, _>("member_id").map_err(get)?),
        owner_id: IdentityId::from_uuid(row.try_get::<Uuid, _>("owner_id").map_err(get)?),
        role_id: RoleId::from_uuid(row.try_get::<Uuid, _>("role_id").map_err(get)?),
        invite_status: InviteStatus::from_token(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown invite_status '{status}'")))?,
        is_active: row.try_get("is_active").map_err(get)?,
        custom_permissions: CapabilitySet::from_tokens(custom),
        use_custom_permissions: row.try_get("use_custom_permissions").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
        updated_at: row.try_get("updated_at").map_err(get)?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let get = |e| decode_err("role", e);
    let id = RoleId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?);
    let tenant: Option<Uuid> = row.try_get("tenant_id").map_err(get)?;

    // The built-in row's stored permissions are ignored.
    let Some(tenant) = tenant else {
        return Ok(Role::owner(id));
    };

    let rank: String = row.try_get("hierarchy_rank").map_err(get)?;
    let permissions: Vec<String> = row.try_get("permissions").map_err(get)?;
    Ok(Role {
        id,
        kind: RoleKind::Custom {
            tenant_id: TenantId::from_uuid(tenant),
        },
        name: row.try_get("name").map_err(get)?,
        permissions: CapabilitySet::from_tokens(permissions),
        rank: HierarchyRank::from_token(&rank)
            .ok_or_else(|| StoreError::Backend(format!("unknown hierarchy_rank '{rank}'")))?,
        description: row.try_get("description").map_err(get)?,
    })
}

fn role_tenant(role: &Role) -> Option<Uuid> {
    match role.kind {
        RoleKind::Builtin => None,
        RoleKind::Custom { tenant_id } => Some(*tenant_id.as_uuid()),
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::Missing(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
