//! `fieldhand-auth`: multi-tenant authorization and tenant-context resolution.
//!
//! This crate is decoupled from HTTP and storage: it consumes the store
//! contracts in [`store`] and exposes three call shapes to business handlers
//! (see [`AuthEngine`]).

pub mod assignment;
pub mod authorize;
pub mod capability;
pub mod context;
pub mod engine;
pub mod error;
pub mod identity;
pub mod membership;
pub mod memory;
pub mod roles;
pub mod session;
pub mod store;
pub mod team;

pub use assignment::{AssignmentChecker, AssignmentDecision, AssignmentDenial};
pub use authorize::{
    authorize_operation, ensure_tenant, explain, require, AuthorizationExplanation,
    CapabilityGated, ContextState, Requirement,
};
pub use capability::{Capability, CapabilitySet, UnknownCapability};
pub use context::{TeamContextResolver, UserContext};
pub use engine::AuthEngine;
pub use error::{AuthError, AuthResult};
pub use identity::{Identity, IdentityResolver, RawCredentials, RoleHint};
pub use membership::{InactiveReason, InviteStatus, MembershipPatch, TeamMembership};
pub use memory::InMemoryDirectory;
pub use roles::{HierarchyRank, NewRole, Role, RoleKind, RolePatch, RoleRegistry};
pub use session::{Session, SessionToken, SessionValidationError};
pub use store::{Directory, IdentityStore, MembershipStore, RoleStore, SessionStore, StoreError};
pub use team::TeamService;
