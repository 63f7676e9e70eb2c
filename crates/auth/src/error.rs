//! Authorization error taxonomy.

use thiserror::Error;

use fieldhand_core::{DomainError, MembershipId};

use crate::assignment::AssignmentDenial;
use crate::membership::InactiveReason;
use crate::store::StoreError;

/// Result type used by the authorization engine.
pub type AuthResult<T> = Result<T, AuthError>;

/// Every way an authorization step can fail.
///
/// `Unauthenticated` and `Forbidden` are terminal: the caller must stop.
/// `MembershipInactive` and `AssignmentDenied` carry a user-facing explanation
/// and a remediation path. Nothing here is retried automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing, expired or invalid credentials, or a deactivated identity.
    #[error("unauthenticated")]
    Unauthenticated,

    /// A membership exists but confers no access (pending, deactivated, revoked).
    #[error("membership inactive: {reason}")]
    MembershipInactive {
        membership_id: MembershipId,
        reason: InactiveReason,
    },

    /// The resolved context lacks the required capability.
    ///
    /// Deliberately carries no detail about which capability or tenant.
    #[error("forbidden: missing capability")]
    Forbidden,

    /// A proposed delegation violates the hierarchy rules.
    #[error("assignment denied: {0}")]
    AssignmentDenied(AssignmentDenial),

    /// The record does not exist in the caller's tenant.
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether the caller may show the reason and offer a way forward.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::MembershipInactive { .. } | AuthError::AssignmentDenied(_)
        )
    }
}
