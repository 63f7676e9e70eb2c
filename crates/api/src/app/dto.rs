//! Request and response bodies.

use serde::{Deserialize, Serialize};

use fieldhand_auth::{Capability, CapabilitySet, Identity, UserContext};
use fieldhand_core::{IdentityId, RoleId};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub identity: Identity,
    pub context: UserContext,
}

#[derive(Debug, Deserialize)]
pub struct AssignmentCheckRequest {
    pub target_member_id: IdentityId,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub member_id: IdentityId,
    pub role_id: RoleId,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role_id: RoleId,
}

/// `permissions: null` (or absent) reverts the member to their role's defaults.
#[derive(Debug, Deserialize)]
pub struct CustomPermissionsRequest {
    #[serde(default)]
    pub permissions: Option<Vec<Capability>>,
}

impl CustomPermissionsRequest {
    pub fn into_override(self) -> Option<CapabilitySet> {
        self.permissions.map(|caps| caps.into_iter().collect())
    }
}
