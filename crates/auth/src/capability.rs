//! Capability tokens and capability sets.
//!
//! A capability names one atomic permission (e.g. `write_jobs`). Capabilities
//! are a closed set: storage keeps them as plain tokens, but everything past
//! the store boundary works with [`Capability`] so the compiler can check that
//! the Owner superset and the permission gate cover every variant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One atomic permission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadClients,
    WriteClients,
    ReadJobs,
    WriteJobs,
    ReadQuotes,
    WriteQuotes,
    ReadInvoices,
    WriteInvoices,
    /// See every record in the tenant, not only records assigned to the actor.
    ViewAll,
    ManageTeam,
    ManageRoles,
    ManageBilling,
    ManageIntegrations,
    ManageAutomations,
}

impl Capability {
    /// Every capability known to this build, in ordinal order.
    pub const ALL: [Capability; 14] = [
        Capability::ReadClients,
        Capability::WriteClients,
        Capability::ReadJobs,
        Capability::WriteJobs,
        Capability::ReadQuotes,
        Capability::WriteQuotes,
        Capability::ReadInvoices,
        Capability::WriteInvoices,
        Capability::ViewAll,
        Capability::ManageTeam,
        Capability::ManageRoles,
        Capability::ManageBilling,
        Capability::ManageIntegrations,
        Capability::ManageAutomations,
    ];

    /// Position in [`Capability::ALL`].
    ///
    /// Exhaustive on purpose: adding a variant fails to compile until it is
    /// given a slot in `ALL`.
    pub const fn ordinal(self) -> usize {
        match self {
            Capability::ReadClients => 0,
            Capability::WriteClients => 1,
            Capability::ReadJobs => 2,
            Capability::WriteJobs => 3,
            Capability::ReadQuotes => 4,
            Capability::WriteQuotes => 5,
            Capability::ReadInvoices => 6,
            Capability::WriteInvoices => 7,
            Capability::ViewAll => 8,
            Capability::ManageTeam => 9,
            Capability::ManageRoles => 10,
            Capability::ManageBilling => 11,
            Capability::ManageIntegrations => 12,
            Capability::ManageAutomations => 13,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::ReadClients => "read_clients",
            Capability::WriteClients => "write_clients",
            Capability::ReadJobs => "read_jobs",
            Capability::WriteJobs => "write_jobs",
            Capability::ReadQuotes => "read_quotes",
            Capability::WriteQuotes => "write_quotes",
            Capability::ReadInvoices => "read_invoices",
            Capability::WriteInvoices => "write_invoices",
            Capability::ViewAll => "view_all",
            Capability::ManageTeam => "manage_team",
            Capability::ManageRoles => "manage_roles",
            Capability::ManageBilling => "manage_billing",
            Capability::ManageIntegrations => "manage_integrations",
            Capability::ManageAutomations => "manage_automations",
        }
    }

    /// Parse a stored token. Returns `None` for tokens unknown to this build.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability '{0}'")]
pub struct UnknownCapability(pub String);

/// An ordered set of capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The union of every known capability (the Owner set).
    pub fn all() -> Self {
        Self(Capability::ALL.into_iter().collect())
    }

    /// Build a set from stored tokens, dropping tokens this build does not know.
    ///
    /// An unknown token never grants anything.
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for token in tokens {
            let token = token.as_ref();
            match Capability::from_token(token) {
                Some(cap) => {
                    set.insert(cap);
                }
                None => tracing::warn!(token, "ignoring unknown capability token"),
            }
        }
        Self(set)
    }

    pub fn to_tokens(&self) -> Vec<String> {
        self.0.iter().map(|c| c.as_str().to_string()).collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// True if any capability in `required` is present.
    pub fn contains_any(&self, required: &[Capability]) -> bool {
        required.iter().any(|c| self.contains(*c))
    }

    /// True if every capability in `other` is also in `self`.
    pub fn is_superset(&self, other: &CapabilitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Capabilities in `other` that `self` lacks.
    pub fn missing_from(&self, other: &CapabilitySet) -> CapabilitySet {
        Self(other.0.difference(&self.0).copied().collect())
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(value: [Capability; N]) -> Self {
        value.into_iter().collect()
    }
}
