//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Identities, team memberships and roles are entities: they are soft-removed
/// (deactivated, revoked) rather than deleted, so their id stays meaningful
/// for any historical record that references it.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
