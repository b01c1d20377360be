//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Two entities are the same entity when their identifiers are equal, regardless of
/// the rest of their state. Aggregates implement this directly instead of inheriting
/// from a base type.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Identity comparison (as opposed to `PartialEq`, which compares full state).
    fn same_identity_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
