//! Entity trait: things with identity (wallets, movements, categories).

/// An object whose identity survives changes to its attributes.
///
/// Archiving a movement changes its `archived` flag, not its identity.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// True when both values denote the same entity, whatever their attributes.
    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
