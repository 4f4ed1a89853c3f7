//! Value object trait: equality by value, not identity.
//!
//! Value objects have no identity; they are defined entirely by their attribute
//! values. `Money { amount: 10, currency: EUR }` is a value object, a `Movement`
//! is not.

/// Marker trait for value objects.
///
/// Implementors are immutable once constructed and compared by value. To
/// "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
