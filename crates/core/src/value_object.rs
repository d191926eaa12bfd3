//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values, never
/// by identity. To "modify" one, construct a new value. `DocumentNumber` is
/// the canonical example in this codebase.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
