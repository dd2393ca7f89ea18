//! Wire-faithful object key representation.
//!
//! Object keys are compared on their raw, wire-level bytes. A key containing
//! a percent-encoded delimiter (`a=1%2Fb=2`) and a key containing the literal
//! delimiter (`a=1/b=2`) render the same once decoded, but they are different
//! objects on the backend; decoding anywhere on the forwarding path would
//! merge them. [`ObjectKey`] therefore never decodes: construction is the
//! identity on raw bytes, and equality, hashing, and display all use the raw
//! form.

use std::fmt;

/// An object key as it appeared on the wire.
///
/// Equality is byte equality of the raw form:
///
/// ```
/// use s3gate_core::key::ObjectKey;
///
/// let encoded = ObjectKey::from_raw("a=1%2Fb=2");
/// let literal = ObjectKey::from_raw("a=1/b=2");
/// assert_ne!(encoded, literal);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Wrap a raw path remainder as an object key.
    ///
    /// Pure and injective: no decoding, no normalization beyond taking the
    /// bytes as given.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw wire-level form, suitable for rebuilding the backend path.
    #[must_use]
    pub fn as_raw(&self) -> &str {
        &self.0
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
