//! Tri-state attribute values.
//!
//! Terraform distinguishes a value that is not known until apply from one that
//! is explicitly null, so every desired attribute is carried as a [`Field`].

/// A plan-supplied attribute: unknown, explicitly null, or a concrete value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Not known until apply (computed or depends on another resource).
    Unknown,
    /// Explicitly null or omitted from configuration.
    Null,
    /// A concrete value.
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Null
    }
}

impl<T> Field<T> {
    /// Returns true if the value is not yet known.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true if the value is explicitly null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true if a concrete value is present.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Borrows the concrete value, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unknown | Self::Null => None,
        }
    }

    /// Consumes the field, returning the concrete value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unknown | Self::Null => None,
        }
    }

    /// Borrows the inner value while keeping the tri-state.
    #[must_use]
    pub const fn as_ref(&self) -> Field<&T> {
        match self {
            Self::Unknown => Field::Unknown,
            Self::Null => Field::Null,
            Self::Value(v) => Field::Value(v),
        }
    }

    /// Maps the concrete value, keeping unknown and null as they are.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Unknown => Field::Unknown,
            Self::Null => Field::Null,
            Self::Value(v) => Field::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}
