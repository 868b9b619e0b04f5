//! Untyped rows as returned by the store.

use crate::error::DecodeError;

/// A single scalar field of a [`RawRow`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// An ordered tuple of scalars produced by one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRow(Vec<RawValue>);

impl RawRow {
    pub fn new(values: Vec<RawValue>) -> Self {
        Self(values)
    }

    /// Fail unless the row has exactly `expected` fields.
    pub fn expect_len(&self, expected: usize) -> Result<(), DecodeError> {
        if self.0.len() != expected {
            return Err(DecodeError::FieldCount {
                expected,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    /// Text field at `index`. SQL `NULL` reads as the empty string.
    pub fn text(&self, index: usize) -> Result<&str, DecodeError> {
        match self.field(index)? {
            RawValue::Text(s) => Ok(s),
            RawValue::Null => Ok(""),
            other => Err(DecodeError::FieldType {
                index,
                expected: "text",
                actual: other.kind(),
            }),
        }
    }

    /// Non-negative integer field at `index`.
    pub fn count(&self, index: usize) -> Result<u64, DecodeError> {
        match self.field(index)? {
            RawValue::Int(v) => {
                u64::try_from(*v).map_err(|_| DecodeError::NegativeCount { index, value: *v })
            }
            other => Err(DecodeError::FieldType {
                index,
                expected: "integer",
                actual: other.kind(),
            }),
        }
    }

    fn field(&self, index: usize) -> Result<&RawValue, DecodeError> {
        self.0.get(index).ok_or(DecodeError::FieldCount {
            expected: index + 1,
            actual: self.0.len(),
        })
    }
}
