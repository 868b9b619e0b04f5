//! Errors of a collection cycle.

use tokenwatch_metrics::PublishError;

/// Boxed error from a store backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a collection cycle ended early.
///
/// All variants are recovered at the cycle boundary; none of them stop the
/// scheduler.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("connecting to the store failed: {0}")]
    Connection(#[source] BoxError),

    #[error("query {query} failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("query {query} returned an unexpected row: {source}")]
    Decode {
        query: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("publishing results of {query} failed: {source}")]
    Publish {
        query: &'static str,
        #[source]
        source: PublishError,
    },
}

impl CollectionError {
    /// Name of the query that failed, if the failure is tied to one.
    pub fn query(&self) -> Option<&'static str> {
        match self {
            Self::Connection(_) => None,
            Self::Query { query, .. } | Self::Decode { query, .. } | Self::Publish { query, .. } => {
                Some(*query)
            }
        }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Query { .. } => "query",
            Self::Decode { .. } => "decode",
            Self::Publish { .. } => "publish",
        }
    }
}

/// A row that does not have the shape its query promises.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("field {index}: expected {expected}, got {actual}")]
    FieldType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field {index}: negative count {value}")]
    NegativeCount { index: usize, value: i64 },

    #[error("expected at most {expected} rows, got {actual}")]
    RowCount { expected: usize, actual: usize },

    #[error("field {index}: unsupported column type {type_name}")]
    UnsupportedColumn { index: usize, type_name: String },
}
