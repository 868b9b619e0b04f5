//! The seam between a collection cycle and the database.

use std::future::Future;

use crate::error::CollectionError;
use crate::query::Query;
use crate::row::RawRow;

/// Opens one [`Session`] per collection cycle.
pub trait Store: Send + Sync + 'static {
    type Session: Session;

    /// Open a fresh connection. Fails with [`CollectionError::Connection`].
    fn open(&self) -> impl Future<Output = Result<Self::Session, CollectionError>> + Send;
}

/// A connection scoped to a single cycle.
pub trait Session: Send {
    /// Run one query and return all of its rows.
    ///
    /// Fails with [`CollectionError::Query`] or [`CollectionError::Decode`]
    /// naming `query`.
    fn fetch(
        &mut self,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<RawRow>, CollectionError>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}
