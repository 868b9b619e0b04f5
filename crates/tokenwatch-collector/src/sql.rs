//! SQL store backed by `sqlx`'s `Any` driver.
//!
//! The connection URL picks the driver: `mysql://` for an eduMFA
//! MySQL/MariaDB database, `sqlite:` for local files. Each cycle opens a
//! single connection and closes it when the cycle ends; nothing is pooled.

use sqlx::AnyConnection;
use sqlx::any::AnyRow;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::error::{CollectionError, DecodeError};
use crate::query::Query;
use crate::row::{RawRow, RawValue};
use crate::store::{Session, Store};

/// Store reached through a connection URL.
#[derive(Clone)]
pub struct SqlStore {
    url: String,
}

impl SqlStore {
    pub fn new(url: impl Into<String>) -> Self {
        sqlx::any::install_default_drivers();
        Self { url: url.into() }
    }
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL usually carries credentials.
        f.debug_struct("SqlStore").finish_non_exhaustive()
    }
}

impl Store for SqlStore {
    type Session = SqlSession;

    async fn open(&self) -> Result<SqlSession, CollectionError> {
        let conn = AnyConnection::connect(&self.url)
            .await
            .map_err(|e| CollectionError::Connection(Box::new(e)))?;
        debug!(backend = conn.backend_name(), "store connection opened");
        Ok(SqlSession { conn })
    }
}

/// One open connection.
pub struct SqlSession {
    conn: AnyConnection,
}

impl Session for SqlSession {
    async fn fetch(&mut self, query: &Query) -> Result<Vec<RawRow>, CollectionError> {
        let rows = sqlx::query(query.sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| CollectionError::Query {
                query: query.name,
                source: Box::new(e),
            })?;

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CollectionError::Decode {
                query: query.name,
                source,
            })
    }

    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "closing store connection failed");
        }
    }
}

fn decode_row(row: &AnyRow) -> Result<RawRow, DecodeError> {
    (0..row.len())
        .map(|index| decode_value(row, index))
        .collect::<Result<Vec<_>, _>>()
        .map(RawRow::new)
}

/// Map one column to a [`RawValue`], trying the integer, text and binary
/// decodings in turn.
fn decode_value(row: &AnyRow, index: usize) -> Result<RawValue, DecodeError> {
    let unsupported = || DecodeError::UnsupportedColumn {
        index,
        type_name: row.column(index).type_info().name().to_string(),
    };

    let is_null = row.try_get_raw(index).map_err(|_| unsupported())?.is_null();
    if is_null {
        return Ok(RawValue::Null);
    }

    if let Ok(v) = row.try_get_unchecked::<i64, _>(index) {
        return Ok(RawValue::Int(v));
    }
    if let Ok(v) = row.try_get_unchecked::<i32, _>(index) {
        return Ok(RawValue::Int(i64::from(v)));
    }
    if let Ok(v) = row.try_get_unchecked::<String, _>(index) {
        return Ok(RawValue::Text(v));
    }
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
        // MySQL reports some text columns with a binary collation as blobs.
        return Ok(RawValue::Text(String::from_utf8_lossy(&v).into_owned()));
    }
    if let Ok(v) = row.try_get_unchecked::<f64, _>(index) {
        return Ok(RawValue::Float(v));
    }

    Err(unsupported())
}
