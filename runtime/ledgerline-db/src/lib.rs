//! Relational store adapter for ledgerline batch runs.
//!
//! Everything above this crate speaks in [`ColumnMeta`], [`SqlValue`] and
//! [`SqlParam`]; only this crate touches `rusqlite` directly.

mod column;
mod cursor;
mod sqlite;
mod value;

pub use column::{ColumnMeta, NativeType};
pub use cursor::QueryStream;
pub use sqlite::{Connector, QueryResult, SqliteConn, SqliteConnector, SqliteOpenMode};
pub use value::{SqlParam, SqlValue};

use std::path::PathBuf;

/// Failures raised by the store layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to prepare query `{sql}`: {source}")]
    Prepare {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to bind parameter {index}: {source}")]
    Bind {
        index: usize,
        #[source]
        source: rusqlite::Error,
    },
    #[error("query step failed: {0}")]
    Step(#[source] rusqlite::Error),
    #[error("statement failed: {0}")]
    Execute(#[source] rusqlite::Error),
    #[error("cursor thread could not be started: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("cursor thread exited before reporting column metadata")]
    CursorGone,
}

impl DbError {
    /// True when the failure came from malformed SQL rather than from I/O.
    pub fn is_query_error(&self) -> bool {
        matches!(self, DbError::Prepare { .. })
    }
}
