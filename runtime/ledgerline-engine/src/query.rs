use crate::bind::{BindValue, to_params};
use crate::error::EngineError;
use crate::infer::{ColumnType, decode_row, infer_columns};
use crate::row::PositionalRow;
use ledgerline_db::{SqlValue, SqliteConn};

/// A one-shot lookup on a work unit's own connection. Rows are decoded
/// with the same inference as the database row source.
#[derive(Debug)]
pub struct QueryRun {
    types: Vec<ColumnType>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl QueryRun {
    pub fn open(conn: &SqliteConn, sql: &str, params: &[BindValue]) -> Result<Self, EngineError> {
        let result = conn.query(sql, &to_params(params))?;
        tracing::trace!(%sql, rows = result.rows.len(), "lookup query");
        Ok(Self {
            types: infer_columns(&result.columns),
            rows: result.rows.into_iter(),
        })
    }

    /// First row only, or `None` for an empty result.
    pub fn first(conn: &SqliteConn, sql: &str, params: &[BindValue]) -> Result<Option<PositionalRow>, EngineError> {
        Self::open(conn, sql, params)?.next_row()
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn next_row(&mut self) -> Result<Option<PositionalRow>, EngineError> {
        self.rows
            .next()
            .map(|values| decode_row(&self.types, values))
            .transpose()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for QueryRun {
    type Item = Result<PositionalRow, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
