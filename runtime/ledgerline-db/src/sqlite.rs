//! SQLite connector for the ledgerline store layer.

use crate::{ColumnMeta, DbError, SqlParam, SqlValue};
use rusqlite::{Connection, OpenFlags, Statement};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 2_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqliteOpenMode {
    ReadOnly,
    ReadWrite,
}

/// A single owned connection. Never shared between work units.
pub struct SqliteConn {
    conn: Connection,
    path: PathBuf,
}

/// Fully materialised result of a one-shot query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl SqliteConn {
    pub fn open(path: &Path, mode: SqliteOpenMode) -> Result<Self, DbError> {
        let flags = match mode {
            SqliteOpenMode::ReadOnly => {
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            SqliteOpenMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
        };
        let open_err = |source| DbError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(open_err)?;
        if matches!(mode, SqliteOpenMode::ReadOnly) {
            conn.pragma_update(None, "query_only", 1).map_err(open_err)?;
        }
        tracing::debug!(path = %path.display(), ?mode, "opened sqlite connection");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_read_only(path: &Path) -> Result<Self, DbError> {
        Self::open(path, SqliteOpenMode::ReadOnly)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql).map_err(DbError::Execute)
    }

    /// Run a statement that returns no rows; yields the affected row count.
    pub fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<usize, DbError> {
        let mut stmt = self.prepare(sql)?;
        bind_params(&mut stmt, params)?;
        stmt.raw_execute().map_err(DbError::Execute)
    }

    /// Run a query and collect every row. The statement is released before
    /// this returns.
    pub fn query(&self, sql: &str, params: &[SqlParam]) -> Result<QueryResult, DbError> {
        let mut stmt = self.prepare(sql)?;
        let columns = column_meta(&stmt);
        bind_params(&mut stmt, params)?;
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next().map_err(DbError::Step)? {
            rows.push(read_row(row, width)?);
        }
        Ok(QueryResult { columns, rows })
    }

    pub(crate) fn prepare(&self, sql: &str) -> Result<Statement<'_>, DbError> {
        self.conn.prepare(sql).map_err(|source| DbError::Prepare {
            sql: sql.to_string(),
            source,
        })
    }
}

pub(crate) fn column_meta(stmt: &Statement<'_>) -> Vec<ColumnMeta> {
    stmt.columns()
        .iter()
        .map(|column| ColumnMeta::new(column.name(), column.decl_type()))
        .collect()
}

pub(crate) fn bind_params(stmt: &mut Statement<'_>, params: &[SqlParam]) -> Result<(), DbError> {
    for (offset, param) in params.iter().enumerate() {
        let index = offset + 1;
        stmt.raw_bind_parameter(index, param)
            .map_err(|source| DbError::Bind { index, source })?;
    }
    Ok(())
}

pub(crate) fn read_row(row: &rusqlite::Row<'_>, width: usize) -> Result<Vec<SqlValue>, DbError> {
    let mut values = Vec::with_capacity(width);
    for idx in 0..width {
        let value = row.get_ref(idx).map_err(DbError::Step)?;
        values.push(SqlValue::from(value));
    }
    Ok(values)
}

/// Source of fresh connections. Each caller gets its own connection.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<SqliteConn, DbError>;
}

impl<F> Connector for F
where
    F: Fn() -> Result<SqliteConn, DbError> + Send + Sync,
{
    fn connect(&self) -> Result<SqliteConn, DbError> {
        self()
    }
}

/// Opens a new connection to one database file on every call.
#[derive(Clone, Debug)]
pub struct SqliteConnector {
    path: PathBuf,
    mode: SqliteOpenMode,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, mode: SqliteOpenMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SqliteOpenMode::ReadOnly)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<SqliteConn, DbError> {
        SqliteConn::open(&self.path, self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NativeType;

    fn scratch() -> (tempfile::TempDir, SqliteConn) {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = SqliteConn::open(&dir.path().join("core.db"), SqliteOpenMode::ReadWrite)
            .expect("open");
        (dir, conn)
    }

    #[test]
    fn query_reports_declared_types() {
        let (_dir, conn) = scratch();
        conn.execute_batch(
            "CREATE TABLE SHARE (SERIAL INTEGER, BALANCE DECIMAL(12,2), OPEN_DATE DATE);
             INSERT INTO SHARE VALUES (1, 10.5, '2020-01-02');",
        )
        .expect("schema");
        let result = conn
            .query("SELECT SERIAL, BALANCE, OPEN_DATE FROM SHARE", &[])
            .expect("query");
        assert_eq!(result.columns[0].native, NativeType::Integer);
        assert_eq!(result.columns[1].scale(), Some(2));
        assert_eq!(result.columns[2].native, NativeType::Date);
        assert_eq!(
            result.rows,
            vec![vec![
                SqlValue::Integer(1),
                SqlValue::Real(10.5),
                SqlValue::Text("2020-01-02".to_string()),
            ]]
        );
    }

    #[test]
    fn execute_binds_parameters_in_order() {
        let (_dir, conn) = scratch();
        conn.execute_batch("CREATE TABLE T (A INTEGER, B TEXT)")
            .expect("schema");
        let changed = conn
            .execute(
                "INSERT INTO T VALUES (?, ?)",
                &[SqlParam::Integer(7), SqlParam::Text("x".to_string())],
            )
            .expect("insert");
        assert_eq!(changed, 1);
        let result = conn
            .query("SELECT B FROM T WHERE A = ?", &[SqlParam::Integer(7)])
            .expect("query");
        assert_eq!(result.rows, vec![vec![SqlValue::Text("x".to_string())]]);
    }

    #[test]
    fn malformed_sql_is_a_prepare_error() {
        let (_dir, conn) = scratch();
        let err = conn.query("SELEC nonsense", &[]).unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn read_only_connection_rejects_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("core.db");
        SqliteConn::open(&path, SqliteOpenMode::ReadWrite)
            .expect("create")
            .execute_batch("CREATE TABLE T (A INTEGER)")
            .expect("schema");
        let conn = SqliteConnector::read_only(&path).connect().expect("open");
        assert!(conn.execute("INSERT INTO T VALUES (1)", &[]).is_err());
    }

    #[test]
    fn closure_connectors_are_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("core.db");
        let connector = move || SqliteConn::open(&path, SqliteOpenMode::ReadWrite);
        let conn = Connector::connect(&connector).expect("connect");
        conn.execute_batch("SELECT 1").expect("select");
    }
}
