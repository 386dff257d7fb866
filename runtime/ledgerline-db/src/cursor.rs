//! Streaming query cursor.
//!
//! `rusqlite` rows borrow their statement, which borrows its connection, so
//! a cursor that outlives the call that opened it cannot be stored next to
//! its connection. The stream instead moves the connection onto a dedicated
//! thread that prepares, binds and steps the statement, handing rows back
//! over a bounded channel. Dropping the stream drops the receiver; the
//! producer notices on its next send and releases the statement.

use crate::sqlite::{bind_params, column_meta, read_row};
use crate::{ColumnMeta, DbError, SqlParam, SqlValue, SqliteConn};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::thread::{self, JoinHandle};

const ROW_BUFFER: usize = 64;

type RowMessage = Result<Vec<SqlValue>, DbError>;

/// An open, forward-only result cursor.
pub struct QueryStream {
    columns: Vec<ColumnMeta>,
    rows: Option<Receiver<RowMessage>>,
    worker: Option<JoinHandle<()>>,
    fetched: usize,
}

impl QueryStream {
    /// Prepare and execute `sql` on `conn`. Fails before any row is read if
    /// the statement cannot be prepared or a parameter cannot be bound.
    pub fn open(conn: SqliteConn, sql: &str, params: Vec<SqlParam>) -> Result<Self, DbError> {
        let (meta_tx, meta_rx) = bounded::<Result<Vec<ColumnMeta>, DbError>>(1);
        let (row_tx, row_rx) = bounded::<RowMessage>(ROW_BUFFER);
        let sql = sql.to_string();
        let worker = thread::Builder::new()
            .name("ledgerline-cursor".to_string())
            .spawn(move || stream_rows(conn, sql, params, meta_tx, row_tx))
            .map_err(DbError::Spawn)?;

        match meta_rx.recv() {
            Ok(Ok(columns)) => Ok(Self {
                columns,
                rows: Some(row_rx),
                worker: Some(worker),
                fetched: 0,
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(DbError::CursorGone)
            }
        }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Advance the cursor. Returns `Ok(None)` once the result set is
    /// exhausted; the statement is released at that point and every later
    /// call also returns `Ok(None)`.
    pub fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>, DbError> {
        let Some(rows) = self.rows.as_ref() else {
            return Ok(None);
        };
        match rows.recv() {
            Ok(Ok(row)) => {
                self.fetched += 1;
                Ok(Some(row))
            }
            Ok(Err(err)) => {
                self.close();
                Err(err)
            }
            Err(_) => {
                tracing::debug!(rows = self.fetched, "cursor exhausted");
                self.close();
                Ok(None)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }

    /// Number of rows handed out so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Release the statement and its connection. Idempotent.
    pub fn close(&mut self) {
        self.rows = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn stream_rows(
    conn: SqliteConn,
    sql: String,
    params: Vec<SqlParam>,
    meta_tx: Sender<Result<Vec<ColumnMeta>, DbError>>,
    row_tx: Sender<RowMessage>,
) {
    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = meta_tx.send(Err(err));
            return;
        }
    };
    let columns = column_meta(&stmt);
    let width = columns.len();
    if let Err(err) = bind_params(&mut stmt, &params) {
        let _ = meta_tx.send(Err(err));
        return;
    }
    if meta_tx.send(Ok(columns)).is_err() {
        return;
    }

    let mut rows = stmt.raw_query();
    loop {
        let message = match rows.next() {
            Ok(Some(row)) => read_row(row, width),
            Ok(None) => return,
            Err(source) => Err(DbError::Step(source)),
        };
        let failed = message.is_err();
        if row_tx.send(message).is_err() || failed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteOpenMode;

    fn seeded(rows: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("core.db");
        let conn = SqliteConn::open(&path, SqliteOpenMode::ReadWrite).expect("open");
        conn.execute_batch("CREATE TABLE T (ID INTEGER, NAME TEXT)")
            .expect("schema");
        for id in 0..rows {
            conn.execute(
                "INSERT INTO T VALUES (?, ?)",
                &[SqlParam::Integer(id as i64), SqlParam::Text(format!("n{id}"))],
            )
            .expect("insert");
        }
        (dir, path)
    }

    #[test]
    fn stream_yields_every_row_then_closes() {
        let (_dir, path) = seeded(150);
        let conn = SqliteConn::open_read_only(&path).expect("open");
        let mut stream =
            QueryStream::open(conn, "SELECT ID, NAME FROM T ORDER BY ID", Vec::new())
                .expect("stream");
        assert_eq!(stream.columns().len(), 2);
        let mut seen = 0i64;
        while let Some(row) = stream.next_row().expect("row") {
            assert_eq!(row[0], SqlValue::Integer(seen));
            seen += 1;
        }
        assert_eq!(seen, 150);
        assert!(stream.is_closed());
        assert_eq!(stream.next_row().expect("after end"), None);
    }

    #[test]
    fn empty_result_still_reports_columns() {
        let (_dir, path) = seeded(0);
        let conn = SqliteConn::open_read_only(&path).expect("open");
        let mut stream = QueryStream::open(
            conn,
            "SELECT ID, NAME FROM T WHERE ID = ?",
            vec![SqlParam::Integer(99)],
        )
        .expect("stream");
        assert_eq!(stream.columns()[1].name, "NAME");
        assert_eq!(stream.next_row().expect("row"), None);
    }

    #[test]
    fn prepare_failure_surfaces_from_open() {
        let (_dir, path) = seeded(1);
        let conn = SqliteConn::open_read_only(&path).expect("open");
        let err = QueryStream::open(conn, "SELECT FROM WHERE", Vec::new())
            .err()
            .expect("prepare error");
        assert!(err.is_query_error());
    }

    #[test]
    fn dropping_a_partially_read_stream_releases_the_producer() {
        let (_dir, path) = seeded(500);
        let conn = SqliteConn::open_read_only(&path).expect("open");
        let mut stream = QueryStream::open(conn, "SELECT ID FROM T", Vec::new()).expect("stream");
        stream.next_row().expect("first").expect("row");
        drop(stream);
    }
}
