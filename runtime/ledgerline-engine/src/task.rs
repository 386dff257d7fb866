//! The work unit contract and the context each unit runs in.

use crate::bind::BindValue;
use crate::cell::CellValue;
use crate::error::EngineError;
use crate::query::QueryRun;
use crate::report::ReportAggregator;
use crate::row::PositionalRow;
use chrono::NaiveDate;
use ledgerline_db::{Connector, SqliteConn};
use std::sync::Arc;

/// Business logic for one input row.
///
/// `perform` runs first. If it enabled output on the context, `output`
/// runs next on the same thread; that is where a unit writes to reports.
pub trait WorkUnit: Send {
    fn perform(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;

    fn output(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;
}

/// State shared by every unit of one run.
pub(crate) struct RunShared {
    pub(crate) connector: Option<Arc<dyn Connector>>,
    pub(crate) reports: Arc<ReportAggregator>,
    pub(crate) headers: Option<Vec<String>>,
}

pub struct TaskContext<'run> {
    row: PositionalRow,
    row_index: usize,
    output: bool,
    connection: Option<SqliteConn>,
    run: &'run RunShared,
}

impl<'run> TaskContext<'run> {
    pub(crate) fn new(row: PositionalRow, row_index: usize, run: &'run RunShared) -> Self {
        Self {
            row,
            row_index,
            output: false,
            connection: None,
            run,
        }
    }

    /// 1-based dispatch order of this unit's row.
    pub fn row_index(&self) -> usize {
        self.row_index
    }

    pub fn row(&self) -> &PositionalRow {
        &self.row
    }

    pub fn row_mut(&mut self) -> &mut PositionalRow {
        &mut self.row
    }

    pub fn get<T: CellValue>(&self, position: usize) -> Result<Option<T>, EngineError> {
        self.row.get(position)
    }

    pub fn require<T: CellValue>(&self, position: usize) -> Result<T, EngineError> {
        self.row.require(position)
    }

    pub fn next_value<T: CellValue>(&mut self) -> Result<Option<T>, EngineError> {
        self.row.next_value()
    }

    pub fn next_required<T: CellValue>(&mut self) -> Result<T, EngineError> {
        self.row.next_required()
    }

    pub fn enable_output(&mut self) {
        self.output = true;
    }

    pub fn disable_output(&mut self) {
        self.output = false;
    }

    pub fn output_enabled(&self) -> bool {
        self.output
    }

    /// This unit's own connection, opened on first use and closed when the
    /// unit finishes.
    pub fn connection(&mut self) -> Result<&SqliteConn, EngineError> {
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => self
                .run
                .connector
                .as_ref()
                .ok_or(EngineError::NoConnector)?
                .connect()?,
        };
        Ok(&*self.connection.insert(conn))
    }

    /// Run a lookup on this unit's connection.
    pub fn query(&mut self, sql: &str, params: &[BindValue]) -> Result<QueryRun, EngineError> {
        QueryRun::open(self.connection()?, sql, params)
    }

    pub fn query_first(&mut self, sql: &str, params: &[BindValue]) -> Result<Option<PositionalRow>, EngineError> {
        QueryRun::first(self.connection()?, sql, params)
    }

    pub fn reports(&self) -> &ReportAggregator {
        &self.run.reports
    }

    pub fn posting_date(&self) -> NaiveDate {
        self.run.reports.posting_date()
    }

    /// Header names of a file source, 0-based.
    pub fn headers(&self) -> Result<&[String], EngineError> {
        self.run.headers.as_deref().ok_or(EngineError::MissingHeaders)
    }

    pub fn header(&self, index: usize) -> Result<&str, EngineError> {
        self.headers()?
            .get(index)
            .map(String::as_str)
            .ok_or(EngineError::MissingColumn {
                position: index + 1,
            })
    }
}

/// Context for the hooks that run on the dispatch thread before the first
/// row is fetched and after the last unit finishes.
pub struct RunContext {
    connector: Option<Arc<dyn Connector>>,
    connection: Option<SqliteConn>,
    reports: Arc<ReportAggregator>,
    dispatched: usize,
}

impl RunContext {
    pub(crate) fn new(connector: Option<Arc<dyn Connector>>, reports: Arc<ReportAggregator>) -> Self {
        Self {
            connector,
            connection: None,
            reports,
            dispatched: 0,
        }
    }

    pub fn connection(&mut self) -> Result<&SqliteConn, EngineError> {
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => self
                .connector
                .as_ref()
                .ok_or(EngineError::NoConnector)?
                .connect()?,
        };
        Ok(&*self.connection.insert(conn))
    }

    pub fn query(&mut self, sql: &str, params: &[BindValue]) -> Result<QueryRun, EngineError> {
        QueryRun::open(self.connection()?, sql, params)
    }

    pub fn reports(&self) -> &ReportAggregator {
        &self.reports
    }

    pub fn posting_date(&self) -> NaiveDate {
        self.reports.posting_date()
    }

    /// Units dispatched so far; final in `after_run`.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub(crate) fn set_dispatched(&mut self, dispatched: usize) {
        self.dispatched = dispatched;
    }

    /// Release the hook connection before the units start.
    pub(crate) fn release_connection(&mut self) {
        self.connection = None;
    }
}

/// Optional run-level hooks around the dispatch loop.
pub trait RunHooks<S> {
    /// Runs before the source is opened; may adjust the source, e.g. to
    /// bind query parameters resolved from the database.
    fn before_run(&mut self, _ctx: &mut RunContext, _source: &mut S) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after every unit has finished and before reports are closed.
    fn after_run(&mut self, _ctx: &mut RunContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<S> RunHooks<S> for NoHooks {}
