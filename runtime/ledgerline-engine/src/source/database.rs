use super::{RowSource, SourceState};
use crate::bind::{BindValue, to_params};
use crate::error::EngineError;
use crate::infer::{ColumnType, decode_row, infer_columns};
use crate::row::PositionalRow;
use ledgerline_db::{Connector, QueryStream};
use std::any::Any;
use std::sync::Arc;

/// Streams rows from a parameterised query on a connection of its own.
///
/// Column kinds are inferred from the first result row's metadata and
/// reused for every later row.
pub struct DbRowSource {
    connector: Arc<dyn Connector>,
    sql: String,
    params: Vec<BindValue>,
    stream: Option<QueryStream>,
    column_types: Option<Vec<ColumnType>>,
    state: SourceState,
    produced: usize,
}

impl DbRowSource {
    pub fn new(connector: Arc<dyn Connector>, sql: impl Into<String>) -> Self {
        Self {
            connector,
            sql: sql.into(),
            params: Vec::new(),
            stream: None,
            column_types: None,
            state: SourceState::Pending,
            produced: 0,
        }
    }

    pub fn with_params(mut self, params: Vec<BindValue>) -> Self {
        self.params = params;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    /// Replace every parameter. Only meaningful before the source opens.
    pub fn set_params(&mut self, params: Vec<BindValue>) {
        self.params = params;
    }

    pub fn bind(&mut self, value: impl Into<BindValue>) -> &mut Self {
        self.params.push(value.into());
        self
    }

    /// Bind a value whose type is only known at runtime. Unsupported types
    /// fail here, before the query is prepared.
    pub fn bind_any<T: Any>(&mut self, value: &T) -> Result<&mut Self, EngineError> {
        let position = self.params.len() + 1;
        self.params.push(BindValue::from_any(position, value)?);
        Ok(self)
    }

    /// Inferred column types, once the first row has been read.
    pub fn column_types(&self) -> Option<&[ColumnType]> {
        self.column_types.as_deref()
    }

    pub fn produced(&self) -> usize {
        self.produced
    }
}

impl RowSource for DbRowSource {
    fn open(&mut self) -> Result<(), EngineError> {
        if self.state != SourceState::Pending {
            return Ok(());
        }
        let conn = self.connector.connect()?;
        let stream = QueryStream::open(conn, &self.sql, to_params(&self.params))?;
        tracing::debug!(
            sql = %self.sql,
            params = self.params.len(),
            columns = stream.columns().len(),
            "opened database row source"
        );
        self.stream = Some(stream);
        self.state = SourceState::Open;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<PositionalRow>, EngineError> {
        self.open()?;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let Some(values) = stream.next_row()? else {
            self.close();
            return Ok(None);
        };
        let types = self
            .column_types
            .get_or_insert_with(|| infer_columns(stream.columns()));
        let row = decode_row(types, values)?;
        self.produced += 1;
        Ok(Some(row))
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            tracing::debug!(rows = self.produced, "closed database row source");
        }
        self.state = SourceState::Exhausted;
    }

    fn is_exhausted(&self) -> bool {
        self.state == SourceState::Exhausted
    }
}
