use crate::cell::CellKind;
use crate::report::ReportKind;
use ledgerline_db::DbError;
use std::path::PathBuf;

/// Every failure the engine can surface. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("column {position} holds {actual}, not {expected}")]
    TypeMismatch {
        position: usize,
        expected: CellKind,
        actual: CellKind,
    },
    #[error("column {position} is not populated")]
    MissingColumn { position: usize },
    #[error("column {position} is already populated")]
    DuplicateColumn { position: usize },
    #[error("column {position} ({kind}) is null")]
    NullValue { position: usize, kind: CellKind },
    #[error("column {position} holds `{value}`, which is not a valid {kind}")]
    InvalidValue {
        position: usize,
        kind: CellKind,
        value: String,
    },

    #[error("query failed: {source}")]
    Query {
        #[source]
        source: DbError,
    },
    #[error(transparent)]
    Database(DbError),
    #[error("parameter {position} has unsupported type {type_name}")]
    ParameterBinding {
        position: usize,
        type_name: &'static str,
    },
    #[error("no database connector is configured for this run")]
    NoConnector,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("row source was opened without a header row")]
    MissingHeaders,

    #[error("report `{title}` already exists")]
    DuplicateReport { title: String },
    #[error("report `{title}` is closed")]
    ReportClosed { title: String },
    #[error("report `{title}` is a {actual} report, not {expected}")]
    ReportKindMismatch {
        title: String,
        expected: ReportKind,
        actual: ReportKind,
    },
    #[error("report `{title}` has not been opened")]
    UnknownReport { title: String },
    #[error("report `{title}` could not be written: {source}")]
    ReportIo {
        title: String,
        #[source]
        source: std::io::Error,
    },

    #[error("insufficient number of arguments provided, expected {expected}")]
    InsufficientArguments { expected: &'static str },
    #[error("blank {expected} argument")]
    BlankArgument { expected: &'static str },
    #[error("invalid {expected} argument `{value}`")]
    InvalidArgumentFormat {
        expected: &'static str,
        value: String,
    },

    #[error("{stage} hook failed: {cause:#}")]
    Hook {
        stage: &'static str,
        cause: anyhow::Error,
    },
    #[error("work unit for row {row_index} failed: {cause:#}")]
    TaskFailed {
        row_index: usize,
        cause: anyhow::Error,
    },
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        if err.is_query_error() {
            EngineError::Query { source: err }
        } else {
            EngineError::Database(err)
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
