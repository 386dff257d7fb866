//! Row-driven batch task engine.
//!
//! A [`TaskEngine`] pulls [`PositionalRow`]s from a [`RowSource`] (a SQL
//! query or a delimited file), hands each row to a fresh [`WorkUnit`] on a
//! worker thread, and collects what the units write in named reports owned
//! by a [`ReportAggregator`].

pub mod args;
pub mod bind;
pub mod cell;
pub mod delimited;
pub mod engine;
pub mod error;
pub mod infer;
pub mod query;
pub mod report;
pub mod row;
pub mod source;
pub mod task;
pub mod value;

pub use args::ArgumentIterator;
pub use bind::{BindValue, bind_list, placeholders};
pub use cell::{CellKind, CellValue, TypedCell};
pub use delimited::{Delimiter, format_row};
pub use engine::{EngineConfig, RunSummary, TaskEngine};
pub use error::{EngineError, EngineResult};
pub use infer::ColumnType;
pub use query::QueryRun;
pub use report::{
    DirectoryHost, MemoryHost, Operation, PostingMode, Record, Report, ReportAggregator, ReportHost, ReportKind,
    Sequence, Step, Transaction,
};
pub use row::PositionalRow;
pub use source::{DbRowSource, FileRowSource, RowSource};
pub use task::{NoHooks, RunContext, RunHooks, TaskContext, WorkUnit};
pub use value::{Amount, Rate, Serial};
