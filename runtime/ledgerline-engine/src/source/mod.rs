//! Row sources: where the engine pulls its work from.

mod database;
mod file;

pub use database::DbRowSource;
pub use file::FileRowSource;

use crate::error::EngineError;
use crate::row::PositionalRow;

/// A forward-only supply of positional rows.
///
/// `open` is idempotent and runs implicitly on the first `next_row`. Once
/// `next_row` has returned `Ok(None)` the source stays exhausted.
pub trait RowSource: Send {
    fn open(&mut self) -> Result<(), EngineError>;

    fn next_row(&mut self) -> Result<Option<PositionalRow>, EngineError>;

    /// Header names, when the source was opened with a header row.
    fn headers(&self) -> Option<&[String]> {
        None
    }

    /// Release any cursor or buffered rows. Safe to call more than once.
    fn close(&mut self);

    fn is_exhausted(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceState {
    Pending,
    Open,
    Exhausted,
}
