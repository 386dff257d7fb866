use crate::cell::{CellKind, CellValue, TypedCell};
use crate::error::EngineError;
use std::collections::BTreeMap;

/// One input row: typed cells keyed by 1-based column position, plus a
/// read cursor for sequential access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalRow {
    cells: BTreeMap<usize, TypedCell>,
    cursor: usize,
}

impl Default for PositionalRow {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionalRow {
    pub fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
            cursor: 1,
        }
    }

    /// Every field of a delimited line becomes a text cell, in order.
    pub fn from_text<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| (offset + 1, TypedCell::text(value)))
            .collect();
        Self { cells, cursor: 1 }
    }

    /// Place `cell` at `position`. Each position is populated at most once.
    pub fn insert(&mut self, position: usize, cell: TypedCell) -> Result<(), EngineError> {
        if position == 0 {
            return Err(EngineError::MissingColumn { position });
        }
        if self.cells.contains_key(&position) {
            return Err(EngineError::DuplicateColumn { position });
        }
        self.cells.insert(position, cell);
        Ok(())
    }

    /// Append after the highest populated position.
    pub fn push(&mut self, cell: TypedCell) {
        let position = self.cells.keys().next_back().map_or(1, |last| last + 1);
        self.cells.insert(position, cell);
    }

    pub fn cell(&self, position: usize) -> Result<&TypedCell, EngineError> {
        self.cells
            .get(&position)
            .ok_or(EngineError::MissingColumn { position })
    }

    /// Read the cell at `position` as `T`; SQL NULL reads as `None`.
    pub fn get<T: CellValue>(&self, position: usize) -> Result<Option<T>, EngineError> {
        self.cell(position)?.decode(position)
    }

    /// Like [`get`](Self::get), but NULL is an error.
    pub fn require<T: CellValue>(&self, position: usize) -> Result<T, EngineError> {
        self.get(position)?.ok_or(EngineError::NullValue {
            position,
            kind: T::KIND,
        })
    }

    /// Read the cell under the cursor as `T` and advance. The cursor moves
    /// even when the read fails.
    pub fn next_value<T: CellValue>(&mut self) -> Result<Option<T>, EngineError> {
        let position = self.cursor;
        self.cursor += 1;
        self.get(position)
    }

    pub fn next_required<T: CellValue>(&mut self) -> Result<T, EngineError> {
        let position = self.cursor;
        self.cursor += 1;
        self.require(position)
    }

    pub fn skip(&mut self, columns: usize) {
        self.cursor += columns;
    }

    /// Position the next sequential read will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 1;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn kinds(&self) -> Vec<CellKind> {
        self.cells.values().map(TypedCell::kind).collect()
    }

    /// Cells in position order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &TypedCell)> {
        self.cells.iter().map(|(position, cell)| (*position, cell))
    }

    /// Raw text of every cell in position order, for re-export.
    pub fn raw_values(&self) -> Vec<Option<&str>> {
        self.cells.values().map(TypedCell::raw).collect()
    }
}
