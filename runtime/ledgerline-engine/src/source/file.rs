use super::{RowSource, SourceState};
use crate::delimited::{self, DelimitedFile, Delimiter};
use crate::error::EngineError;
use crate::row::PositionalRow;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Rows from a delimited file. The file is read and tokenised in full on
/// open; every cell is text.
pub struct FileRowSource {
    input: Input,
    delimiter: Delimiter,
    has_header: bool,
    headers: Option<Vec<String>>,
    rows: VecDeque<Vec<String>>,
    state: SourceState,
}

enum Input {
    Path(PathBuf),
    Text(String),
}

impl FileRowSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: Delimiter, has_header: bool) -> Self {
        Self::with_input(Input::Path(path.into()), delimiter, has_header)
    }

    /// Parse in-memory text instead of a file.
    pub fn from_text(text: impl Into<String>, delimiter: Delimiter, has_header: bool) -> Self {
        Self::with_input(Input::Text(text.into()), delimiter, has_header)
    }

    fn with_input(input: Input, delimiter: Delimiter, has_header: bool) -> Self {
        Self {
            input,
            delimiter,
            has_header,
            headers: None,
            rows: VecDeque::new(),
            state: SourceState::Pending,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.input {
            Input::Path(path) => Some(path.as_path()),
            Input::Text(_) => None,
        }
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    /// Rows parsed but not yet handed out.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for FileRowSource {
    fn open(&mut self) -> Result<(), EngineError> {
        if self.state != SourceState::Pending {
            return Ok(());
        }
        let DelimitedFile { headers, rows } = match &self.input {
            Input::Path(path) => delimited::read_file(path, self.delimiter, self.has_header)?,
            Input::Text(text) => delimited::parse_str(text, self.delimiter, self.has_header),
        };
        self.headers = headers;
        self.rows = rows.into();
        self.state = SourceState::Open;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<PositionalRow>, EngineError> {
        self.open()?;
        match self.rows.pop_front() {
            Some(fields) => Ok(Some(PositionalRow::from_text(fields))),
            None => {
                self.state = SourceState::Exhausted;
                Ok(None)
            }
        }
    }

    fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }

    fn close(&mut self) {
        self.rows.clear();
        self.state = SourceState::Exhausted;
    }

    fn is_exhausted(&self) -> bool {
        self.state == SourceState::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellKind;
    use std::io::Write;

    #[test]
    fn header_is_not_a_data_row() {
        let mut source = FileRowSource::from_text("ACCOUNT,AMOUNT\n0001,5.00\n0002,7.25\n", Delimiter::Comma, true);
        source.open().unwrap();
        assert_eq!(
            source.headers(),
            Some(&["ACCOUNT".to_string(), "AMOUNT".to_string()][..])
        );
        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.require::<String>(1).unwrap(), "0001");
        assert_eq!(row.kinds(), vec![CellKind::Text, CellKind::Text]);
        assert!(source.next_row().unwrap().is_some());
        assert!(source.next_row().unwrap().is_none());
        assert!(source.is_exhausted());
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a|b").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "c|d").unwrap();
        let mut source = FileRowSource::new(file.path(), Delimiter::Pipe, false);
        let mut count = 0;
        while source.next_row().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(source.headers(), None);
    }

    #[test]
    fn unreadable_path_is_an_io_error() {
        let mut source = FileRowSource::new("/nonexistent/rows.csv", Delimiter::Comma, false);
        match source.next_row() {
            Err(EngineError::Io { path, .. }) => assert_eq!(path, Path::new("/nonexistent/rows.csv")),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn line_mode_yields_single_column_rows() {
        let mut source = FileRowSource::from_text("HEADER\nfirst, line\n", Delimiter::None, true);
        let row = source.next_row().unwrap().unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row.require::<String>(1).unwrap(), "first, line");
        assert_eq!(source.headers(), Some(&["HEADER".to_string()][..]));
    }
}
