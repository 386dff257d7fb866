//! Delimited text files: tokenising lines and rendering export rows.

use crate::error::EngineError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Pipe,
    Tab,
    Colon,
    /// Each line is a single one-column row.
    None,
}

impl Delimiter {
    pub fn as_char(self) -> Option<char> {
        match self {
            Delimiter::Comma => Some(','),
            Delimiter::Pipe => Some('|'),
            Delimiter::Tab => Some('\t'),
            Delimiter::Colon => Some(':'),
            Delimiter::None => None,
        }
    }

    /// Pipe-delimited lines split on every pipe; the others ignore
    /// separators that fall inside double quotes.
    pub fn quote_aware(self) -> bool {
        !matches!(self, Delimiter::Pipe | Delimiter::None)
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Delimiter::Comma => "comma",
            Delimiter::Pipe => "pipe",
            Delimiter::Tab => "tab",
            Delimiter::Colon => "colon",
            Delimiter::None => "none",
        })
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comma" | "," => Ok(Delimiter::Comma),
            "pipe" | "|" => Ok(Delimiter::Pipe),
            "tab" | "\\t" | "\t" => Ok(Delimiter::Tab),
            "colon" | ":" => Ok(Delimiter::Colon),
            "none" | "line" => Ok(Delimiter::None),
            other => Err(format!("unknown delimiter `{other}`")),
        }
    }
}

/// Split one line into fields.
///
/// A quote-aware delimiter only separates when an even number of double
/// quotes follows it on the line; double quotes are then removed from
/// every field. Trailing empty fields are kept.
pub fn split_line(line: &str, delimiter: Delimiter) -> Vec<String> {
    let Some(sep) = delimiter.as_char() else {
        return vec![line.to_string()];
    };
    if !delimiter.quote_aware() {
        return line.split(sep).map(|field| field.replace('"', "")).collect();
    }

    let mut quotes_left = line.matches('"').count();
    let mut fields = Vec::new();
    let mut field = String::new();
    for ch in line.chars() {
        if ch == '"' {
            quotes_left -= 1;
        } else if ch == sep && quotes_left % 2 == 0 {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(ch);
        }
    }
    fields.push(field);
    fields
}

/// Header (if requested) plus every non-blank data line, tokenised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelimitedFile {
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

/// Tokenise already-loaded text. With `has_header`, the first non-blank
/// line becomes the header list instead of a data row.
pub fn parse_str(text: &str, delimiter: Delimiter, has_header: bool) -> DelimitedFile {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let headers = if has_header {
        lines.next().map(|line| split_line(line, delimiter))
    } else {
        None
    };
    let rows = lines.map(|line| split_line(line, delimiter)).collect();
    DelimitedFile { headers, rows }
}

/// Read and tokenise the whole file before returning.
pub fn read_file(path: &Path, delimiter: Delimiter, has_header: bool) -> Result<DelimitedFile, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = parse_str(&text, delimiter, has_header);
    tracing::debug!(
        path = %path.display(),
        %delimiter,
        rows = parsed.rows.len(),
        "parsed delimited file"
    );
    Ok(parsed)
}

/// Render one comma-separated export line. Embedded quotes are doubled
/// and fields containing a comma are wrapped in quotes; `None` renders as
/// an empty field.
pub fn format_row<S: AsRef<str>>(values: &[Option<S>]) -> String {
    let mut line = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            line.push(',');
        }
        let Some(value) = value else {
            continue;
        };
        let escaped = value.as_ref().replace('"', "\"\"");
        if escaped.contains(',') {
            line.push('"');
            line.push_str(&escaped);
            line.push('"');
        } else {
            line.push_str(&escaped);
        }
    }
    line
}

/// [`format_row`] for values that are all present.
pub fn format_fields<S: AsRef<str>>(values: &[S]) -> String {
    let wrapped: Vec<Option<&str>> = values.iter().map(|v| Some(v.as_ref())).collect();
    format_row(&wrapped)
}
