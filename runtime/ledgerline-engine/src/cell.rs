//! Typed cells and the accessor trait that reads them.

use crate::error::EngineError;
use crate::value::{Amount, Rate, Serial, ValueParseError};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Semantic type tag carried by every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Identifier,
    Amount,
    Date,
    Text,
    Rate,
    Timestamp,
    Integer,
}

impl CellKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CellKind::Identifier => "identifier",
            CellKind::Amount => "amount",
            CellKind::Date => "date",
            CellKind::Text => "text",
            CellKind::Rate => "rate",
            CellKind::Timestamp => "timestamp",
            CellKind::Integer => "integer",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cell's kind plus its canonical text, or `None` for SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedCell {
    kind: CellKind,
    raw: Option<String>,
}

impl TypedCell {
    pub fn new(kind: CellKind, raw: Option<String>) -> Self {
        Self { kind, raw }
    }

    pub fn null(kind: CellKind) -> Self {
        Self { kind, raw: None }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Text,
            raw: Some(value.into()),
        }
    }

    /// Build a cell from a domain value.
    pub fn of<T: CellValue>(value: Option<&T>) -> Self {
        Self {
            kind: T::KIND,
            raw: value.map(T::encode),
        }
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Read the cell as `T`. `position` only feeds error messages.
    pub fn decode<T: CellValue>(&self, position: usize) -> Result<Option<T>, EngineError> {
        if !T::accepts(self.kind) {
            return Err(EngineError::TypeMismatch {
                position,
                expected: T::KIND,
                actual: self.kind,
            });
        }
        let Some(raw) = self.raw.as_deref() else {
            return Ok(None);
        };
        T::decode(raw)
            .map(Some)
            .map_err(|_| EngineError::InvalidValue {
                position,
                kind: self.kind,
                value: raw.to_string(),
            })
    }
}

/// A Rust type that can be read out of (and written into) a [`TypedCell`].
pub trait CellValue: Sized {
    const KIND: CellKind;

    /// Whether a cell of `kind` may be read as this type.
    fn accepts(kind: CellKind) -> bool {
        kind == Self::KIND
    }

    fn decode(raw: &str) -> Result<Self, ValueParseError>;

    fn encode(&self) -> String;
}

// Identifier and integer columns share storage, so each reads the other.
impl CellValue for Serial {
    const KIND: CellKind = CellKind::Identifier;

    fn accepts(kind: CellKind) -> bool {
        matches!(kind, CellKind::Identifier | CellKind::Integer)
    }

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        raw.parse()
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

impl CellValue for i64 {
    const KIND: CellKind = CellKind::Integer;

    fn accepts(kind: CellKind) -> bool {
        matches!(kind, CellKind::Integer | CellKind::Identifier)
    }

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        raw.trim()
            .parse()
            .map_err(|_| ValueParseError::new("integer", raw))
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

impl CellValue for Amount {
    const KIND: CellKind = CellKind::Amount;

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        raw.parse()
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

impl CellValue for Rate {
    const KIND: CellKind = CellKind::Rate;

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        raw.parse()
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

impl CellValue for NaiveDate {
    const KIND: CellKind = CellKind::Date;

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map_err(|_| ValueParseError::new("date", raw))
    }

    fn encode(&self) -> String {
        self.format(DATE_FORMAT).to_string()
    }
}

impl CellValue for NaiveDateTime {
    const KIND: CellKind = CellKind::Timestamp;

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        parse_timestamp(raw).ok_or_else(|| ValueParseError::new("timestamp", raw))
    }

    fn encode(&self) -> String {
        self.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl CellValue for String {
    const KIND: CellKind = CellKind::Text;

    fn decode(raw: &str) -> Result<Self, ValueParseError> {
        Ok(raw.to_string())
    }

    fn encode(&self) -> String {
        self.clone()
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated form, or a bare
/// date (midnight).
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
