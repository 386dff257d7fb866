//! Map result-set metadata to cell kinds and convert raw store values into
//! typed cells.

use crate::cell::{CellKind, CellValue, TypedCell, parse_timestamp};
use crate::error::EngineError;
use crate::row::PositionalRow;
use crate::value::{Amount, Rate, Serial};
use chrono::NaiveDate;
use ledgerline_db::{ColumnMeta, NativeType, SqlValue};

/// Inferred kind of one result column, with the decimal scale when the
/// declaration carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    pub name: String,
    pub kind: CellKind,
    pub scale: Option<u8>,
}

impl ColumnType {
    pub fn infer(meta: &ColumnMeta) -> Self {
        Self {
            name: meta.name.clone(),
            kind: infer_kind(meta.native),
            scale: meta.scale(),
        }
    }
}

/// Decimal(scale 2) is money; any other decimal or float is a rate.
/// Columns without a usable declaration fall back to text.
pub fn infer_kind(native: NativeType) -> CellKind {
    match native {
        NativeType::Decimal { scale: 2, .. } => CellKind::Amount,
        NativeType::Decimal { .. } | NativeType::Real => CellKind::Rate,
        NativeType::Integer => CellKind::Integer,
        NativeType::Date => CellKind::Date,
        NativeType::Timestamp => CellKind::Timestamp,
        NativeType::Text | NativeType::Blob | NativeType::Unknown => CellKind::Text,
    }
}

pub fn infer_columns(columns: &[ColumnMeta]) -> Vec<ColumnType> {
    columns.iter().map(ColumnType::infer).collect()
}

/// Build a row from one raw result row, using cached column types.
pub fn decode_row(types: &[ColumnType], values: Vec<SqlValue>) -> Result<PositionalRow, EngineError> {
    let mut row = PositionalRow::new();
    for (offset, (column, value)) in types.iter().zip(values).enumerate() {
        let position = offset + 1;
        row.insert(position, decode_cell(column, &value, position)?)?;
    }
    Ok(row)
}

/// Convert one store value into a cell of `column.kind`, normalising its
/// text to the kind's canonical form.
pub fn decode_cell(column: &ColumnType, value: &SqlValue, position: usize) -> Result<TypedCell, EngineError> {
    let invalid = || EngineError::InvalidValue {
        position,
        kind: column.kind,
        value: display_raw(value),
    };
    if value.is_null() {
        return Ok(TypedCell::null(column.kind));
    }
    let raw = match column.kind {
        CellKind::Text => display_raw(value),
        CellKind::Integer | CellKind::Identifier => match value {
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::Real(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                (*v as i64).to_string()
            }
            SqlValue::Text(text) => text.trim().parse::<Serial>().map_err(|_| invalid())?.encode(),
            _ => return Err(invalid()),
        },
        CellKind::Amount => match value {
            SqlValue::Integer(v) => v
                .checked_mul(100)
                .map(Amount::from_cents)
                .ok_or_else(invalid)?
                .encode(),
            SqlValue::Real(v) => Amount::from_f64(*v).ok_or_else(invalid)?.encode(),
            SqlValue::Text(text) => text.parse::<Amount>().map_err(|_| invalid())?.encode(),
            _ => return Err(invalid()),
        },
        CellKind::Rate => decode_rate(value, column.scale).ok_or_else(invalid)?.encode(),
        CellKind::Date => match value {
            SqlValue::Text(text) => {
                let text = text.trim();
                let day = text.get(..10).unwrap_or(text);
                NaiveDate::decode(day).map_err(|_| invalid())?.encode()
            }
            _ => return Err(invalid()),
        },
        CellKind::Timestamp => match value {
            SqlValue::Text(text) => parse_timestamp(text).ok_or_else(invalid)?.encode(),
            _ => return Err(invalid()),
        },
    };
    Ok(TypedCell::new(column.kind, Some(raw)))
}

fn decode_rate(value: &SqlValue, scale: Option<u8>) -> Option<Rate> {
    let rate = match value {
        SqlValue::Integer(v) => Rate::from_int(*v),
        // Without a declared scale, keep the shortest text that round-trips,
        // rounding when that text needs more places than a rate holds.
        SqlValue::Real(v) => match scale {
            Some(scale) => return Rate::from_f64(*v, scale),
            None => v
                .to_string()
                .parse()
                .ok()
                .or_else(|| Rate::from_f64_rounded(*v))?,
        },
        SqlValue::Text(text) => text.parse().ok()?,
        _ => return None,
    };
    match scale {
        Some(scale) if scale > rate.scale() => rate.rescale(scale),
        _ => Some(rate),
    }
}

fn display_raw(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) => v.to_string(),
        SqlValue::Text(text) => text.clone(),
        SqlValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn column(decl: Option<&str>) -> ColumnType {
        ColumnType::infer(&ColumnMeta::new("C", decl))
    }

    #[test]
    fn kind_follows_declared_type() {
        assert_eq!(column(Some("DECIMAL(12,2)")).kind, CellKind::Amount);
        assert_eq!(column(Some("DECIMAL(7,3)")).kind, CellKind::Rate);
        assert_eq!(column(Some("DOUBLE")).kind, CellKind::Rate);
        assert_eq!(column(Some("BIGINT")).kind, CellKind::Integer);
        assert_eq!(column(Some("DATE")).kind, CellKind::Date);
        assert_eq!(column(Some("TIMESTAMP")).kind, CellKind::Timestamp);
        assert_eq!(column(Some("VARCHAR(10)")).kind, CellKind::Text);
        assert_eq!(column(None).kind, CellKind::Text);
    }

    #[test]
    fn amounts_normalise_to_two_places() {
        let money = column(Some("DECIMAL(12,2)"));
        let cell = decode_cell(&money, &SqlValue::Real(10.5), 1).unwrap();
        assert_eq!(cell.raw(), Some("10.50"));
        let cell = decode_cell(&money, &SqlValue::Integer(3), 1).unwrap();
        assert_eq!(cell.raw(), Some("3.00"));
    }

    #[test]
    fn rates_keep_declared_scale() {
        let rate = column(Some("NUMERIC(7,3)"));
        let cell = decode_cell(&rate, &SqlValue::Real(1.25), 2).unwrap();
        assert_eq!(cell.raw(), Some("1.250"));
        let float = column(Some("REAL"));
        let cell = decode_cell(&float, &SqlValue::Real(0.125), 2).unwrap();
        assert_eq!(cell.raw(), Some("0.125"));
    }

    #[test]
    fn undeclared_real_scale_is_rounded_to_fit() {
        let float = column(Some("REAL"));
        let cell = decode_cell(&float, &SqlValue::Real(1e-10), 1).unwrap();
        assert_eq!(cell.raw(), Some("0"));
        let cell = decode_cell(&float, &SqlValue::Real(0.00123456789012), 1).unwrap();
        assert_eq!(cell.raw(), Some("0.001234568"));
        let cell = decode_cell(&float, &SqlValue::Real(12345678901.5), 1).unwrap();
        assert_eq!(cell.raw(), Some("12345678901.5"));
    }

    #[test]
    fn reals_beyond_the_rate_range_are_invalid() {
        let err = decode_cell(&column(Some("REAL")), &SqlValue::Real(1e20), 3).unwrap_err();
        assert!(matches!(err, EngineError::InvalidValue { position: 3, .. }));
    }

    #[test]
    fn dates_accept_a_trailing_time() {
        let date = column(Some("DATE"));
        let cell = decode_cell(&date, &SqlValue::Text("2020-01-02 00:00:00".into()), 1).unwrap();
        assert_eq!(cell.raw(), Some("2020-01-02"));
    }

    #[test]
    fn nulls_keep_their_column_kind() {
        let cell = decode_cell(&column(Some("DATE")), &SqlValue::Null, 1).unwrap();
        assert_eq!(cell.kind(), CellKind::Date);
        assert!(cell.is_null());
    }

    #[test]
    fn unparseable_store_value_is_invalid() {
        let err = decode_cell(&column(Some("DATE")), &SqlValue::Integer(5), 4).unwrap_err();
        assert!(matches!(err, EngineError::InvalidValue { position: 4, .. }));
    }

    #[test]
    fn decode_row_numbers_columns_from_one() {
        let types = vec![column(Some("INTEGER")), column(Some("TEXT"))];
        let row = decode_row(
            &types,
            vec![SqlValue::Integer(7), SqlValue::Text("seven".into())],
        )
        .unwrap();
        assert_eq!(row.get::<i64>(1).unwrap(), Some(7));
        assert_eq!(row.get::<String>(2).unwrap(), Some("seven".to_string()));
    }
}
