//! Column metadata derived from declared column types.

/// Native storage class of a result column, parsed from its declared type.
///
/// SQLite keeps the declaration text verbatim, so `DECIMAL(12,2)` survives
/// into result metadata even though the stored value is an integer or real.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    /// INTEGER, INT, BIGINT, SMALLINT, TINYINT
    Integer,
    /// DECIMAL(p, s) / NUMERIC(p, s)
    Decimal { precision: u8, scale: u8 },
    /// REAL, FLOAT, DOUBLE
    Real,
    Date,
    /// TIMESTAMP, DATETIME
    Timestamp,
    /// CHAR, VARCHAR, TEXT, CLOB
    Text,
    Blob,
    /// Expression columns and anything this parser does not recognise.
    Unknown,
}

impl NativeType {
    /// Parse a declared column type such as `VARCHAR(20)` or `DECIMAL(12, 2)`.
    pub fn parse(decl: &str) -> Self {
        let upper = decl.trim().to_uppercase();
        let (base, params) = match upper.find('(') {
            Some(idx) => {
                let end = upper.rfind(')').unwrap_or(upper.len());
                (upper[..idx].trim(), Some(&upper[idx + 1..end.max(idx + 1)]))
            }
            None => (upper.as_str(), None),
        };

        match base {
            "DECIMAL" | "DEC" | "NUMERIC" | "NUM" | "NUMBER" => {
                let (precision, scale) = params.map(parse_precision).unwrap_or((0, 0));
                NativeType::Decimal { precision, scale }
            }
            "MONEY" => NativeType::Decimal {
                precision: 19,
                scale: 2,
            },
            "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "INT2"
            | "INT8" => NativeType::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => NativeType::Real,
            "DATE" => NativeType::Date,
            "TIMESTAMP" | "DATETIME" => NativeType::Timestamp,
            "BLOB" | "BINARY" | "VARBINARY" => NativeType::Blob,
            "" => NativeType::Unknown,
            other => {
                if other.contains("CHAR") || other.contains("TEXT") || other.contains("CLOB") {
                    NativeType::Text
                } else {
                    NativeType::Unknown
                }
            }
        }
    }

    /// Decimal scale, when the type carries one.
    pub fn scale(&self) -> Option<u8> {
        match self {
            NativeType::Decimal { scale, .. } => Some(*scale),
            _ => None,
        }
    }
}

fn parse_precision(params: &str) -> (u8, u8) {
    let mut parts = params.split(',');
    let precision = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);
    let scale = parts.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
    (precision, scale)
}

/// Name and declared type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub decl_type: Option<String>,
    pub native: NativeType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, decl_type: Option<&str>) -> Self {
        let native = decl_type.map(NativeType::parse).unwrap_or(NativeType::Unknown);
        Self {
            name: name.into(),
            decl_type: decl_type.map(str::to_string),
            native,
        }
    }

    pub fn scale(&self) -> Option<u8> {
        self.native.scale()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_decimal_with_scale() {
        assert_eq!(
            NativeType::parse("DECIMAL(12, 2)"),
            NativeType::Decimal {
                precision: 12,
                scale: 2
            }
        );
        assert_eq!(
            NativeType::parse("numeric(7,3)"),
            NativeType::Decimal {
                precision: 7,
                scale: 3
            }
        );
    }

    #[test]
    fn parse_decimal_without_params_has_zero_scale() {
        assert_eq!(NativeType::parse("NUMERIC").scale(), Some(0));
    }

    #[test]
    fn parse_simple_types() {
        assert_eq!(NativeType::parse("INTEGER"), NativeType::Integer);
        assert_eq!(NativeType::parse("bigint"), NativeType::Integer);
        assert_eq!(NativeType::parse("DATE"), NativeType::Date);
        assert_eq!(NativeType::parse("DATETIME"), NativeType::Timestamp);
        assert_eq!(NativeType::parse("VARCHAR(40)"), NativeType::Text);
        assert_eq!(NativeType::parse("REAL"), NativeType::Real);
        assert_eq!(NativeType::parse("BLOB"), NativeType::Blob);
        assert_eq!(NativeType::parse("GEOMETRY"), NativeType::Unknown);
    }

    #[test]
    fn column_without_declaration_is_unknown() {
        let meta = ColumnMeta::new("ACCOUNT_NUMBER", None);
        assert_eq!(meta.native, NativeType::Unknown);
        assert_eq!(meta.scale(), None);
    }

    proptest! {
        #[test]
        fn decimal_declarations_keep_precision_and_scale(
            keyword in prop::sample::select(vec!["DECIMAL", "decimal", "NUMERIC", "Dec", "NUM"]),
            precision in 1u8..=38,
            scale_seed in any::<u8>(),
            pad in prop::sample::select(vec!["", " ", "  "]),
        ) {
            let scale = scale_seed % (precision + 1);
            let decl = format!("{keyword}({pad}{precision}{pad},{pad}{scale}{pad})");
            let native = NativeType::parse(&decl);
            prop_assert_eq!(native, NativeType::Decimal { precision, scale });
            prop_assert_eq!(ColumnMeta::new("C", Some(decl.as_str())).scale(), Some(scale));
        }
    }
}
