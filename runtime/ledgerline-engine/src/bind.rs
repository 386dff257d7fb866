//! Query bind values.

use crate::cell::{DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::error::EngineError;
use crate::value::{Amount, Rate, Serial};
use chrono::{NaiveDate, NaiveDateTime};
use ledgerline_db::SqlParam;
use std::any::{Any, type_name};

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Decimal(f64),
    Amount(Amount),
    Rate(Rate),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Integer(i64),
    Text(String),
    Identifier(Serial),
}

impl BindValue {
    /// Lower a dynamically typed value. This is the one binding path that
    /// can meet a type with no SQL mapping.
    pub fn from_any<T: Any>(position: usize, value: &T) -> Result<Self, EngineError> {
        let value = value as &dyn Any;
        macro_rules! try_downcast {
            ($($ty:ty => $map:expr),+ $(,)?) => {
                $(if let Some(v) = value.downcast_ref::<$ty>() {
                    return Ok(($map)(v));
                })+
            };
        }
        try_downcast! {
            BindValue => |v: &BindValue| v.clone(),
            Serial => |v: &Serial| BindValue::Identifier(*v),
            Option<Serial> => |v: &Option<Serial>| BindValue::from(*v),
            Amount => |v: &Amount| BindValue::Amount(*v),
            Rate => |v: &Rate| BindValue::Rate(*v),
            NaiveDate => |v: &NaiveDate| BindValue::Date(*v),
            Option<NaiveDate> => |v: &Option<NaiveDate>| BindValue::from(*v),
            NaiveDateTime => |v: &NaiveDateTime| BindValue::Timestamp(*v),
            i64 => |v: &i64| BindValue::Integer(*v),
            i32 => |v: &i32| BindValue::Integer(i64::from(*v)),
            u32 => |v: &u32| BindValue::Integer(i64::from(*v)),
            f64 => |v: &f64| BindValue::Decimal(*v),
            String => |v: &String| BindValue::Text(v.clone()),
            &'static str => |v: &&str| BindValue::Text((*v).to_string()),
        }
        Err(EngineError::ParameterBinding {
            position,
            type_name: type_name::<T>(),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// Store representation. Dates bind as ISO text; money and rates bind
    /// as reals so SQLite compares them numerically.
    pub fn to_param(&self) -> SqlParam {
        match self {
            BindValue::Null => SqlParam::Null,
            BindValue::Decimal(v) => SqlParam::Real(*v),
            BindValue::Amount(v) => SqlParam::Real(v.to_f64()),
            BindValue::Rate(v) => SqlParam::Real(v.to_f64()),
            BindValue::Date(v) => SqlParam::Text(v.format(DATE_FORMAT).to_string()),
            BindValue::Timestamp(v) => SqlParam::Text(v.format(TIMESTAMP_FORMAT).to_string()),
            BindValue::Integer(v) => SqlParam::Integer(*v),
            BindValue::Text(v) => SqlParam::Text(v.clone()),
            BindValue::Identifier(v) => SqlParam::Integer(v.value()),
        }
    }
}

pub fn to_params(values: &[BindValue]) -> Vec<SqlParam> {
    values.iter().map(BindValue::to_param).collect()
}

macro_rules! bind_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(impl From<$ty> for BindValue {
            fn from(value: $ty) -> Self {
                BindValue::$variant(value)
            }
        })+
    };
}

bind_from! {
    f64 => Decimal,
    Amount => Amount,
    Rate => Rate,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    i64 => Integer,
    String => Text,
    Serial => Identifier,
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Integer(i64::from(value))
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BindValue::Null, Into::into)
    }
}

/// `count` comma-separated `?` placeholders for an `IN (...)` list.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

/// Bind a list of values after placeholders built by [`placeholders`].
pub fn bind_list<T: Clone + Into<BindValue>>(values: &[T]) -> Vec<BindValue> {
    values.iter().cloned().map(Into::into).collect()
}
