//! # Attribute Datatype Classes
//!
//! [`DataType`] is the declared storage class of an attribute. It drives
//! three things:
//!
//! 1. **Value conversion**: incoming driver values are normalized against
//!    the declared datatype (`mapping::convert`)
//! 2. **DDL generation**: each datatype maps to a SQL column type, subject
//!    to per-dialect overrides (`sql::dialect`)
//! 3. **The final type check**: after conversion, a value must satisfy its
//!    attribute's datatype or the operation fails with a type mismatch
//!
//! Integer widths share one runtime representation (`Value::Int`, 64-bit);
//! the width only matters for column DDL. `BigInt` and `Decimal` use the
//! mantissa/scale representation of [`Value::Decimal`].

use crate::types::Value;
use std::fmt;

/// Datatype class of a persisted attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int1,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// Arbitrary-precision integer (zero-scale decimal at runtime).
    BigInt,
    /// Arbitrary-precision decimal.
    Decimal,
    Text,
    Bytes,
    /// Named constant, optionally ordinal-prefixed on the wire.
    Enum,
    /// Fully qualified type name.
    TypeName,
    Period,
    Date,
    Time,
    Timestamp,
    List,
    Set,
    Map,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Text
    }
}

impl DataType {
    /// Returns true for the fixed-width integer classes.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int1 | Self::Int2 | Self::Int4 | Self::Int8)
    }

    /// Returns true for collection-valued classes (list, set, map).
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(self, Self::List | Self::Set | Self::Map)
    }

    /// Checks whether a converted value satisfies this datatype.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int1 | Self::Int2 | Self::Int4 | Self::Int8, Value::Int(_)) => true,
            (Self::Float4 | Self::Float8, Value::Float(_) | Value::Int(_)) => true,
            (Self::BigInt, Value::Decimal { scale: 0, .. } | Value::Int(_)) => true,
            (Self::Decimal, Value::Decimal { .. } | Value::Int(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Enum, Value::Enum { .. }) => true,
            (Self::TypeName, Value::TypeName(_)) => true,
            (Self::Period, Value::Period(_)) => true,
            (Self::Date, Value::Date(_)) => true,
            (Self::Time, Value::Time(_)) => true,
            // a date without a time still satisfies a timestamp attribute
            (Self::Timestamp, Value::Timestamp(_) | Value::Date(_)) => true,
            (Self::List | Self::Set, Value::List(_)) => true,
            (Self::Map, Value::Map(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int1 => "int1",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::BigInt => "bigint",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Enum => "enum",
            Self::TypeName => "typename",
            Self::Period => "period",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_satisfies_every_datatype() {
        for dt in [DataType::Bool, DataType::Int4, DataType::Text, DataType::Map] {
            assert!(dt.accepts(&Value::Null));
        }
    }

    #[test]
    fn integer_widths_share_runtime_representation() {
        let v = Value::Int(42);

        assert!(DataType::Int1.accepts(&v));
        assert!(DataType::Int8.accepts(&v));
        assert!(!DataType::Text.accepts(&v));
    }

    #[test]
    fn bigint_requires_zero_scale() {
        assert!(DataType::BigInt.accepts(&Value::Decimal {
            mantissa: 12,
            scale: 0
        }));
        assert!(!DataType::BigInt.accepts(&Value::Decimal {
            mantissa: 125,
            scale: 1
        }));
    }

    #[test]
    fn date_satisfies_timestamp() {
        let date = Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        assert!(DataType::Timestamp.accepts(&date));
        assert!(!DataType::Time.accepts(&date));
    }
}
