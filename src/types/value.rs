//! # Owned Value Representation
//!
//! [`Value`] is the self-describing, fully-owned value that crosses the
//! driver boundary: attribute values read from result rows, compare values
//! bound to prepared statements, and id values carried by lazy child lists.
//!
//! ## Canonical text form
//!
//! Every value has a canonical string rendering via [`std::fmt::Display`].
//! The renderings are stable because they double as the wire format for
//! attributes stored in generic string columns (collections, maps, periods,
//! enums) and must be re-parseable by the value conversion in
//! `mapping::convert`.
//!
//! ## Equality and hashing
//!
//! `Value` implements `Eq` and `Hash` (floats compare and hash by bit
//! pattern) so distinct-value queries can collect results into sets.

use crate::types::Period;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Timestamp rendering with optional sub-second digits.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// An owned storage value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// All integer widths share the 64-bit runtime representation.
    Int(i64),
    Float(f64),
    /// Fixed-point decimal: `mantissa * 10^(-scale)`.
    Decimal { mantissa: i128, scale: i16 },
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Period(Period),
    /// Named constant; ordinal-carrying enums render as `<ordinal>-<name>`.
    Enum { ordinal: Option<u16>, name: String },
    /// Fully qualified type name.
    TypeName(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// True for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer content, if this is an integer value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float content, widening integers.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Creates a decimal value, trimming trailing fractional zeros.
    #[must_use]
    pub fn decimal(mantissa: i128, scale: i16) -> Self {
        let (mut mantissa, mut scale) = (mantissa, scale);

        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }

        Self::Decimal { mantissa, scale }
    }

    /// Parses a plain decimal string (`-12.34`) into a decimal value.
    #[must_use]
    pub fn parse_decimal(input: &str) -> Option<Self> {
        let input = input.trim();
        let (sign, digits) = match input.strip_prefix('-') {
            Some(rest) => (-1i128, rest),
            None => (1i128, input.strip_prefix('+').unwrap_or(input)),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let mut mantissa: i128 = 0;

        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10)? as i128;
            mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
        }

        let scale = i16::try_from(frac_part.len()).ok()?;

        Some(Self::decimal(sign * mantissa, scale))
    }

    /// Converts a zero-fraction decimal to its integer mantissa.
    ///
    /// Returns `None` if the value is not a decimal or has a non-zero
    /// fraction.
    #[must_use]
    pub fn decimal_as_integer(&self) -> Option<i128> {
        match *self {
            Self::Decimal { mantissa, scale } if scale <= 0 => {
                let mut result = mantissa;

                for _ in scale..0 {
                    result = result.checked_mul(10)?;
                }

                Some(result)
            }
            Self::Decimal { mantissa, scale } => {
                let mut divisor: i128 = 1;

                for _ in 0..scale {
                    divisor = divisor.checked_mul(10)?;
                }

                (mantissa % divisor == 0).then(|| mantissa / divisor)
            }
            _ => None,
        }
    }

    /// A short description of the value's runtime type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal { .. } => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Timestamp(_) => "timestamp",
            Self::Period(_) => "period",
            Self::Enum { .. } => "enum",
            Self::TypeName(_) => "typename",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Decimal { mantissa, scale } => {
                if *scale <= 0 {
                    write!(f, "{mantissa}")?;

                    for _ in *scale..0 {
                        f.write_str("0")?;
                    }

                    Ok(())
                } else {
                    let sign = if *mantissa < 0 { "-" } else { "" };
                    let digits = mantissa.unsigned_abs().to_string();
                    let scale = *scale as usize;

                    if digits.len() > scale {
                        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
                        write!(f, "{sign}{int_part}.{frac_part}")
                    } else {
                        write!(f, "{sign}0.{digits:0>scale$}")
                    }
                }
            }
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }

                Ok(())
            }
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Self::Period(p) => write!(f, "{p}"),
            Self::Enum { ordinal, name } => match ordinal {
                Some(ord) => write!(f, "{ord}-{name}"),
                None => f.write_str(name),
            },
            Self::TypeName(name) => f.write_str(name),
            Self::List(items) => {
                f.write_str("[")?;

                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }

                    write!(f, "{item}")?;
                }

                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;

                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }

                    write!(f, "{key}={value}")?;
                }

                f.write_str("}")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (
                Self::Decimal {
                    mantissa: am,
                    scale: asc,
                },
                Self::Decimal {
                    mantissa: bm,
                    scale: bsc,
                },
            ) => am == bm && asc == bsc,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Period(a), Self::Period(b)) => a == b,
            (
                Self::Enum {
                    ordinal: ao,
                    name: an,
                },
                Self::Enum {
                    ordinal: bo,
                    name: bn,
                },
            ) => ao == bo && an == bn,
            (Self::TypeName(a), Self::TypeName(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);

        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Float(x) => x.to_bits().hash(state),
            Self::Decimal { mantissa, scale } => {
                mantissa.hash(state);
                scale.hash(state);
            }
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
            Self::Date(d) => d.hash(state),
            Self::Time(t) => t.hash(state),
            Self::Timestamp(ts) => ts.hash(state),
            Self::Period(p) => p.hash(state),
            Self::Enum { ordinal, name } => {
                ordinal.hash(state);
                name.hash(state);
            }
            Self::TypeName(name) => name.hash(state),
            Self::List(items) => items.hash(state),
            Self::Map(entries) => entries.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Int(v.into())
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Period> for Value {
    fn from(v: Period) -> Self {
        Self::Period(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
