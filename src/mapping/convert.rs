//! # Value Conversion Policy
//!
//! Default conversions between driver values and attribute values, used by
//! the [`ObjectMapping`](crate::mapping::ObjectMapping) default methods.
//!
//! ## Incoming ([`check_attribute_value`])
//!
//! Driver results are weakly typed; many back-ends deliver text or widened
//! integers for every column. Incoming values are normalized against the
//! declared attribute datatype:
//!
//! - text attributes pass strings through unchanged
//! - strings are parsed into the declared datatype (numbers, booleans,
//!   dates, periods, ordinal-prefixed enums, type names, collections and
//!   maps via the canonical text forms)
//! - integers satisfy boolean attributes (`0`/`1`)
//! - zero-fraction decimals convert exactly to big integers
//! - the final value must satisfy the declared datatype or the conversion
//!   fails with a type mismatch
//!
//! ## Outgoing ([`map_outgoing`])
//!
//! - ordinal-carrying enums render as `<ordinal>-<name>`, plain enums as
//!   their name
//! - type names store fully qualified, or unqualified when the attribute
//!   omits namespaces
//! - periods, collections and maps serialize to their canonical strings
//! - values bound to generic string columns are stringified as a last
//!   resort

use crate::error::{StorageError, StorageResult};
use crate::mapping::Attribute;
use crate::types::{DataType, Value, DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Normalizes an incoming value against the declared attribute datatype.
pub fn check_attribute_value(attribute: &Attribute, value: Value) -> StorageResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let datatype = attribute.datatype();

    let value = match value {
        Value::Text(text) if datatype != DataType::Text => {
            parse_text(attribute, datatype, &text)?
        }
        Value::Int(n) if datatype == DataType::Bool => Value::Bool(n != 0),
        Value::Decimal { .. } if datatype == DataType::BigInt => value
            .decimal_as_integer()
            .map(|mantissa| Value::Decimal { mantissa, scale: 0 })
            .ok_or_else(|| StorageError::TypeMismatch {
                expected: datatype,
                actual: value.to_string(),
            })?,
        other => other,
    };

    if datatype.accepts(&value) {
        Ok(value)
    } else {
        Err(StorageError::TypeMismatch {
            expected: datatype,
            actual: value.type_name().to_string(),
        })
    }
}

/// Converts an outgoing attribute value to its wire representation.
pub fn map_outgoing(attribute: &Attribute, value: Value) -> StorageResult<Value> {
    let value = match value {
        Value::Enum { ordinal, name } => Value::Text(match ordinal {
            Some(ord) => format!("{ord}-{name}"),
            None => name,
        }),
        Value::TypeName(name) => {
            if attribute.omits_namespace() {
                let simple = name.rsplit("::").next().unwrap_or(&name).to_string();
                Value::Text(simple)
            } else {
                Value::Text(name)
            }
        }
        Value::Period(period) => Value::Text(period.to_string()),
        list @ Value::List(_) => Value::Text(list.to_string()),
        map @ Value::Map(_) => Value::Text(map.to_string()),
        other => other,
    };

    // columns that fell back to the generic string datatype take any value
    // in stringified form
    if let Some(sql_datatype) = attribute.resolved_sql_datatype().get() {
        if sql_datatype == crate::sql::dialect::DEFAULT_STRING_DATATYPE
            && !matches!(value, Value::Text(_) | Value::Null)
        {
            return Ok(Value::Text(value.to_string()));
        }
    }

    Ok(value)
}

fn parse_text(attribute: &Attribute, datatype: DataType, text: &str) -> StorageResult<Value> {
    let invalid = || StorageError::InvalidValue {
        datatype,
        value: text.to_string(),
    };

    let value = match datatype {
        DataType::Text => Value::Text(text.to_string()),
        DataType::Int1 | DataType::Int2 | DataType::Int4 | DataType::Int8 => {
            Value::Int(text.trim().parse().map_err(|_| invalid())?)
        }
        DataType::Float4 | DataType::Float8 => {
            Value::Float(text.trim().parse().map_err(|_| invalid())?)
        }
        DataType::Bool => match text.trim() {
            "true" | "TRUE" | "1" => Value::Bool(true),
            "false" | "FALSE" | "0" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        DataType::BigInt | DataType::Decimal => Value::parse_decimal(text).ok_or_else(invalid)?,
        DataType::Enum => parse_enum(attribute, text),
        DataType::TypeName => Value::TypeName(text.to_string()),
        DataType::Period => Value::Period(text.parse()?),
        DataType::Date => Value::Date(parse_date(text).ok_or_else(invalid)?),
        DataType::Time => Value::Time(
            NaiveTime::parse_from_str(text, TIME_FORMAT)
                .map_err(|_| invalid())?,
        ),
        DataType::Timestamp => parse_timestamp(text).ok_or_else(invalid)?,
        DataType::List | DataType::Set => parse_collection(attribute, text)?,
        DataType::Map => parse_map(attribute, text)?,
        DataType::Bytes => {
            let digits = text.trim();

            if digits.len() % 2 != 0 {
                return Err(invalid());
            }

            let mut bytes = Vec::with_capacity(digits.len() / 2);

            for i in (0..digits.len()).step_by(2) {
                let byte = u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid())?;
                bytes.push(byte);
            }

            Value::Bytes(bytes)
        }
    };

    Ok(value)
}

/// Strips the `<ordinal>-` prefix from ordered enum constants.
fn parse_enum(attribute: &Attribute, text: &str) -> Value {
    if attribute.is_ordered() {
        if let Some((prefix, name)) = text.split_once('-') {
            if let Ok(ordinal) = prefix.parse::<u16>() {
                return Value::Enum {
                    ordinal: Some(ordinal),
                    name: name.to_string(),
                };
            }
        }
    }

    Value::Enum {
        ordinal: None,
        name: text.to_string(),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

fn parse_timestamp(text: &str) -> Option<Value> {
    let text = text.trim();

    if let Ok(ts) = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT) {
        return Some(Value::Timestamp(ts));
    }

    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Value::Timestamp(ts));
    }

    // a date-only string still satisfies a timestamp attribute
    parse_date(text).map(Value::Date)
}

fn parse_collection(attribute: &Attribute, text: &str) -> StorageResult<Value> {
    let datatype = attribute.datatype();
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| StorageError::InvalidValue {
            datatype,
            value: text.to_string(),
        })?;

    let element_type = attribute.element_type().unwrap_or(DataType::Text);
    let mut elements = Vec::new();

    for item in split_elements(inner) {
        elements.push(parse_element(attribute, element_type, item)?);
    }

    Ok(Value::List(elements))
}

fn parse_map(attribute: &Attribute, text: &str) -> StorageResult<Value> {
    let datatype = attribute.datatype();
    let invalid = || StorageError::InvalidValue {
        datatype,
        value: text.to_string(),
    };

    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(invalid)?;

    let key_type = attribute.key_type().unwrap_or(DataType::Text);
    let value_type = attribute.value_type().unwrap_or(DataType::Text);
    let mut entries = Vec::new();

    for item in split_elements(inner) {
        let (key, value) = item.split_once('=').ok_or_else(invalid)?;

        entries.push((
            parse_element(attribute, key_type, key)?,
            parse_element(attribute, value_type, value)?,
        ));
    }

    Ok(Value::Map(entries))
}

fn split_elements(inner: &str) -> impl Iterator<Item = &str> {
    inner
        .split(", ")
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn parse_element(attribute: &Attribute, datatype: DataType, text: &str) -> StorageResult<Value> {
    if datatype == DataType::Text {
        Ok(Value::Text(text.to_string()))
    } else {
        parse_text(attribute, datatype, text)
    }
}
