//! In-memory criteria evaluation.
//!
//! Evaluating a criteria tree against a mapped object mirrors the SQL
//! semantics where possible: sort keys are always TRUE, `LIKE` patterns
//! translate `%`/`_` into `.*`/`.` and match the full string, comparisons
//! against NULL only succeed for `equal_to(null)`. Sub-query predicates
//! cannot be evaluated in memory and fail with an unsupported-predicate
//! error.
//!
//! The exact row sets of in-memory evaluation and compiled SQL can still
//! differ in corner cases (collation, fuzzy matching); application code
//! should not rely on their identity.

use crate::error::{StorageError, StorageResult};
use crate::mapping::{Attribute, Entity, ObjectMapping};
use crate::predicate::{Compare, Criterion, FieldExpr};
use crate::types::Value;
use regex::Regex;
use std::cmp::Ordering;

/// Evaluates a criteria tree against a mapped object.
pub fn evaluate(
    criterion: &Criterion,
    mapping: &dyn ObjectMapping,
    object: &dyn Entity,
) -> StorageResult<bool> {
    eval(criterion, mapping, object, None)
}

fn eval(
    criterion: &Criterion,
    mapping: &dyn ObjectMapping,
    object: &dyn Entity,
    current: Option<&Value>,
) -> StorageResult<bool> {
    match criterion {
        Criterion::Always => Ok(true),
        Criterion::Sort { .. } => Ok(true),
        Criterion::And(left, right) => {
            Ok(eval(left, mapping, object, current)? && eval(right, mapping, object, current)?)
        }
        Criterion::Or(left, right) => {
            Ok(eval(left, mapping, object, current)? || eval(right, mapping, object, current)?)
        }
        Criterion::Not(inner) => Ok(!eval(inner, mapping, object, current)?),
        Criterion::Element { target, value } => {
            let element = eval_field(target, mapping, object)?;

            eval(value, mapping, object, Some(&element))
        }
        Criterion::Compare(compare) => {
            let value = current.ok_or_else(|| {
                StorageError::UnsupportedPredicate("comparison without an attribute".into())
            })?;

            Ok(eval_compare(compare, value))
        }
        Criterion::SubQuery(_) => Err(StorageError::UnsupportedPredicate(
            "sub-queries cannot be evaluated in memory".into(),
        )),
    }
}

fn eval_field(
    expr: &FieldExpr,
    mapping: &dyn ObjectMapping,
    object: &dyn Entity,
) -> StorageResult<Value> {
    match expr {
        FieldExpr::Field(name) => {
            let attribute = mapping.attribute(name).ok_or_else(|| {
                StorageError::UnsupportedPredicate(format!(
                    "unknown attribute '{name}' in {}",
                    mapping.mapped_type()
                ))
            })?;

            mapping.get_value(object, attribute)
        }
        FieldExpr::Lower(inner) => {
            Ok(map_text(eval_field(inner, mapping, object)?, |s| {
                s.to_lowercase()
            }))
        }
        FieldExpr::Upper(inner) => {
            Ok(map_text(eval_field(inner, mapping, object)?, |s| {
                s.to_uppercase()
            }))
        }
        FieldExpr::Substring(inner, begin, end) => {
            Ok(map_text(eval_field(inner, mapping, object)?, |s| {
                let chars: Vec<char> = s.chars().collect();
                let from = (*begin).min(chars.len());
                let to = end.map_or(chars.len(), |e| e.min(chars.len()));

                chars[from..to.max(from)].iter().collect()
            }))
        }
        FieldExpr::Cast(inner, datatype) => {
            let value = eval_field(inner, mapping, object)?;

            if value.is_null() {
                return Ok(Value::Null);
            }

            let cast = Attribute::new("cast", *datatype);

            crate::mapping::convert::check_attribute_value(&cast, Value::Text(value.to_string()))
        }
    }
}

fn map_text(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

fn eval_compare(compare: &Compare, value: &Value) -> bool {
    match compare {
        Compare::Equal(Value::Null) => value.is_null(),
        Compare::Equal(expected) => value == expected,
        Compare::Less(limit) => matches!(compare_values(value, limit), Some(Ordering::Less)),
        Compare::LessOrEqual(limit) => matches!(
            compare_values(value, limit),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Compare::Greater(limit) => matches!(compare_values(value, limit), Some(Ordering::Greater)),
        Compare::GreaterOrEqual(limit) => matches!(
            compare_values(value, limit),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Compare::In(values) => values.contains(value),
        Compare::Like(pattern) | Compare::SimilarTo(pattern) => {
            !value.is_null() && matches_like(&value.to_string(), pattern)
        }
    }
}

/// Orders two values where a total order exists between their types.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Decimal { .. }, Value::Decimal { .. }) => {
            decimal_f64(left).partial_cmp(&decimal_f64(right))
        }
        _ => None,
    }
}

fn decimal_f64(value: &Value) -> f64 {
    match value {
        Value::Decimal { mantissa, scale } => *mantissa as f64 / 10f64.powi(i32::from(*scale)),
        _ => f64::NAN,
    }
}

/// Converts a SQL LIKE pattern into an anchored regular expression.
#[must_use]
pub fn like_pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("^(?s:");

    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => {
                if regex_syntax_char(other) {
                    regex.push('\\');
                }

                regex.push(other);
            }
        }
    }

    regex.push_str(")$");
    regex
}

fn regex_syntax_char(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#'
    )
}

/// Matches a string against a SQL LIKE pattern.
#[must_use]
pub fn matches_like(text: &str, pattern: &str) -> bool {
    Regex::new(&like_pattern_to_regex(pattern))
        .map(|regex| regex.is_match(text))
        .unwrap_or(false)
}
