//! SQL identifier derivation and quoting.
//!
//! Name resolution priority: explicit SQL name, then the generic storage
//! name, then the element's display name converted by splitting camelCase
//! words with underscores and lower-casing. Resolved attribute identifiers
//! are cached on the descriptor.

use crate::mapping::{Attribute, ChildMapping, ObjectMapping};
use crate::sql::dialect::DialectParams;

/// Prefix of generated child-count columns.
pub const CHILD_COUNT_PREFIX: &str = "_cc_";

/// Converts a display name into a SQL identifier.
///
/// CamelCase boundaries become underscores, the result is lower-cased and
/// any non-alphanumeric characters collapse into underscores:
/// `TestRecord` becomes `test_record`.
#[must_use]
pub fn sql_identifier(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                result.push('_');
            }

            for lower in c.to_lowercase() {
                result.push(lower);
            }

            prev_lower = false;
        } else if c.is_alphanumeric() {
            result.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        } else {
            if !result.ends_with('_') && !result.is_empty() {
                result.push('_');
            }

            prev_lower = false;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    result
}

/// Resolves the unquoted SQL identifier of an attribute, caching the
/// result on the descriptor.
#[must_use]
pub fn attribute_sql_name(attribute: &Attribute) -> &str {
    attribute.resolved_sql_name().get_or_init(|| {
        if let Some(name) = attribute.sql_name_override() {
            name.to_string()
        } else if let Some(name) = attribute.storage_name() {
            sql_identifier(name)
        } else {
            sql_identifier(attribute.name())
        }
    })
}

/// Resolves the unquoted SQL table name of a mapping.
#[must_use]
pub fn mapping_sql_name(mapping: &dyn ObjectMapping) -> String {
    mapping
        .sql_name_override()
        .map(str::to_string)
        .unwrap_or_else(|| sql_identifier(mapping.storage_name()))
}

/// Quotes an identifier with the dialect's quote character, if one is set.
#[must_use]
pub fn quoted(params: &DialectParams, name: &str) -> String {
    match params.identifier_quote {
        Some(quote) => format!("{quote}{name}{quote}"),
        None => name.to_string(),
    }
}

/// The quoted SQL identifier of an attribute.
#[must_use]
pub fn quoted_attribute(params: &DialectParams, attribute: &Attribute) -> String {
    quoted(params, attribute_sql_name(attribute))
}

/// The quoted SQL table name of a mapping.
#[must_use]
pub fn quoted_table(params: &DialectParams, mapping: &dyn ObjectMapping) -> String {
    quoted(params, &mapping_sql_name(mapping))
}

/// The child-count column name for a child mapping (`_cc_<child_table>`),
/// cached on the child mapping.
#[must_use]
pub fn child_count_column(child: &ChildMapping, child_mapping: &dyn ObjectMapping) -> String {
    child
        .child_count_column()
        .get_or_init(|| format!("{CHILD_COUNT_PREFIX}{}", mapping_sql_name(child_mapping)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn camel_case_splits_on_uppercase_boundaries() {
        assert_eq!(sql_identifier("TestRecord"), "test_record");
        assert_eq!(sql_identifier("name"), "name");
        assert_eq!(sql_identifier("parentId"), "parent_id");
        assert_eq!(sql_identifier("HTTPServer"), "httpserver");
        assert_eq!(sql_identifier("value2"), "value2");
    }

    #[test]
    fn non_alphanumeric_characters_become_underscores() {
        assert_eq!(sql_identifier("some name"), "some_name");
        assert_eq!(sql_identifier("a-b-c"), "a_b_c");
    }

    #[test]
    fn resolution_prefers_explicit_names() {
        let plain = Attribute::new("someField", DataType::Text);
        assert_eq!(attribute_sql_name(&plain), "some_field");

        let stored = Attribute::new("someField", DataType::Text).with_storage_name("OtherName");
        assert_eq!(attribute_sql_name(&stored), "other_name");

        let explicit = Attribute::new("someField", DataType::Text)
            .with_storage_name("OtherName")
            .with_sql_name("legacy_col");
        assert_eq!(attribute_sql_name(&explicit), "legacy_col");
    }

    #[test]
    fn resolved_names_are_cached() {
        let attribute = Attribute::new("someField", DataType::Text);

        let first = attribute_sql_name(&attribute).as_ptr();
        let second = attribute_sql_name(&attribute).as_ptr();

        assert_eq!(first, second);
    }

    #[test]
    fn quoting_uses_the_dialect_character() {
        let standard = DialectParams::standard();
        assert_eq!(quoted(&standard, "name"), "\"name\"");

        let mysql = DialectParams::mysql();
        assert_eq!(quoted(&mysql, "name"), "`name`");

        let unquoted = DialectParams {
            identifier_quote: None,
            ..DialectParams::standard()
        };
        assert_eq!(quoted(&unquoted, "name"), "name");
    }
}
