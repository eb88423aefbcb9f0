//! # Dialect Parameters
//!
//! [`DialectParams`] collects the per-database knobs the SQL generation
//! consults:
//!
//! | Knob | Standard | PostgreSQL | MySQL | SQLite |
//! |------|----------|------------|-------|--------|
//! | identifier quote | `"` | `"` | `` ` `` | `"` |
//! | auto-id datatype | `INTEGER AUTO_INCREMENT` | `SERIAL` | `INTEGER AUTO_INCREMENT` | `INTEGER` |
//! | 64-bit auto-id | `BIGINT AUTO_INCREMENT` | `BIGSERIAL` | `BIGINT AUTO_INCREMENT` | `INTEGER` |
//! | fuzzy function | `soundex` | `dmetaphone` | `soundex` | none |
//! | paging | `LIMIT %d OFFSET %d` | same | same | same |
//! | string columns | `VARCHAR(n)` | `TEXT` | `TEXT` | `VARCHAR(n)` |
//!
//! Setting the paging expression to `None` disables paging; queries then
//! fall back to cursor positioning for offsets. Datatype overrides replace
//! single entries of the standard datatype table.

use crate::types::DataType;
use std::collections::HashMap;

/// Column datatype used when no mapping exists for an attribute datatype.
pub const DEFAULT_STRING_DATATYPE: &str = "VARCHAR(1000)";

/// Per-storage SQL dialect parameters.
#[derive(Debug, Clone)]
pub struct DialectParams {
    /// Identifier quote character; `None` disables quoting.
    pub identifier_quote: Option<char>,
    /// Column datatype expression for auto-generated integer ids.
    pub auto_id_datatype: String,
    /// Column datatype expression for auto-generated 64-bit ids.
    pub long_auto_id_datatype: String,
    /// Name of the phonetic search function used by `almost_like`;
    /// `None` falls back to plain LIKE.
    pub fuzzy_search_function: Option<String>,
    /// Paging clause template taking the limit and offset (`%d` twice);
    /// `None` disables paging.
    pub paging_expression: Option<String>,
    /// Per-datatype overrides of the standard datatype table.
    pub datatype_overrides: HashMap<DataType, String>,
}

impl DialectParams {
    /// Standard SQL defaults.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            identifier_quote: Some('"'),
            auto_id_datatype: "INTEGER AUTO_INCREMENT".into(),
            long_auto_id_datatype: "BIGINT AUTO_INCREMENT".into(),
            fuzzy_search_function: Some("soundex".into()),
            paging_expression: Some("LIMIT %d OFFSET %d".into()),
            datatype_overrides: HashMap::new(),
        }
    }

    /// PostgreSQL: serial ids, `dmetaphone` fuzzy search, TEXT strings.
    #[must_use]
    pub fn postgres() -> Self {
        Self {
            auto_id_datatype: "SERIAL".into(),
            long_auto_id_datatype: "BIGSERIAL".into(),
            fuzzy_search_function: Some("dmetaphone".into()),
            datatype_overrides: HashMap::from([(DataType::Text, "TEXT".into())]),
            ..Self::standard()
        }
    }

    /// MySQL/MariaDB: backtick quoting, TEXT strings.
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            identifier_quote: Some('`'),
            datatype_overrides: HashMap::from([(DataType::Text, "TEXT".into())]),
            ..Self::standard()
        }
    }

    /// SQLite: rowid-backed ids, no built-in fuzzy function.
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            auto_id_datatype: "INTEGER".into(),
            long_auto_id_datatype: "INTEGER".into(),
            fuzzy_search_function: None,
            ..Self::standard()
        }
    }

    /// Replaces the fuzzy search function.
    #[must_use]
    pub fn with_fuzzy_function(mut self, function: impl Into<String>) -> Self {
        self.fuzzy_search_function = Some(function.into());
        self
    }

    /// Overrides the column datatype for one datatype class.
    #[must_use]
    pub fn with_datatype(mut self, datatype: DataType, sql: impl Into<String>) -> Self {
        self.datatype_overrides.insert(datatype, sql.into());
        self
    }

    /// The SQL column datatype template for a datatype class.
    ///
    /// Templates may contain a `%d` placeholder for the storage length.
    #[must_use]
    pub fn sql_datatype(&self, datatype: DataType) -> &str {
        self.datatype_overrides
            .get(&datatype)
            .map_or_else(|| standard_sql_datatype(datatype), String::as_str)
    }

    /// Renders a datatype template with a concrete storage length.
    #[must_use]
    pub fn render_datatype(&self, datatype: DataType, length: u32) -> String {
        render_length(self.sql_datatype(datatype), length)
    }

    /// Renders the paging clause for a limit and offset, if paging is
    /// enabled for this dialect.
    #[must_use]
    pub fn paging_clause(&self, limit: u64, offset: u64) -> Option<String> {
        let template = self.paging_expression.as_deref()?;
        let rendered = replace_once(template, &limit.to_string());
        let rendered = replace_once(&rendered, &offset.to_string());

        Some(rendered)
    }
}

impl Default for DialectParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// The standard datatype table.
#[must_use]
pub fn standard_sql_datatype(datatype: DataType) -> &'static str {
    match datatype {
        DataType::Bool => "BOOLEAN",
        DataType::Int1 => "TINYINT",
        DataType::Int2 => "SMALLINT",
        DataType::Int4 => "INTEGER",
        DataType::Int8 => "BIGINT",
        DataType::Float4 => "REAL",
        DataType::Float8 => "DOUBLE",
        DataType::BigInt => "DECIMAL(1000)",
        DataType::Decimal => "DECIMAL",
        DataType::Text => "VARCHAR(%d)",
        DataType::Bytes => "VARBINARY(%d)",
        DataType::Enum => "VARCHAR(255)",
        DataType::TypeName => "VARCHAR(511)",
        DataType::Period => "VARCHAR(255)",
        DataType::Timestamp => "TIMESTAMP",
        DataType::Date => "DATE",
        DataType::Time => "TIME",
        DataType::List | DataType::Set | DataType::Map => "VARCHAR(%d)",
    }
}

/// Substitutes a `%d` placeholder with a length, if one is present.
#[must_use]
pub fn render_length(template: &str, length: u32) -> String {
    replace_once(template, &length.to_string())
}

fn replace_once(template: &str, substitution: &str) -> String {
    match template.find("%d") {
        Some(pos) => {
            let mut result = String::with_capacity(template.len() + substitution.len());
            result.push_str(&template[..pos]);
            result.push_str(substitution);
            result.push_str(&template[pos + 2..]);
            result
        }
        None => template.to_string(),
    }
}
