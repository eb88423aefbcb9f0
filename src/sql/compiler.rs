//! # Criteria Compiler
//!
//! Lowers a criteria tree against a mapping into four artifacts:
//!
//! 1. a parameterized WHERE clause (prefixed only when at least one leaf
//!    contributed text)
//! 2. the ordered compare-attribute vector, holding the attribute
//!    descriptors needed to re-apply outgoing value mapping at bind time
//! 3. the ordered compare-value vector
//! 4. the ORDER BY fragment collected from sort-key leaves
//!
//! ## Compilation contracts
//!
//! - **Negation folds over comparisons**: `not(equal_to(x))` emits `<>`,
//!   `not(less_than(x))` emits `>=`. Anything else gets a `NOT` prefix.
//! - **Join sides drop out when empty**: a side that produces no text
//!   (sort keys, always-TRUE) disappears together with the connective;
//!   two valid sides are parenthesized.
//! - **`= NULL` lowers to `IS NULL`** (and `IS NOT NULL` when negated);
//!   the placeholder is suppressed, the null compare value is skipped at
//!   bind time.
//! - **Collection values expand**: `element_of` renders one placeholder
//!   per element but occupies a single slot in both compare vectors.
//! - **Sub-queries lower to `IN (SELECT …)`**: against the child's parent
//!   attribute for parent/child relations, otherwise against the
//!   referenced type's id attribute or an explicit accessor expression.
//! - **Fuzzy comparisons** wrap both sides in the dialect's fuzzy search
//!   function; without one they fall back to LIKE.

use crate::error::{StorageError, StorageResult};
use crate::mapping::{Attribute, ObjectMapping};
use crate::predicate::{Compare, Criterion, FieldExpr, SubQuery};
use crate::sql::dialect::DialectParams;
use crate::sql::names;
use crate::storage::manager;
use crate::types::Value;

const SQL_NEGATION: &str = " NOT ";

/// The result of compiling a criteria tree.
#[derive(Debug, Default)]
pub struct CompiledCriteria {
    /// The WHERE clause including the leading ` WHERE `, or empty.
    pub where_clause: String,
    /// The ORDER BY clause including the leading ` ORDER BY `, or empty.
    pub order_by: String,
    /// Attribute descriptors for bind-time value mapping, one per compare
    /// value; `None` where no attribute could be resolved.
    pub compare_attributes: Vec<Option<Attribute>>,
    /// Compare values in placeholder order.
    pub compare_values: Vec<Value>,
}

/// Recursive criteria-to-SQL compiler.
pub struct SqlCompiler<'a> {
    params: &'a DialectParams,
    compare_attributes: Vec<Option<Attribute>>,
    compare_values: Vec<Value>,
    sort_keys: Vec<(String, bool)>,
}

impl<'a> SqlCompiler<'a> {
    /// Compiles a criteria tree against a mapping.
    pub fn compile(
        mapping: &dyn ObjectMapping,
        params: &'a DialectParams,
        criteria: &Criterion,
    ) -> StorageResult<CompiledCriteria> {
        let mut compiler = SqlCompiler {
            params,
            compare_attributes: Vec::new(),
            compare_values: Vec::new(),
            sort_keys: Vec::new(),
        };

        let mut text = String::new();
        compiler.parse_criteria(mapping, None, criteria, &mut text)?;

        let where_clause = if text.is_empty() {
            String::new()
        } else {
            format!(" WHERE {text}")
        };

        Ok(CompiledCriteria {
            where_clause,
            order_by: compiler.order_criteria(),
            compare_attributes: compiler.compare_attributes,
            compare_values: compiler.compare_values,
        })
    }

    /// Renders the collected sort keys as an ORDER BY clause.
    fn order_criteria(&self) -> String {
        if self.sort_keys.is_empty() {
            return String::new();
        }

        let mut clause = String::from(" ORDER BY ");

        for (i, (column, ascending)) in self.sort_keys.iter().enumerate() {
            if i > 0 {
                clause.push(',');
            }

            clause.push_str(column);

            if !ascending {
                clause.push_str(" DESC");
            }
        }

        clause
    }

    /// Recursively parses a criterion, appending SQL text. The return
    /// value reports whether the criterion contributes text to enclosing
    /// joins.
    fn parse_criteria(
        &mut self,
        mapping: &dyn ObjectMapping,
        attribute: Option<&str>,
        criterion: &Criterion,
        out: &mut String,
    ) -> StorageResult<bool> {
        match criterion {
            Criterion::Always => Ok(false),
            Criterion::Sort { target, ascending } => {
                let column = self.function_expr(mapping, target)?;

                self.sort_keys.push((column, *ascending));
                Ok(false)
            }
            Criterion::Not(inner) => match inner.as_ref() {
                // negation of a comparison resolves at the leaf
                Criterion::Compare(compare) => {
                    let attribute = attribute.ok_or_else(comparison_without_attribute)?;

                    self.parse_comparison(mapping, attribute, compare, out, true)?;
                    Ok(true)
                }
                other => {
                    out.push_str(SQL_NEGATION);
                    self.parse_criteria(mapping, attribute, other, out)
                }
            },
            Criterion::And(left, right) => self.parse_join(mapping, left, right, " AND ", out),
            Criterion::Or(left, right) => self.parse_join(mapping, left, right, " OR ", out),
            Criterion::Element { target, value } => {
                self.parse_element(mapping, target, value, out)
            }
            Criterion::Compare(compare) => {
                let attribute = attribute.ok_or_else(comparison_without_attribute)?;

                self.parse_comparison(mapping, attribute, compare, out, false)?;
                Ok(true)
            }
            Criterion::SubQuery(_) => Err(StorageError::UnsupportedPredicate(
                "sub-query without a target attribute".into(),
            )),
        }
    }

    /// Parses both sides of a join, dropping sides that contribute no
    /// text and parenthesizing when both are valid.
    fn parse_join(
        &mut self,
        mapping: &dyn ObjectMapping,
        left: &Criterion,
        right: &Criterion,
        separator: &str,
        out: &mut String,
    ) -> StorageResult<bool> {
        let mut left_text = String::new();
        let mut right_text = String::new();

        let left_valid =
            self.parse_criteria(mapping, None, left, &mut left_text)? && !left_text.is_empty();
        let right_valid =
            self.parse_criteria(mapping, None, right, &mut right_text)? && !right_text.is_empty();

        let both = left_valid && right_valid;

        if both {
            out.push('(');
        }

        if left_valid {
            out.push_str(&left_text);
        }

        if both {
            out.push_str(separator);
        }

        if right_valid {
            out.push_str(&right_text);
        }

        if both {
            out.push(')');
        }

        Ok(left_valid || right_valid)
    }

    /// Parses an element predicate: resolves the target column and
    /// dispatches on the value criterion.
    fn parse_element(
        &mut self,
        mapping: &dyn ObjectMapping,
        target: &FieldExpr,
        value: &Criterion,
        out: &mut String,
    ) -> StorageResult<bool> {
        // an always-TRUE value predicate carries no criteria of its own
        if matches!(value, Criterion::Always) {
            return Ok(false);
        }

        let column = self.function_expr(mapping, target)?;

        match value {
            Criterion::SubQuery(sub_query) => {
                self.parse_detail_query(mapping, &column, sub_query, out)?;
                Ok(true)
            }
            other => {
                self.compare_attributes
                    .push(mapping.attribute(target.field_name()).cloned());

                let valid = self.parse_criteria(mapping, Some(&column), other, out)?;

                if !valid {
                    self.compare_attributes.pop();
                }

                Ok(valid)
            }
        }
    }

    /// Parses a sub-query on an attribute or child of the queried type.
    fn parse_detail_query(
        &mut self,
        mapping: &dyn ObjectMapping,
        outer_column: &str,
        sub_query: &SubQuery,
        out: &mut String,
    ) -> StorageResult<()> {
        let detail_mapping = manager::mapping_for(sub_query.query.type_key)?;
        let detail_table = names::quoted_table(self.params, detail_mapping.as_ref());

        let (main_column, detail_column) =
            match detail_mapping.parent_attribute(mapping.mapped_type()) {
                // parent-child relation:
                //   <parent-id> IN (SELECT <parent-attr> FROM <child> WHERE …)
                Some(parent_attr) => (
                    names::quoted_attribute(self.params, mapping.id_attribute()),
                    names::quoted_attribute(self.params, parent_attr),
                ),
                // object reference:
                //   <ref-attr> IN (SELECT <id> FROM <referenced> WHERE …)
                None => {
                    let detail_column = match &sub_query.ref_attr {
                        Some(accessor) => {
                            self.function_expr(detail_mapping.as_ref(), accessor)?
                        }
                        None => names::quoted_attribute(
                            self.params,
                            detail_mapping.id_attribute(),
                        ),
                    };

                    (outer_column.to_string(), detail_column)
                }
            };

        out.push_str(&main_column);
        out.push_str(" IN (SELECT ");
        out.push_str(&detail_column);
        out.push_str(" FROM ");
        out.push_str(&detail_table);

        let mut inner = String::new();
        self.parse_criteria(
            detail_mapping.as_ref(),
            None,
            &sub_query.query.criteria,
            &mut inner,
        )?;

        if !inner.is_empty() {
            out.push_str(" WHERE ");
            out.push_str(&inner);
        }

        out.push(')');
        Ok(())
    }

    /// Parses a comparison into its SQL expression and records the
    /// compare value.
    fn parse_comparison(
        &mut self,
        _mapping: &dyn ObjectMapping,
        attribute: &str,
        compare: &Compare,
        out: &mut String,
        negate: bool,
    ) -> StorageResult<()> {
        match compare {
            Compare::Like(pattern) => {
                self.compare_values.push(Value::Text(pattern.clone()));

                out.push_str(attribute);
                out.push_str(if negate { " NOT LIKE ?" } else { " LIKE ?" });
            }
            Compare::SimilarTo(value) => {
                self.compare_values.push(Value::Text(value.clone()));

                match &self.params.fuzzy_search_function {
                    Some(function) => {
                        let op = if negate { "<>" } else { "=" };

                        out.push_str(&format!("{function}({attribute}) {op} {function}(?)"));
                    }
                    None => {
                        out.push_str(attribute);
                        out.push_str(if negate { " NOT LIKE ?" } else { " LIKE ?" });
                    }
                }
            }
            Compare::Equal(value) => {
                self.compare_values.push(value.clone());
                out.push_str(attribute);

                if value.is_null() {
                    out.push_str(if negate { " IS NOT NULL" } else { " IS NULL" });
                } else {
                    out.push_str(if negate { " <> ?" } else { " = ?" });
                }
            }
            Compare::In(values) => {
                self.compare_values.push(Value::List(values.clone()));
                out.push_str(attribute);
                out.push_str(if negate { " NOT IN (" } else { " IN (" });

                for i in 0..values.len() {
                    if i > 0 {
                        out.push(',');
                    }

                    out.push('?');
                }

                out.push(')');
            }
            Compare::Less(value) => {
                self.push_ordering(attribute, value, if negate { ">=" } else { "<" }, out);
            }
            Compare::LessOrEqual(value) => {
                self.push_ordering(attribute, value, if negate { ">" } else { "<=" }, out);
            }
            Compare::Greater(value) => {
                self.push_ordering(attribute, value, if negate { "<=" } else { ">" }, out);
            }
            Compare::GreaterOrEqual(value) => {
                self.push_ordering(attribute, value, if negate { "<" } else { ">=" }, out);
            }
        }

        Ok(())
    }

    fn push_ordering(&mut self, attribute: &str, value: &Value, op: &str, out: &mut String) {
        self.compare_values.push(value.clone());
        out.push_str(attribute);
        out.push(' ');
        out.push_str(op);
        out.push_str(" ?");
    }

    /// Renders a field expression as a SQL expression around the resolved
    /// column name.
    fn function_expr(
        &self,
        mapping: &dyn ObjectMapping,
        expr: &FieldExpr,
    ) -> StorageResult<String> {
        let rendered = match expr {
            FieldExpr::Field(name) => match mapping.attribute(name) {
                Some(attribute) => names::quoted_attribute(self.params, attribute),
                None => names::quoted(self.params, &names::sql_identifier(name)),
            },
            FieldExpr::Lower(inner) => {
                format!("LOWER({})", self.function_expr(mapping, inner)?)
            }
            FieldExpr::Upper(inner) => {
                format!("UPPER({})", self.function_expr(mapping, inner)?)
            }
            FieldExpr::Cast(inner, datatype) => {
                let sql_type = self
                    .params
                    .render_datatype(*datatype, crate::mapping::DEFAULT_STORAGE_LENGTH);

                format!("CAST({} AS {sql_type})", self.function_expr(mapping, inner)?)
            }
            FieldExpr::Substring(inner, begin, end) => {
                let column = self.function_expr(mapping, inner)?;

                match end {
                    Some(end) => format!("SUBSTRING({column},{},{})", begin + 1, end + 1),
                    None => format!("SUBSTRING({column},{})", begin + 1),
                }
            }
        };

        Ok(rendered)
    }
}

fn comparison_without_attribute() -> StorageError {
    StorageError::UnsupportedPredicate("comparison without a target attribute".into())
}
