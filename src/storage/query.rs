//! # Compiled Queries
//!
//! A [`Query`] is a compiled, reusable query against one storage handle:
//! the SQL text, the compare attribute/value vectors and the ORDER BY
//! fragment produced by the criteria compiler. Executing it yields a
//! [`QueryResult`](crate::storage::QueryResult) cursor.
//!
//! Besides execution a query answers three derived questions with the
//! same WHERE clause:
//!
//! - [`Query::size`]: `SELECT COUNT(*)`
//! - [`Query::position_of`]: the zero-based position of an id under the
//!   query's ordering, computed with a `row_number()` window; returns
//!   `-1` when the database rejects the syntax
//! - [`Query::get_distinct`]: `SELECT DISTINCT <column>` collected into a
//!   set, each raw value normalized through the mapping
//!
//! Paging: when the query carries an offset/limit and an ORDER BY clause,
//! the dialect's paging template is appended and the offset is consumed;
//! without paging support the offset is applied by cursor positioning.
//!
//! Executions exceeding one second are logged at info level, above three
//! seconds at warn level; neither affects the running query.

use crate::error::{StorageError, StorageResult};
use crate::mapping::{Attribute, Entity, ObjectMapping};
use crate::predicate::RawQuery;
use crate::sql::{names, CompiledCriteria, SqlCompiler};
use crate::storage::manager;
use crate::storage::result::RawResult;
use crate::storage::{QueryResult, StorageHandle};
use crate::types::Value;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LONG_QUERY_INFO: Duration = Duration::from_secs(1);
const LONG_QUERY_WARN: Duration = Duration::from_secs(3);

/// A compiled, reusable query for objects of type `T`.
pub struct Query<T: Entity> {
    core: QueryCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Query<T> {
    pub(crate) fn new(handle: StorageHandle, raw: RawQuery) -> StorageResult<Self> {
        Ok(Self {
            core: QueryCore::new(handle, raw)?,
            _marker: PhantomData,
        })
    }

    /// Executes the query and returns a fresh result cursor.
    pub fn execute(&mut self) -> StorageResult<QueryResult<T>> {
        Ok(QueryResult::new(self.core.execute()?))
    }

    /// The number of objects matching the query criteria.
    pub fn size(&mut self) -> StorageResult<u64> {
        self.core.size()
    }

    /// The zero-based position of an id under the query's ordering, or
    /// `-1` if the database does not support window functions.
    pub fn position_of(&mut self, id: impl Into<Value>) -> StorageResult<i64> {
        self.core.position_of(&id.into())
    }

    /// The distinct values of an attribute among the matching rows.
    pub fn get_distinct(&mut self, attribute: &Attribute) -> StorageResult<HashSet<Value>> {
        self.core.get_distinct(attribute)
    }

    /// Overrides the position of the first returned record.
    pub fn set_offset(&mut self, offset: u64) {
        self.core.raw.offset = Some(offset);
    }

    /// Overrides the maximum number of returned records.
    pub fn set_limit(&mut self, limit: u64) {
        self.core.raw.limit = Some(limit);
    }

    /// The untyped query this instance was compiled from.
    #[must_use]
    pub fn raw(&self) -> &RawQuery {
        &self.core.raw
    }
}

/// The untyped compiled query shared by [`Query`] and internal callers.
pub(crate) struct QueryCore {
    handle: StorageHandle,
    pub(crate) raw: RawQuery,
    mapping: Arc<dyn ObjectMapping>,
    compiled: CompiledCriteria,
}

impl QueryCore {
    pub(crate) fn new(handle: StorageHandle, mut raw: RawQuery) -> StorageResult<Self> {
        let mapping = manager::mapping_for(raw.type_key)?;

        // a mapping may fold a default criterion into every query of its
        // type
        if let Some(default_criteria) = mapping.default_criteria() {
            raw.criteria = std::mem::take(&mut raw.criteria).and(default_criteria);
        }

        let params = handle.dialect();
        let compiled = SqlCompiler::compile(mapping.as_ref(), &params, &raw.criteria)?;

        Ok(Self {
            handle,
            raw,
            mapping,
            compiled,
        })
    }

    pub(crate) fn execute(&mut self) -> StorageResult<RawResult> {
        let params = self.handle.dialect();
        let mut offset = self.raw.offset.unwrap_or(0);
        let mut paging = String::new();

        // paging requires a stable ordering; without one the offset is
        // applied through cursor positioning instead
        if !self.compiled.order_by.is_empty() {
            if let Some(limit) = self.raw.limit {
                if let Some(clause) = params.paging_clause(limit, offset) {
                    paging = format!(" {clause}");
                    offset = 0;
                }
            }
        }

        let sql = format!(
            "SELECT {} FROM {}{}{}{paging}",
            self.column_list(&params)?,
            names::quoted_table(&params, self.mapping.as_ref()),
            self.compiled.where_clause,
            self.compiled.order_by,
        );
        let bind = self.bind_values()?;

        debug!(target: "relstore::sql", %sql, params = ?bind, "query");

        let started = Instant::now();
        let rows = self
            .handle
            .with_connection(|connection| connection.execute_query(&sql, &bind))?;

        log_long_query(started.elapsed(), &sql);

        let depth = self.raw.depth.or(self.handle.query_depth());

        Ok(RawResult::new(
            rows,
            self.mapping.clone(),
            self.handle.definition(),
            depth,
            self.raw.child_query,
            offset,
        ))
    }

    pub(crate) fn size(&mut self) -> StorageResult<u64> {
        let params = self.handle.dialect();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            names::quoted_table(&params, self.mapping.as_ref()),
            self.compiled.where_clause,
        );

        Ok(self.query_integer(&sql, &[])?.max(0) as u64)
    }

    pub(crate) fn position_of(&mut self, id: &Value) -> StorageResult<i64> {
        let params = self.handle.dialect();
        let id_column = names::quoted_attribute(&params, self.mapping.id_attribute());
        let sql = format!(
            "SELECT row FROM (SELECT row_number() OVER({}) as row, {id_column} FROM {}{}) \
             AS rownums WHERE {id_column} = ?",
            self.compiled.order_by,
            names::quoted_table(&params, self.mapping.as_ref()),
            self.compiled.where_clause,
        );
        let id = self
            .mapping
            .map_value(self.mapping.id_attribute(), id.clone())?;

        match self.query_integer(&sql, &[id]) {
            Ok(row) => Ok(row - 1),
            Err(error) => {
                debug!("row_number() not supported by this database: {error}");
                Ok(-1)
            }
        }
    }

    pub(crate) fn get_distinct(
        &mut self,
        attribute: &Attribute,
    ) -> StorageResult<HashSet<Value>> {
        let params = self.handle.dialect();
        let sql = format!(
            "SELECT DISTINCT {} FROM {}{}",
            names::quoted_attribute(&params, attribute),
            names::quoted_table(&params, self.mapping.as_ref()),
            self.compiled.where_clause,
        );
        let bind = self.bind_values()?;
        let mut rows = self
            .handle
            .with_connection(|connection| connection.execute_query(&sql, &bind))?;
        let mut values = HashSet::new();

        while rows.advance()? {
            let value = rows.row()?[0].clone();

            values.insert(self.mapping.check_attribute_value(attribute, value)?);
        }

        Ok(values)
    }

    /// The comma-separated select column list: all attribute columns plus
    /// one child-count column per child mapping, unless disabled.
    fn column_list(&self, params: &crate::sql::DialectParams) -> StorageResult<String> {
        let mut columns = String::new();

        for attribute in self.mapping.attributes() {
            if !columns.is_empty() {
                columns.push(',');
            }

            columns.push_str(&names::quoted_attribute(params, attribute));
        }

        if !self.mapping.disable_child_counts() {
            for child in self.mapping.child_mappings() {
                let child_mapping = manager::mapping_for(child.child_type())?;

                columns.push(',');
                columns.push_str(&names::child_count_column(child, child_mapping.as_ref()));
            }
        }

        Ok(columns)
    }

    /// Binds the compare values in placeholder order, re-applying the
    /// outgoing value mapping per attribute. Collection values bind one
    /// parameter per element; null values are lowered into the SQL text
    /// and bind nothing.
    fn bind_values(&self) -> StorageResult<SmallVec<[Value; 8]>> {
        let mut bind: SmallVec<[Value; 8]> = SmallVec::new();

        debug_assert_eq!(
            self.compiled.compare_attributes.len(),
            self.compiled.compare_values.len()
        );

        for (attribute, value) in self
            .compiled
            .compare_attributes
            .iter()
            .zip(&self.compiled.compare_values)
        {
            match value {
                Value::Null => {}
                Value::List(elements) => {
                    for element in elements {
                        bind.push(self.map_compare_value(attribute.as_ref(), element.clone())?);
                    }
                }
                other => bind.push(self.map_compare_value(attribute.as_ref(), other.clone())?),
            }
        }

        Ok(bind)
    }

    fn map_compare_value(
        &self,
        attribute: Option<&Attribute>,
        value: Value,
    ) -> StorageResult<Value> {
        match attribute {
            Some(attribute) => self.mapping.map_value(attribute, value),
            None => Ok(value),
        }
    }

    fn query_integer(&mut self, sql: &str, extra_params: &[Value]) -> StorageResult<i64> {
        let mut bind = self.bind_values()?;

        bind.extend(extra_params.iter().cloned());

        let mut rows = self
            .handle
            .with_connection(|connection| connection.execute_query(sql, &bind))?;

        if !rows.advance()? {
            return Err(StorageError::driver("integer query returned no rows"));
        }

        rows.row()?[0]
            .as_int()
            .ok_or_else(|| StorageError::driver("integer query returned a non-integer value"))
    }
}

fn log_long_query(elapsed: Duration, sql: &str) {
    if elapsed >= LONG_QUERY_WARN {
        warn!("query took {}ms: {sql}", elapsed.as_millis());
    } else if elapsed >= LONG_QUERY_INFO {
        info!("query took {}ms: {sql}", elapsed.as_millis());
    }
}
