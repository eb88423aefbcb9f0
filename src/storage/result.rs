//! # Query Results
//!
//! [`QueryResult`] is the forward cursor returned by query execution.
//! Each row materializes into an object through the mapping's
//! `create_object`, is marked persistent, and — within the effective
//! query depth — receives one lazy [`ChildList`](crate::storage::ChildList)
//! per child mapping.
//!
//! ## Row layout
//!
//! A row carries one column per attribute, followed by one integer
//! child-count column per child mapping unless child counts are disabled
//! for the type. The recorded counts size the installed lazy lists so
//! reading a child list's length never needs a COUNT query; a count of
//! zero skips the child query entirely.
//!
//! ## Depth bounding
//!
//! The effective depth comes from the query predicate, then the storage
//! default, then "unlimited". Depth zero leaves the child collections
//! empty; at depth `n`, installed child queries carry depth `n - 1`.
//!
//! ## Positioning
//!
//! [`QueryResult::set_position`] supports absolute (zero-based, negative
//! counts from the end) and relative repositioning where the driver's
//! cursor is scrollable; forward-only drivers surface the typed
//! unsupported error on the next read.

use crate::driver::Rows;
use crate::error::{StorageError, StorageResult};
use crate::mapping::{Entity, ObjectMapping};
use crate::predicate::{equal_to, if_attribute, is_null, RawQuery};
use crate::storage::child_list::PendingChildren;
use crate::storage::manager;
use crate::types::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// The untyped result cursor shared by [`QueryResult`] and the lazy
/// child list materializer.
pub(crate) struct RawResult {
    rows: Box<dyn Rows>,
    mapping: Arc<dyn ObjectMapping>,
    definition: Arc<dyn crate::driver::StorageDefinition>,
    depth: Option<u32>,
    child_query: bool,
    pending_seek: Option<(i64, bool)>,
    has_row: bool,
}

impl RawResult {
    pub(crate) fn new(
        rows: Box<dyn Rows>,
        mapping: Arc<dyn ObjectMapping>,
        definition: Arc<dyn crate::driver::StorageDefinition>,
        depth: Option<u32>,
        child_query: bool,
        initial_offset: u64,
    ) -> Self {
        Self {
            rows,
            mapping,
            definition,
            depth,
            child_query,
            // an unconsumed query offset positions the cursor on the
            // first requested row (1-based)
            pending_seek: (initial_offset > 0).then(|| (initial_offset as i64 + 1, false)),
            has_row: false,
        }
    }

    pub(crate) fn has_next(&mut self) -> StorageResult<bool> {
        self.has_row = match self.pending_seek.take() {
            Some((position, true)) => self.rows.seek_relative(position)?,
            Some((position, false)) => self.rows.seek_absolute(position)?,
            None => self.rows.advance()?,
        };

        Ok(self.has_row)
    }

    pub(crate) fn set_position(&mut self, index: i64, relative: bool) {
        // absolute zero-based indices convert to the driver's 1-based
        // form; negative absolute indices count from the end
        let position = if relative {
            index
        } else if index >= 0 {
            index + 1
        } else {
            index
        };

        self.pending_seek = Some((position, relative));
    }

    pub(crate) fn next_object(&mut self) -> StorageResult<Option<Box<dyn Entity>>> {
        // a repositioning requested after the last `has_next` call is
        // applied here, so `set_position(..)` followed by `next()` works
        if self.pending_seek.is_some() {
            self.has_next()?;
        }

        if !self.has_row {
            return Ok(None);
        }

        let attribute_count = self.mapping.attributes().len();
        let child_mappings = self.mapping.child_mappings();
        let use_child_counts = !self.mapping.disable_child_counts() && !child_mappings.is_empty();

        let row = self.rows.row()?;
        let values: Vec<Value> = row[..attribute_count].to_vec();

        let child_counts: Option<Vec<i64>> = if use_child_counts {
            let counts = row[attribute_count..attribute_count + child_mappings.len()]
                .iter()
                .map(|value| value.as_int().unwrap_or(-1))
                .collect();

            Some(counts)
        } else {
            None
        };

        let mut object = self.mapping.create_object(values, self.child_query)?;

        // an object that is already persistent was read completely before
        // and keeps its existing children
        if !object.state().is_persistent() {
            object.state_mut().set_persistent();

            if self.depth.map_or(true, |depth| depth > 0) {
                self.read_children(object.as_mut(), child_counts.as_deref())?;
            }
        }

        Ok(Some(object))
    }

    /// Installs a lazy child list per child mapping, sized from the
    /// row's child-count columns where available.
    fn read_children(
        &self,
        parent: &mut dyn Entity,
        child_counts: Option<&[i64]>,
    ) -> StorageResult<()> {
        let child_mappings = self.mapping.child_mappings();

        if child_mappings.is_empty() {
            return Ok(());
        }

        let parent_key = self.mapping.mapped_type();
        let parent_id = self
            .mapping
            .get_value(parent, self.mapping.id_attribute())?;
        let child_depth = self.depth.map(|depth| depth.saturating_sub(1));

        for (index, child) in child_mappings.iter().enumerate() {
            let known_size = child_counts
                .and_then(|counts| counts.get(index).copied())
                .and_then(|count| usize::try_from(count).ok());

            // a recorded count of zero needs no child query at all
            if known_size == Some(0) {
                continue;
            }

            let child_mapping = manager::mapping_for(child.child_type())?;
            let parent_attribute = child_mapping
                .parent_attribute(parent_key)
                .ok_or_else(|| StorageError::NoParentAttribute {
                    parent: parent_key.to_string(),
                    child: child.child_type().to_string(),
                })?;

            let mut criteria = if_attribute(
                child_mapping.as_ref(),
                parent_attribute,
                equal_to(parent_id.clone()),
            );

            // when the details of a master-detail relation form their own
            // hierarchy, query only its roots
            if child.child_type() != parent_key {
                if let Some(self_parent) = child_mapping.parent_attribute(child.child_type()) {
                    criteria =
                        criteria.and(if_attribute(child_mapping.as_ref(), self_parent, is_null()));
                }
            }

            let mut query = RawQuery::new(child.child_type(), criteria);
            query.depth = child_depth;
            query.child_query = true;

            let pending = PendingChildren::new(
                self.definition.clone(),
                query,
                known_size,
                parent_key,
                parent_id.clone(),
                child.attribute().to_string(),
            );

            self.mapping.set_lazy_children(parent, child, pending)?;
        }

        Ok(())
    }
}

/// A typed forward cursor over query results.
pub struct QueryResult<T: Entity> {
    raw: RawResult,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> QueryResult<T> {
    pub(crate) fn new(raw: RawResult) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Moves to the next row, applying any pending repositioning.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        self.raw.has_next()
    }

    /// Materializes the current row into an object, or `None` past the
    /// end of the result.
    pub fn next(&mut self) -> StorageResult<Option<T>> {
        match self.raw.next_object()? {
            None => Ok(None),
            Some(object) => object
                .into_any()
                .downcast::<T>()
                .map(|object| Some(*object))
                .map_err(|_| {
                    StorageError::InvalidArgument(
                        "query result type does not match the mapped type".into(),
                    )
                }),
        }
    }

    /// Repositions the cursor before the next read.
    ///
    /// Absolute indices are zero-based; negative absolute indices count
    /// from the end of the result. Relative indices move the cursor by a
    /// row delta. Requires driver-side scrollable cursors.
    pub fn set_position(&mut self, index: i64, relative: bool) {
        self.raw.set_position(index, relative);
    }
}
