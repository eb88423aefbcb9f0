//! # Lazy Child Lists
//!
//! A [`ChildList`] is the container type parent structs embed for their
//! child collections. Freshly created lists are plain in-memory vectors;
//! lists installed by the query executor start out *pending* — they hold
//! a storage definition and a child sub-query instead of elements, and
//! materialize on first access.
//!
//! ## Materialization rules
//!
//! 1. creating a pending list never issues a query
//! 2. reading the length answers from the recorded child count, if one
//!    was read from the parent row; otherwise it materializes
//! 3. any element access materializes
//! 4. after materialization the list is an ordinary ordered sequence
//! 5. mutations after materialization never re-query
//!
//! A pending list sized from a child-count column must be materialized
//! before it is mutated, otherwise the count written back on the next
//! store of the parent would not reflect the stored children; the
//! mutating accessors enforce this by materializing first.
//!
//! Materialization acquires its own storage handle from the manager using
//! the captured definition, runs the child query, back-fills the parent
//! reference into each element and releases the handle again.

use crate::driver::StorageDefinition;
use crate::error::{StorageError, StorageResult};
use crate::mapping::{Entity, TypeKey};
use crate::predicate::RawQuery;
use crate::storage::manager;
use crate::storage::query::QueryCore;
use crate::types::Value;
use std::sync::Arc;

/// The deferred sub-query captured by a pending child list.
#[derive(Clone)]
pub struct PendingChildren {
    definition: Arc<dyn StorageDefinition>,
    query: RawQuery,
    known_size: Option<usize>,
    parent_type: TypeKey,
    parent_id: Value,
    child_attribute: String,
}

impl PendingChildren {
    pub(crate) fn new(
        definition: Arc<dyn StorageDefinition>,
        query: RawQuery,
        known_size: Option<usize>,
        parent_type: TypeKey,
        parent_id: Value,
        child_attribute: String,
    ) -> Self {
        Self {
            definition,
            query,
            known_size,
            parent_type,
            parent_id,
            child_attribute,
        }
    }

    /// The child count recorded on the parent row, if any.
    #[must_use]
    pub fn known_size(&self) -> Option<usize> {
        self.known_size
    }

    /// The deferred child query.
    #[must_use]
    pub fn query(&self) -> &RawQuery {
        &self.query
    }

    fn run<T: Entity>(&self) -> StorageResult<Vec<T>> {
        let storage = manager::storage_for_definition(self.definition.clone())?;

        let outcome = (|| -> StorageResult<Vec<Box<dyn Entity>>> {
            let mut core = QueryCore::new(storage.clone(), self.query.clone())?;
            let mut result = core.execute()?;
            let mut children: Vec<Box<dyn Entity>> = Vec::new();

            while result.has_next()? {
                if let Some(child) = result.next_object()? {
                    children.push(child);
                }
            }

            Ok(children)
        })();

        storage.release();

        let mut children = outcome?;

        let parent_mapping = manager::mapping_for(self.parent_type)?;
        let child_spec = parent_mapping
            .child_mappings()
            .iter()
            .find(|child| {
                child.child_type() == self.query.type_key
                    && child.attribute() == self.child_attribute
            })
            .ok_or_else(|| {
                StorageError::InvalidArgument(format!(
                    "no child mapping '{}' in {}",
                    self.child_attribute, self.parent_type
                ))
            })?;

        parent_mapping.init_children(&self.parent_id, &mut children, child_spec)?;

        children
            .into_iter()
            .map(|child| {
                child.into_any().downcast::<T>().map(|child| *child).map_err(|_| {
                    StorageError::InvalidArgument(
                        "child query result type does not match the child list type".into(),
                    )
                })
            })
            .collect()
    }
}

enum ListState<T> {
    Ready(Vec<T>),
    Pending(PendingChildren),
}

/// An ordered child collection that materializes its elements through a
/// sub-query on first access.
pub struct ChildList<T: Entity> {
    state: ListState<T>,
}

impl<T: Entity> ChildList<T> {
    /// Creates an empty, already materialized list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ListState::Ready(Vec::new()),
        }
    }

    /// Creates a materialized list from existing elements.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            state: ListState::Ready(items),
        }
    }

    /// Creates a pending list that materializes on first access.
    ///
    /// Called by mapping implementations from `set_lazy_children`.
    #[must_use]
    pub fn from_pending(pending: PendingChildren) -> Self {
        Self {
            state: ListState::Pending(pending),
        }
    }

    /// True once the elements are in memory.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ListState::Ready(_))
    }

    /// The size known without a query: the loaded length or the child
    /// count recorded on the parent row.
    #[must_use]
    pub fn known_size(&self) -> Option<usize> {
        match &self.state {
            ListState::Ready(items) => Some(items.len()),
            ListState::Pending(pending) => pending.known_size(),
        }
    }

    /// The number of elements. Answers from the recorded child count
    /// without a query where possible.
    pub fn len(&mut self) -> StorageResult<usize> {
        if let Some(size) = self.known_size() {
            return Ok(size);
        }

        Ok(self.load()?.len())
    }

    /// True if the list has no elements.
    pub fn is_empty(&mut self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Materializes the list if necessary and returns its elements.
    pub fn load(&mut self) -> StorageResult<&mut Vec<T>> {
        if let ListState::Pending(pending) = &self.state {
            let items = pending.run()?;

            self.state = ListState::Ready(items);
        }

        match &mut self.state {
            ListState::Ready(items) => Ok(items),
            ListState::Pending(_) => unreachable!("list was materialized above"),
        }
    }

    /// Iterates the elements, materializing first.
    pub fn iter(&mut self) -> StorageResult<std::slice::Iter<'_, T>> {
        Ok(self.load()?.iter())
    }

    /// Mutably iterates the elements, materializing first.
    pub fn iter_mut(&mut self) -> StorageResult<std::slice::IterMut<'_, T>> {
        Ok(self.load()?.iter_mut())
    }

    /// The element at an index, materializing first.
    pub fn get(&mut self, index: usize) -> StorageResult<Option<&T>> {
        Ok(self.load()?.get(index))
    }

    /// Appends an element, materializing first.
    pub fn push(&mut self, item: T) -> StorageResult<()> {
        self.load()?.push(item);

        Ok(())
    }

    /// Removes and returns the element at an index, materializing first.
    pub fn remove(&mut self, index: usize) -> StorageResult<T> {
        let items = self.load()?;

        if index < items.len() {
            Ok(items.remove(index))
        } else {
            Err(StorageError::InvalidArgument(format!(
                "child list index {index} out of bounds"
            )))
        }
    }

    /// The loaded elements, or `None` while the list is pending.
    #[must_use]
    pub fn loaded(&self) -> Option<&[T]> {
        match &self.state {
            ListState::Ready(items) => Some(items),
            ListState::Pending(_) => None,
        }
    }
}

impl<T: Entity> Default for ChildList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> From<Vec<T>> for ChildList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Entity + Clone> Clone for ChildList<T> {
    fn clone(&self) -> Self {
        match &self.state {
            ListState::Ready(items) => Self::from_vec(items.clone()),
            ListState::Pending(pending) => Self::from_pending(pending.clone()),
        }
    }
}

impl<T: Entity + std::fmt::Debug> std::fmt::Debug for ChildList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            ListState::Ready(items) => f.debug_list().entries(items).finish(),
            ListState::Pending(pending) => f
                .debug_struct("ChildList")
                .field("pending", &pending.query().type_key.name())
                .field("known_size", &pending.known_size())
                .finish(),
        }
    }
}
