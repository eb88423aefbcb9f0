//! # Storage Mappings
//!
//! A storage mapping describes how one domain type projects onto a table:
//! its attributes in a stable order, the id attribute, parent and child
//! relationships, and the value conversion rules applied on the way in and
//! out of the storage.
//!
//! ## Overview
//!
//! There is no reflection in this crate: every persisted type has exactly
//! one hand-written [`ObjectMapping`] implementation, registered with the
//! storage manager. The mapping layer is fully dynamic — objects travel as
//! `&dyn Entity` / `Box<dyn Entity>` so that child hierarchies, reference
//! stores and the manager registry can operate without knowing concrete
//! types. Typed APIs (`Query<T>`, `ChildList<T>`) downcast at the edges.
//!
//! ## Key Pieces
//!
//! - [`TypeKey`]: an opaque handle for a mapped type (type id plus simple
//!   name)
//! - [`Attribute`]: the per-field descriptor (flags, datatype, naming and
//!   length metadata)
//! - [`ChildMapping`]: links a collection-valued attribute to the child
//!   type stored in it
//! - [`Entity`] and [`EntityState`]: persistence flags every stored object
//!   carries
//! - [`ObjectMapping`]: the mapping trait itself
//! - [`convert`]: the default incoming/outgoing value conversion policy
//!
//! ## Hierarchies
//!
//! A child type declares a `parent` attribute referencing its parent type;
//! the parent declares a [`ChildMapping`] for the collection attribute that
//! holds the children. Parent back-references are carried as the parent's
//! id value. Self-referencing hierarchies (a type whose children are of its
//! own type) are supported; queries for hierarchy roots add an implicit
//! `parent IS NULL` criterion.

mod attribute;
pub mod convert;
mod entity;

pub use attribute::{Attribute, DEFAULT_STORAGE_LENGTH};
pub use entity::{Entity, EntityState};

use crate::error::{StorageError, StorageResult};
use crate::predicate::Criterion;
use crate::storage::manager;
use crate::storage::PendingChildren;
use crate::types::Value;
use std::any::TypeId;
use std::fmt;
use std::sync::OnceLock;

/// An opaque handle identifying a mapped domain type.
///
/// Equality and hashing use the Rust type id; the simple type name is
/// carried for diagnostics and storage-name derivation.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for a concrete type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: simple_type_name(std::any::type_name::<T>()),
        }
    }

    /// The underlying Rust type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// The simple (unqualified) type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn simple_type_name(full: &'static str) -> &'static str {
    let head_end = full.find('<').unwrap_or(full.len());
    let start = full[..head_end].rfind("::").map_or(0, |i| i + 2);

    &full[start..]
}

/// Links a collection-valued attribute of a parent type to the child type
/// stored in it.
#[derive(Debug)]
pub struct ChildMapping {
    child_type: TypeKey,
    attribute: String,
    child_count_column: OnceLock<String>,
}

impl ChildMapping {
    /// Creates a new child mapping for a collection attribute.
    #[must_use]
    pub fn new(child_type: TypeKey, attribute: impl Into<String>) -> Self {
        Self {
            child_type,
            attribute: attribute.into(),
            child_count_column: OnceLock::new(),
        }
    }

    /// The child type stored in the collection.
    #[must_use]
    pub fn child_type(&self) -> TypeKey {
        self.child_type
    }

    /// The name of the collection attribute on the parent.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Cache cell for the derived child-count column name.
    pub(crate) fn child_count_column(&self) -> &OnceLock<String> {
        &self.child_count_column
    }
}

impl PartialEq for ChildMapping {
    fn eq(&self, other: &Self) -> bool {
        self.child_type == other.child_type && self.attribute == other.attribute
    }
}

/// Describes how a domain type is persisted.
///
/// One implementation exists per persisted type. The trait is object-safe;
/// the framework always works with `&dyn ObjectMapping` obtained from the
/// [`manager`] registry.
pub trait ObjectMapping: Send + Sync {
    /// The mapped domain type.
    fn mapped_type(&self) -> TypeKey;

    /// The generic storage name, used to derive the SQL table name.
    fn storage_name(&self) -> &str;

    /// An explicit SQL table name, bypassing name derivation.
    fn sql_name_override(&self) -> Option<&str> {
        None
    }

    /// The persisted attributes in a stable order.
    fn attributes(&self) -> &[Attribute];

    /// The id attribute.
    fn id_attribute(&self) -> &Attribute;

    /// The parent attribute referencing the given parent type, if any.
    fn parent_attribute(&self, parent_type: TypeKey) -> Option<&Attribute> {
        self.attributes()
            .iter()
            .find(|a| a.is_parent() && a.reference() == Some(parent_type))
    }

    /// The child mappings of this type.
    fn child_mappings(&self) -> &[ChildMapping] {
        &[]
    }

    /// Looks up an attribute by its logical or storage name.
    fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes()
            .iter()
            .find(|a| a.name() == name || a.storage_name() == Some(name))
    }

    /// Reads an attribute value from an object.
    ///
    /// For reference attributes this returns the referenced object's id
    /// value, not the object itself.
    fn get_value(&self, object: &dyn Entity, attribute: &Attribute) -> StorageResult<Value>;

    /// Writes an attribute value on an object.
    fn set_value(
        &self,
        object: &mut dyn Entity,
        attribute: &Attribute,
        value: Value,
    ) -> StorageResult<()>;

    /// Creates an object from attribute values in declaration order.
    ///
    /// `as_child` is true when the object is created by a child sub-query.
    /// Implementations should normalize each value with
    /// [`ObjectMapping::check_attribute_value`] before assigning it.
    fn create_object(&self, values: Vec<Value>, as_child: bool) -> StorageResult<Box<dyn Entity>>;

    /// Visits each element of a child collection mutably.
    fn for_each_child(
        &self,
        object: &mut dyn Entity,
        child: &ChildMapping,
        action: &mut dyn FnMut(&mut dyn Entity) -> StorageResult<()>,
    ) -> StorageResult<()>;

    /// The number of children in a child collection.
    ///
    /// A lazy child list with a recorded size answers without a query; an
    /// unsized lazy list is materialized first.
    fn child_count(&self, object: &mut dyn Entity, child: &ChildMapping) -> StorageResult<usize>;

    /// Replaces a child collection with materialized children.
    fn set_children(
        &self,
        object: &mut dyn Entity,
        child: &ChildMapping,
        children: Vec<Box<dyn Entity>>,
    ) -> StorageResult<()>;

    /// Installs a lazy child list that materializes on first access.
    fn set_lazy_children(
        &self,
        object: &mut dyn Entity,
        child: &ChildMapping,
        pending: PendingChildren,
    ) -> StorageResult<()>;

    /// Back-fills the parent reference into freshly queried children.
    fn init_children(
        &self,
        parent_id: &Value,
        children: &mut [Box<dyn Entity>],
        child: &ChildMapping,
    ) -> StorageResult<()> {
        let child_mapping = manager::mapping_for(child.child_type())?;
        let parent_attr = child_mapping
            .parent_attribute(self.mapped_type())
            .ok_or_else(|| StorageError::NoParentAttribute {
                parent: self.mapped_type().to_string(),
                child: child.child_type().to_string(),
            })?
            .clone();

        for element in children {
            child_mapping.set_value(element.as_mut(), &parent_attr, parent_id.clone())?;
        }

        Ok(())
    }

    /// Visits the object referenced by a reference attribute, if present.
    ///
    /// Types without reference attributes keep the empty default.
    fn with_reference(
        &self,
        object: &mut dyn Entity,
        attribute: &Attribute,
        action: &mut dyn FnMut(&mut dyn Entity) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let _ = (object, attribute, action);

        Ok(())
    }

    /// Normalizes an incoming value against the attribute datatype.
    fn check_attribute_value(&self, attribute: &Attribute, value: Value) -> StorageResult<Value> {
        convert::check_attribute_value(attribute, value)
    }

    /// Converts an outgoing value to its wire representation.
    fn map_value(&self, attribute: &Attribute, value: Value) -> StorageResult<Value> {
        convert::map_outgoing(attribute, value)
    }

    /// A criterion folded into every query of this type.
    fn default_criteria(&self) -> Option<Criterion> {
        None
    }

    /// Whether objects of this type may be deleted.
    fn is_delete_allowed(&self) -> bool {
        true
    }

    /// Whether an attribute belongs to the object hierarchy.
    fn is_hierarchy_attribute(&self, attribute: &Attribute) -> bool {
        attribute.is_parent()
    }

    /// Stores a referenced object, by default inside a group transaction
    /// on the storage registered for the referenced type.
    fn store_reference(&self, referenced: &mut dyn Entity) -> StorageResult<()> {
        crate::storage::transaction::store_reference_in_transaction(referenced)
    }

    /// An explicit CREATE statement overriding table synthesis.
    fn create_statement_override(&self) -> Option<&str> {
        None
    }

    /// Overrides the dialect's auto-id column datatype for this type.
    fn auto_id_datatype(&self) -> Option<&str> {
        None
    }

    /// Overrides the dialect's 64-bit auto-id column datatype.
    fn long_auto_id_datatype(&self) -> Option<&str> {
        None
    }

    /// Suppresses child-count columns for this type.
    fn disable_child_counts(&self) -> bool {
        false
    }
}
