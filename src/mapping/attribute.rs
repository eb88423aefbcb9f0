//! # Attribute Descriptors
//!
//! An [`Attribute`] names one persisted field of a mapped type and carries
//! the metadata the framework needs to query, store and create columns for
//! it: the datatype class, flags (`id`, `parent`, `autogenerated`,
//! `mandatory`, `unique`, `indexed`), optional storage/SQL name overrides,
//! the storage length, element/key/value datatype hints for collections and
//! the referenced type for reference and parent attributes.
//!
//! Attributes are built with a fluent constructor:
//!
//! ```ignore
//! let id = Attribute::new("id", DataType::Int4).id().autogenerated();
//! let name = Attribute::new("name", DataType::Text)
//!     .mandatory()
//!     .with_length(100);
//! let parent = Attribute::new("parent", DataType::Int4)
//!     .parent(TypeKey::of::<Record>());
//! ```
//!
//! The resolved SQL identifier and the computed SQL column datatype are
//! cached on the descriptor after first resolution.

use crate::mapping::TypeKey;
use crate::types::DataType;
use std::sync::OnceLock;

/// Default maximum storage length for variable-length attributes.
pub const DEFAULT_STORAGE_LENGTH: u32 = 2048;

/// Descriptor of a single persisted attribute.
#[derive(Debug, Clone, Default)]
pub struct Attribute {
    name: String,
    datatype: DataType,
    id: bool,
    parent: bool,
    autogenerated: bool,
    mandatory: bool,
    unique: bool,
    indexed: bool,
    omit_namespace: bool,
    ordered: bool,
    storage_name: Option<String>,
    sql_name: Option<String>,
    sql_datatype: Option<String>,
    length: u32,
    element_type: Option<DataType>,
    key_type: Option<DataType>,
    value_type: Option<DataType>,
    reference: Option<TypeKey>,
    resolved_sql_name: OnceLock<String>,
    resolved_sql_datatype: OnceLock<String>,
}

impl Attribute {
    /// Creates a new attribute descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            length: DEFAULT_STORAGE_LENGTH,
            ..Self::default()
        }
    }

    /// Marks this attribute as the id attribute of its type.
    #[must_use]
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Marks this attribute as a parent reference to the given type.
    #[must_use]
    pub fn parent(mut self, parent_type: TypeKey) -> Self {
        self.parent = true;
        self.reference = Some(parent_type);
        self
    }

    /// Marks this attribute as a reference to another mapped type.
    #[must_use]
    pub fn references(mut self, referenced_type: TypeKey) -> Self {
        self.reference = Some(referenced_type);
        self
    }

    /// Marks the attribute value as generated by the storage.
    #[must_use]
    pub fn autogenerated(mut self) -> Self {
        self.autogenerated = true;
        self
    }

    /// Marks the attribute as NOT NULL.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Marks the attribute as UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Requests an index on the attribute column.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Stores type names without their module path.
    #[must_use]
    pub fn omit_namespace(mut self) -> Self {
        self.omit_namespace = true;
        self
    }

    /// Marks enum attributes as ordinal-prefixed and collections as ordered.
    #[must_use]
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    /// Sets the generic storage name.
    #[must_use]
    pub fn with_storage_name(mut self, name: impl Into<String>) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    /// Sets an explicit SQL identifier, bypassing name derivation.
    #[must_use]
    pub fn with_sql_name(mut self, name: impl Into<String>) -> Self {
        self.sql_name = Some(name.into());
        self
    }

    /// Sets an explicit SQL column datatype for CREATE TABLE statements.
    #[must_use]
    pub fn with_sql_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.sql_datatype = Some(datatype.into());
        self
    }

    /// Sets the maximum storage length.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Sets the element datatype hint for collection attributes.
    #[must_use]
    pub fn with_element_type(mut self, datatype: DataType) -> Self {
        self.element_type = Some(datatype);
        self
    }

    /// Sets the key datatype hint for map attributes.
    #[must_use]
    pub fn with_key_type(mut self, datatype: DataType) -> Self {
        self.key_type = Some(datatype);
        self
    }

    /// Sets the value datatype hint for map attributes.
    #[must_use]
    pub fn with_value_type(mut self, datatype: DataType) -> Self {
        self.value_type = Some(datatype);
        self
    }

    /// The logical attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared datatype class.
    #[must_use]
    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    /// True for the id attribute.
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.id
    }

    /// True for parent reference attributes.
    #[must_use]
    pub fn is_parent(&self) -> bool {
        self.parent
    }

    /// True for reference attributes that are not part of the hierarchy.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !self.parent && self.reference.is_some()
    }

    /// True if the value is generated by the storage.
    #[must_use]
    pub fn is_autogenerated(&self) -> bool {
        self.autogenerated
    }

    /// True for NOT NULL attributes.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// True for UNIQUE attributes.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// True for indexed attributes.
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// True if type names should be stored without their namespace.
    #[must_use]
    pub fn omits_namespace(&self) -> bool {
        self.omit_namespace
    }

    /// True for ordinal-prefixed enums and ordered collections.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// The generic storage name override, if set.
    #[must_use]
    pub fn storage_name(&self) -> Option<&str> {
        self.storage_name.as_deref()
    }

    /// The explicit SQL identifier, if set.
    #[must_use]
    pub fn sql_name_override(&self) -> Option<&str> {
        self.sql_name.as_deref()
    }

    /// The explicit SQL column datatype, if set.
    #[must_use]
    pub fn sql_datatype_override(&self) -> Option<&str> {
        self.sql_datatype.as_deref()
    }

    /// The maximum storage length.
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// The element datatype hint for collection attributes.
    #[must_use]
    pub fn element_type(&self) -> Option<DataType> {
        self.element_type
    }

    /// The key datatype hint for map attributes.
    #[must_use]
    pub fn key_type(&self) -> Option<DataType> {
        self.key_type
    }

    /// The value datatype hint for map attributes.
    #[must_use]
    pub fn value_type(&self) -> Option<DataType> {
        self.value_type
    }

    /// The referenced type for parent and reference attributes.
    #[must_use]
    pub fn reference(&self) -> Option<TypeKey> {
        self.reference
    }

    /// Cache cell for the resolved SQL identifier.
    pub(crate) fn resolved_sql_name(&self) -> &OnceLock<String> {
        &self.resolved_sql_name
    }

    /// Cache cell for the computed SQL column datatype.
    pub(crate) fn resolved_sql_datatype(&self) -> &OnceLock<String> {
        &self.resolved_sql_datatype
    }
}
