//! # relstore - Object-Relational Persistence Framework
//!
//! relstore maps application domain objects onto a relational back-end. It
//! is not a full ORM: there are no schema migrations beyond CREATE/DROP, no
//! entity graphs and no cross-storage joins. What it does provide:
//!
//! - **Composable query predicates**: an algebraic criteria tree
//!   (comparisons, boolean joins, negation, sub-queries, sort keys,
//!   SQL function application) compiled into parameterized SQL
//! - **Hand-written storage mappings**: one [`ObjectMapping`] per domain
//!   type describes attributes, the id attribute, parent/child hierarchies
//!   and value conversions
//! - **Lazy child collections**: queried objects carry [`ChildList`]
//!   containers that defer their sub-query until first access
//! - **Managed storage handles**: a process-wide registry of storage
//!   definitions with a per-thread, usage-counted handle cache
//!
//! ## Quick Start
//!
//! ```ignore
//! use relstore::prelude::*;
//!
//! manager::register_mapping(Arc::new(RecordMapping::new()));
//! manager::set_default_storage(Arc::new(MyDefinition::new("db://...")));
//!
//! let storage = manager::get_storage(StorageKey::of::<Record>())?;
//! storage.init_object_storage::<Record>()?;
//!
//! let mut query = storage.query(for_type::<Record>(
//!     if_field("name", equal_to("jones")).and(sort_by("value", true)),
//! ))?;
//!
//! let mut result = query.execute()?;
//! while let Some(record) = result.next()? {
//!     // record.details is a ChildList that queries on first access
//! }
//!
//! storage.release();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │      Storage Manager (keys, definitions,      │
//! │      mappings, per-thread handle cache)       │
//! ├──────────────────────────────────────────────┤
//! │   Storage Handle (store/delete/DDL, commit)   │
//! ├──────────────────────┬───────────────────────┤
//! │  Predicate Algebra   │    Object Mappings    │
//! ├──────────────────────┴───────────────────────┤
//! │    SQL Compiler (criteria → WHERE/ORDER BY)   │
//! ├──────────────────────────────────────────────┤
//! │  Query Executor (cursor, lazy child lists)    │
//! ├──────────────────────────────────────────────┤
//! │     Driver Traits (Connection/Rows/Defs)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Concrete database drivers are out of scope; the crate consumes the
//! [`driver::Connection`] trait. The integration tests adapt SQLite through
//! these traits.
//!
//! ## Module Overview
//!
//! - [`types`]: value model, datatype classes, periods
//! - [`predicate`]: criteria tree, constructors, in-memory evaluation
//! - [`mapping`]: attribute descriptors, the `ObjectMapping` trait,
//!   entity flags, value conversion
//! - [`sql`]: identifier naming, dialect parameters, the criteria compiler
//! - [`driver`]: connection, cursor and storage-definition traits
//! - [`storage`]: storage handles, queries, lazy child lists, the manager,
//!   group transactions

#[macro_use]
mod macros;

pub mod driver;
pub mod error;
pub mod mapping;
pub mod predicate;
pub mod sql;
pub mod storage;
pub mod types;

pub use error::{ErrorKind, StorageError, StorageResult};
pub use mapping::{Attribute, ChildMapping, Entity, EntityState, ObjectMapping, TypeKey};
pub use predicate::{Criterion, FieldExpr, QueryPredicate, RawQuery};
pub use storage::{
    manager, ChildList, Query, QueryResult, StorageHandle, StorageKey, TransactionGroup,
};
pub use types::{DataType, Period, Value};

/// Commonly used items for working with storages.
pub mod prelude {
    pub use crate::driver::{Connection, Rows, StorageDefinition};
    pub use crate::error::{StorageError, StorageResult};
    pub use crate::mapping::{Attribute, ChildMapping, Entity, EntityState, ObjectMapping, TypeKey};
    pub use crate::predicate::{
        almost_like, element_of, equal_to, field, for_all, for_type, greater_or_equal,
        greater_than, has_child, if_attribute, if_field, if_function, is_null, less_or_equal,
        less_than, like, not, refers_to, refers_to_attr, sort_by, Criterion, QueryPredicate,
    };
    pub use crate::storage::{manager, ChildList, StorageHandle, StorageKey};
    pub use crate::types::{DataType, Period, Value};
}
