//! # Storage Handles
//!
//! A [`StorageHandle`] wraps one driver connection together with its
//! dialect parameters and a usage counter. Handles are obtained from the
//! [`manager`] — either shared and usage-counted per thread
//! ([`manager::get_storage`]) or freshly created and caller-owned
//! ([`manager::new_storage`]) — and must be released when no longer used.
//!
//! ## Operations
//!
//! - **Queries**: [`StorageHandle::query`] compiles a query predicate into
//!   a reusable [`Query`]
//! - **Writes**: [`StorageHandle::store`] dispatches per object — insert
//!   for new objects, update for persistent ones — storing modified
//!   references first and child hierarchies afterwards
//! - **Deletes**: [`StorageHandle::delete`] removes a single object by id,
//!   gated by the mapping's delete permission and the process-wide
//!   `RELSTORE_DISABLE_DELETE` switch
//! - **DDL**: `init_object_storage` creates tables (including child
//!   tables) from the mapping, `has_object_storage` checks existence,
//!   `remove_object_storage` drops a single table
//! - **Transactions**: explicit [`StorageHandle::commit`] and
//!   [`StorageHandle::rollback`]; connections never auto-commit
//!
//! ## Lifecycle
//!
//! `Created → Acquired(usage=n) →* Released(usage=0) → Closed`. A handle
//! acquired from the manager increments its usage count on every
//! [`manager::get_storage`] from the same thread; [`StorageHandle::release`]
//! decrements it, and the underlying connection closes when the count
//! reaches zero. Closing rolls back any open transaction.

pub mod child_list;
pub mod manager;
pub mod query;
pub mod result;
pub mod transaction;

pub use child_list::{ChildList, PendingChildren};
pub use manager::StorageKey;
pub use query::Query;
pub use result::QueryResult;
pub use transaction::TransactionGroup;

use crate::driver::{Connection, StorageDefinition};
use crate::error::{StorageError, StorageResult};
use crate::mapping::{Attribute, Entity, ObjectMapping, TypeKey};
use crate::predicate::QueryPredicate;
use crate::sql::{names, DialectParams};
use crate::types::{DataType, Value};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Environment variable disabling every delete operation when truthy.
pub const DELETE_DISABLED_PROPERTY: &str = "RELSTORE_DISABLE_DELETE";

pub(crate) struct StorageInner {
    connection: Option<Box<dyn Connection>>,
    definition: Arc<dyn StorageDefinition>,
    params: DialectParams,
    implementation_name: String,
    usage: u32,
    managed: bool,
    query_depth: Option<u32>,
}

impl StorageInner {
    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(error) = connection.rollback() {
                warn!("rollback on close failed: {error}");
            }
        }
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// A usage-counted wrapper over one driver connection.
///
/// Handles are single-threaded; cloning shares the underlying connection.
#[derive(Clone)]
pub struct StorageHandle(pub(crate) Rc<RefCell<StorageInner>>);

impl StorageHandle {
    pub(crate) fn open(
        definition: Arc<dyn StorageDefinition>,
        managed: bool,
    ) -> StorageResult<Self> {
        let connection = definition.connect()?;
        let implementation_name = connection.implementation_name().to_string();
        let params = definition.dialect();
        let query_depth = definition.default_query_depth();

        Ok(Self(Rc::new(RefCell::new(StorageInner {
            connection: Some(connection),
            definition,
            params,
            implementation_name,
            usage: 1,
            managed,
            query_depth,
        }))))
    }

    pub(crate) fn acquire(&self) {
        self.0.borrow_mut().usage += 1;
    }

    pub(crate) fn with_connection<R>(
        &self,
        action: impl FnOnce(&mut dyn Connection) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let mut inner = self.0.borrow_mut();
        let connection = inner
            .connection
            .as_deref_mut()
            .ok_or_else(|| StorageError::driver("storage is closed"))?;

        action(connection)
    }

    /// The definition this handle was created from.
    #[must_use]
    pub fn definition(&self) -> Arc<dyn StorageDefinition> {
        self.0.borrow().definition.clone()
    }

    /// The dialect parameters of this storage.
    #[must_use]
    pub fn dialect(&self) -> DialectParams {
        self.0.borrow().params.clone()
    }

    /// The driver's product name.
    #[must_use]
    pub fn implementation_name(&self) -> String {
        self.0.borrow().implementation_name.clone()
    }

    /// The default query depth applied to queries on this storage.
    #[must_use]
    pub fn query_depth(&self) -> Option<u32> {
        self.0.borrow().query_depth
    }

    /// Sets the default query depth for queries on this storage.
    pub fn set_query_depth(&self, depth: Option<u32>) {
        self.0.borrow_mut().query_depth = depth;
    }

    /// Whether the underlying connection is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0
            .borrow()
            .connection
            .as_ref()
            .is_some_and(|connection| connection.is_valid())
    }

    /// Commits the current transaction.
    pub fn commit(&self) -> StorageResult<()> {
        self.with_connection(|connection| connection.commit())
    }

    /// Rolls back the current transaction.
    ///
    /// This affects the storage only; objects already modified by the
    /// application are not reset.
    pub fn rollback(&self) -> StorageResult<()> {
        self.with_connection(|connection| connection.rollback())
    }

    /// Compiles a query predicate into a reusable query.
    pub fn query<T: Entity>(&self, predicate: QueryPredicate<T>) -> StorageResult<Query<T>> {
        Query::new(self.clone(), predicate.into_raw())
    }

    /// Stores a single object: insert if it is not yet persistent,
    /// update otherwise. Modified references are stored first, child
    /// hierarchies afterwards.
    pub fn store<E: Entity>(&self, object: &mut E) -> StorageResult<()> {
        self.store_dyn(object)
    }

    /// Stores every object of a collection in iteration order.
    pub fn store_all<'a, E: Entity>(
        &self,
        objects: impl IntoIterator<Item = &'a mut E>,
    ) -> StorageResult<()> {
        for object in objects {
            self.store_dyn(object)?;
        }

        Ok(())
    }

    /// Stores a single dynamically typed object.
    pub fn store_dyn(&self, object: &mut dyn Entity) -> StorageResult<()> {
        object.state_mut().set_storing(true);

        let result = self.store_object(object).and_then(|()| {
            // PERSISTENT is monotonic and only set after a successful store
            object.state_mut().set_persistent();

            if object.state().modified().is_some() {
                object.state_mut().set_modified(false);
            }

            // the after-store hook runs only once the flags are updated
            object.after_store()
        });

        object.state_mut().set_storing(false);
        result
    }

    /// Deletes a single object by its id attribute.
    pub fn delete<E: Entity>(&self, object: &E) -> StorageResult<()> {
        self.delete_dyn(object)
    }

    /// Deletes a single dynamically typed object.
    pub fn delete_dyn(&self, object: &dyn Entity) -> StorageResult<()> {
        let mapping = manager::mapping_for_entity(object)?;

        check_delete_enabled(mapping.as_ref())?;

        let params = self.dialect();
        let id_attribute = mapping.id_attribute();
        let id = mapping.map_value(id_attribute, mapping.get_value(object, id_attribute)?)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            names::quoted_table(&params, mapping.as_ref()),
            names::quoted_attribute(&params, id_attribute),
        );

        debug!(target: "relstore::sql", %sql, "delete");
        self.with_connection(|connection| connection.execute_update(&sql, &[id]))?;

        Ok(())
    }

    /// Initializes the storage for an object type, creating its table and
    /// the tables of its child types if they do not exist. Idempotent.
    pub fn init_object_storage<T: 'static>(&self) -> StorageResult<()> {
        self.init_object_storage_for(TypeKey::of::<T>())
    }

    /// Initializes the storage for a type key.
    pub fn init_object_storage_for(&self, key: TypeKey) -> StorageResult<()> {
        let mapping = manager::mapping_for(key)?;

        self.init_mapping_storage(mapping.as_ref())
    }

    /// Checks whether the storage has been initialized for a type.
    pub fn has_object_storage<T: 'static>(&self) -> StorageResult<bool> {
        let mapping = manager::mapping_for(TypeKey::of::<T>())?;
        let table = names::mapping_sql_name(mapping.as_ref());

        self.with_connection(|connection| connection.table_exists(&table))
    }

    /// Drops the table of a single object type.
    ///
    /// Child tables are intentionally not removed; dropping a hierarchy
    /// requires one call per type.
    pub fn remove_object_storage<T: 'static>(&self) -> StorageResult<()> {
        let mapping = manager::mapping_for(TypeKey::of::<T>())?;

        check_delete_enabled(mapping.as_ref())?;

        let params = self.dialect();
        let table = names::mapping_sql_name(mapping.as_ref());
        let exists = self.with_connection(|connection| connection.table_exists(&table))?;

        if exists {
            let sql = format!("DROP TABLE {}", names::quoted(&params, &table));

            self.with_connection(|connection| connection.execute_update(&sql, &[]))?;
        }

        Ok(())
    }

    /// Releases this handle back to the manager.
    ///
    /// When the usage count reaches zero the underlying connection is
    /// closed and, for managed handles, the handle leaves the calling
    /// thread's cache.
    pub fn release(self) {
        manager::release_storage(&self);
    }

    fn store_object(&self, object: &mut dyn Entity) -> StorageResult<()> {
        let mapping = manager::mapping_for_entity(object)?;
        let insert = !object.state().is_persistent();

        // references go first so generated ids of new referenced objects
        // are available when the referencing row is written
        self.store_references(mapping.as_ref(), object)?;

        if object.state().needs_store() {
            self.store_attributes(mapping.as_ref(), object, insert)?;
        }

        for child in mapping.child_mappings() {
            mapping.for_each_child(object, child, &mut |element| self.store_dyn(element))?;
        }

        Ok(())
    }

    fn store_references(
        &self,
        mapping: &dyn ObjectMapping,
        object: &mut dyn Entity,
    ) -> StorageResult<()> {
        for attribute in mapping.attributes() {
            if !attribute.is_reference() || mapping.is_hierarchy_attribute(attribute) {
                continue;
            }

            mapping.with_reference(object, attribute, &mut |referenced| {
                if !referenced.state().is_storing() && referenced.state().needs_store() {
                    let reference_mapping = manager::mapping_for_entity(referenced)?;

                    reference_mapping.store_reference(referenced)
                } else {
                    Ok(())
                }
            })?;
        }

        Ok(())
    }

    fn store_attributes(
        &self,
        mapping: &dyn ObjectMapping,
        object: &mut dyn Entity,
        insert: bool,
    ) -> StorageResult<()> {
        let params = self.dialect();
        let id_attribute = mapping.id_attribute().clone();

        let generated = insert
            && id_attribute.is_autogenerated()
            && match mapping.get_value(object, &id_attribute)? {
                Value::Null => true,
                Value::Int(id) => id <= 0,
                _ => false,
            };

        let sql = if insert {
            insert_statement(mapping, &params, generated)?
        } else {
            update_statement(mapping, &params)?
        };

        let mut bind: SmallVec<[Value; 8]> = SmallVec::new();
        let mut identity = None;

        for attribute in mapping.attributes() {
            let value = mapping.map_value(attribute, mapping.get_value(object, attribute)?)?;

            if attribute.is_id() {
                identity = Some(value.clone());
            }

            let skip = if insert {
                generated && attribute.is_autogenerated()
            } else {
                attribute.is_id()
            };

            if !skip {
                bind.push(value);
            }
        }

        if !mapping.disable_child_counts() {
            for child in mapping.child_mappings() {
                let count = mapping.child_count(object, child)?;

                bind.push(Value::Int(count as i64));
            }
        }

        if !insert {
            let identity = identity.filter(|value| !value.is_null()).ok_or_else(|| {
                StorageError::NoIdentity(mapping.mapped_type().to_string())
            })?;

            bind.push(identity);
        }

        debug!(target: "relstore::sql", %sql, params = ?bind, "store");

        if insert && generated {
            let key = self.with_connection(|connection| {
                let want_key = connection.supports_generated_keys();

                connection.execute_insert(&sql, &bind, want_key)
            })?;

            let key = Value::Int(key.unwrap_or(-1));
            let key = mapping.check_attribute_value(&id_attribute, key)?;

            mapping.set_value(object, &id_attribute, key)?;
        } else {
            self.with_connection(|connection| connection.execute_update(&sql, &bind))?;
        }

        Ok(())
    }

    fn init_mapping_storage(&self, mapping: &dyn ObjectMapping) -> StorageResult<()> {
        let table = names::mapping_sql_name(mapping);
        let exists = self.with_connection(|connection| connection.table_exists(&table))?;

        if exists {
            return Ok(());
        }

        if let Some(statement) = mapping.create_statement_override() {
            let statement = statement.to_string();

            self.with_connection(|connection| connection.execute_update(&statement, &[]))?;
        } else {
            self.create_table(mapping)?;
        }

        for child in mapping.child_mappings() {
            // child tables are created along, but never through
            // self-references
            if child.child_type() != mapping.mapped_type() {
                let child_mapping = manager::mapping_for(child.child_type())?;

                self.init_mapping_storage(child_mapping.as_ref())?;
            }
        }

        Ok(())
    }

    fn create_table(&self, mapping: &dyn ObjectMapping) -> StorageResult<()> {
        let params = self.dialect();
        let mut columns = String::new();
        let mut id_column = None;
        let mut foreign_keys: Vec<(&Attribute, TypeKey)> = Vec::new();
        let mut indexed: Vec<&Attribute> = Vec::new();

        for attribute in mapping.attributes() {
            let sql_name = names::quoted_attribute(&params, attribute);

            columns.push_str(&sql_name);
            columns.push(' ');
            columns.push_str(&column_datatype(mapping, attribute, &params));

            if attribute.is_unique() {
                columns.push_str(" UNIQUE");
            }

            if attribute.is_mandatory() {
                columns.push_str(" NOT NULL");
            }

            columns.push(',');

            if attribute.is_indexed() {
                indexed.push(attribute);
            }

            if attribute.is_id() {
                id_column = Some(sql_name);
            } else if let Some(referenced) = attribute.reference() {
                foreign_keys.push((attribute, referenced));
            }
        }

        if !mapping.disable_child_counts() {
            for child in mapping.child_mappings() {
                let child_mapping = manager::mapping_for(child.child_type())?;

                columns.push_str(&names::child_count_column(child, child_mapping.as_ref()));
                columns.push_str(" INTEGER,");
            }
        }

        if let Some(id_column) = id_column {
            columns.push_str(&format!("PRIMARY KEY({id_column}),"));
        }

        for (attribute, referenced) in foreign_keys {
            let referenced_mapping = manager::mapping_for(referenced)?;

            columns.push_str(&format!(
                "FOREIGN KEY({}) REFERENCES {}({}),",
                names::quoted_attribute(&params, attribute),
                names::quoted_table(&params, referenced_mapping.as_ref()),
                names::quoted_attribute(&params, referenced_mapping.id_attribute()),
            ));
        }

        columns.pop();

        let table = names::mapping_sql_name(mapping);
        let sql = format!(
            "CREATE TABLE {} ({columns})",
            names::quoted(&params, &table)
        );

        debug!(target: "relstore::sql", %sql, "create table");
        self.with_connection(|connection| connection.execute_update(&sql, &[]))?;

        for attribute in indexed {
            let column = names::attribute_sql_name(attribute);
            let sql = format!(
                "CREATE INDEX idx_{table}_{column} ON {}({})",
                names::quoted(&params, &table),
                names::quoted(&params, column),
            );

            debug!(target: "relstore::sql", %sql, "create index");
            self.with_connection(|connection| connection.execute_update(&sql, &[]))?;
        }

        Ok(())
    }
}

/// Resolves and caches the SQL column datatype of an attribute.
fn column_datatype(
    mapping: &dyn ObjectMapping,
    attribute: &Attribute,
    params: &DialectParams,
) -> String {
    attribute
        .resolved_sql_datatype()
        .get_or_init(|| {
            if let Some(explicit) = attribute.sql_datatype_override() {
                explicit.to_string()
            } else if attribute.is_autogenerated() {
                if attribute.datatype() == DataType::Int8 {
                    mapping
                        .long_auto_id_datatype()
                        .unwrap_or(&params.long_auto_id_datatype)
                        .to_string()
                } else {
                    mapping
                        .auto_id_datatype()
                        .unwrap_or(&params.auto_id_datatype)
                        .to_string()
                }
            } else {
                params.render_datatype(attribute.datatype(), attribute.length())
            }
        })
        .clone()
}

fn check_delete_enabled(mapping: &dyn ObjectMapping) -> StorageResult<()> {
    if !mapping.is_delete_allowed() {
        return Err(StorageError::DeleteNotAllowed(
            mapping.mapped_type().to_string(),
        ));
    }

    if deletes_disabled() {
        return Err(StorageError::DeleteDisabled);
    }

    Ok(())
}

fn deletes_disabled() -> bool {
    std::env::var(DELETE_DISABLED_PROPERTY)
        .map(|value| matches!(value.as_str(), "true" | "TRUE" | "1" | "yes"))
        .unwrap_or(false)
}

fn insert_statement(
    mapping: &dyn ObjectMapping,
    params: &DialectParams,
    generated_id: bool,
) -> StorageResult<String> {
    let mut columns = String::new();
    let mut placeholders = String::new();

    for attribute in mapping.attributes() {
        // generated columns stay out of the statement so the database
        // fills them
        if generated_id && attribute.is_autogenerated() {
            continue;
        }

        columns.push_str(&names::quoted_attribute(params, attribute));
        columns.push(',');
        placeholders.push_str("?,");
    }

    if columns.is_empty() {
        return Err(StorageError::InvalidArgument(format!(
            "no columns to insert for {}",
            mapping.mapped_type()
        )));
    }

    if !mapping.disable_child_counts() {
        for child in mapping.child_mappings() {
            let child_mapping = manager::mapping_for(child.child_type())?;

            columns.push_str(&names::child_count_column(child, child_mapping.as_ref()));
            columns.push(',');
            placeholders.push_str("?,");
        }
    }

    columns.pop();
    placeholders.pop();

    Ok(format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        names::quoted_table(params, mapping)
    ))
}

fn update_statement(mapping: &dyn ObjectMapping, params: &DialectParams) -> StorageResult<String> {
    let mut columns = String::new();
    let mut identity = String::new();

    for attribute in mapping.attributes() {
        let column = names::quoted_attribute(params, attribute);

        if attribute.is_id() {
            identity.push_str(&column);
            identity.push_str("=?");
        } else {
            columns.push_str(&column);
            columns.push_str("=?,");
        }
    }

    if columns.is_empty() || identity.is_empty() {
        return Err(StorageError::NoIdentity(mapping.mapped_type().to_string()));
    }

    if !mapping.disable_child_counts() {
        for child in mapping.child_mappings() {
            let child_mapping = manager::mapping_for(child.child_type())?;

            columns.push_str(&names::child_count_column(child, child_mapping.as_ref()));
            columns.push_str("=?,");
        }
    }

    columns.pop();

    Ok(format!(
        "UPDATE {} SET {columns} WHERE {identity}",
        names::quoted_table(params, mapping)
    ))
}
