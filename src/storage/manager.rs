//! # Storage Manager
//!
//! The process-wide directory of storage definitions and mappings, plus a
//! per-thread, usage-counted handle cache.
//!
//! ## Registries
//!
//! - **Definitions**: [`register_storage`] associates a
//!   [`StorageDefinition`] with one or more lookup keys;
//!   [`set_default_storage`] registers the fallback used for unmatched
//!   keys. The registries are `RwLock`-protected maps written during
//!   application initialization and read on every storage access.
//! - **Mappings**: [`register_mapping`] associates an [`ObjectMapping`]
//!   with its mapped type. [`register_mapping_factory`] adds factories
//!   consulted in registration order for types without an explicit
//!   mapping. A type that neither registry resolves is a mapping error —
//!   there is no reflection fallback.
//!
//! ## Handle cache
//!
//! [`get_storage`] returns the calling thread's cached handle for the
//! resolved definition, incrementing its usage count; a missing or
//! invalid handle is replaced by a fresh connection. Each release
//! decrements the count; at zero the handle leaves the cache and its
//! connection closes. Separate threads always receive separate handles,
//! so parallel use of one definition requires no application-side
//! locking. [`new_storage`] bypasses the cache and returns an unmanaged
//! handle the caller owns.

use crate::driver::StorageDefinition;
use crate::error::{StorageError, StorageResult};
use crate::mapping::{Entity, ObjectMapping, TypeKey};
use crate::storage::StorageHandle;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// A lookup key for registered storage definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Keyed by a mapped type.
    Type(TypeKey),
    /// Keyed by an application-defined name.
    Name(String),
    /// The reserved key of the default storage definition.
    Default,
}

impl StorageKey {
    /// The key for a mapped type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self::Type(TypeKey::of::<T>())
    }
}

impl From<&str> for StorageKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for StorageKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<TypeKey> for StorageKey {
    fn from(key: TypeKey) -> Self {
        Self::Type(key)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(key) => write!(f, "{key}"),
            Self::Name(name) => f.write_str(name),
            Self::Default => f.write_str("<default>"),
        }
    }
}

/// A factory producing mappings for types without an explicit
/// registration.
pub type MappingFactory = Arc<dyn Fn(TypeKey) -> Option<Arc<dyn ObjectMapping>> + Send + Sync>;

static DEFINITIONS: Lazy<RwLock<HashMap<StorageKey, Arc<dyn StorageDefinition>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static MAPPINGS: Lazy<RwLock<HashMap<TypeId, Arc<dyn ObjectMapping>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static FACTORIES: Lazy<RwLock<Vec<MappingFactory>>> = Lazy::new(|| RwLock::new(Vec::new()));

thread_local! {
    static THREAD_STORAGES: RefCell<HashMap<String, StorageHandle>> =
        RefCell::new(HashMap::new());
}

/// Registers a storage definition under one or more lookup keys.
pub fn register_storage(
    definition: Arc<dyn StorageDefinition>,
    keys: impl IntoIterator<Item = StorageKey>,
) -> StorageResult<()> {
    let keys: Vec<StorageKey> = keys.into_iter().collect();

    if keys.is_empty() {
        return Err(StorageError::InvalidArgument(
            "at least one storage key is required".into(),
        ));
    }

    let mut definitions = DEFINITIONS.write();

    for key in keys {
        definitions.insert(key, definition.clone());
    }

    Ok(())
}

/// Registers the default storage definition, used for every key without
/// a specific registration.
pub fn set_default_storage(definition: Arc<dyn StorageDefinition>) {
    DEFINITIONS.write().insert(StorageKey::Default, definition);
}

/// Resolves the storage definition for a key, falling back to the
/// default definition.
#[must_use]
pub fn storage_definition(key: &StorageKey) -> Option<Arc<dyn StorageDefinition>> {
    let definitions = DEFINITIONS.read();

    definitions
        .get(key)
        .or_else(|| definitions.get(&StorageKey::Default))
        .cloned()
}

/// Returns the calling thread's storage handle for a key, creating and
/// caching one if necessary. Every call increments the handle's usage
/// count; pair it with [`StorageHandle::release`].
pub fn get_storage(key: impl Into<StorageKey>) -> StorageResult<StorageHandle> {
    let key = key.into();
    let definition =
        storage_definition(&key).ok_or_else(|| StorageError::UnknownKey(key.to_string()))?;

    storage_for_definition(definition)
}

/// Returns the calling thread's handle for a storage definition,
/// creating and caching one if necessary.
pub fn storage_for_definition(
    definition: Arc<dyn StorageDefinition>,
) -> StorageResult<StorageHandle> {
    THREAD_STORAGES.with(|storages| {
        let mut storages = storages.borrow_mut();
        let identity = definition.identity();

        if let Some(handle) = storages.get(&identity) {
            if handle.is_valid() {
                handle.acquire();

                return Ok(handle.clone());
            }
        }

        let handle = StorageHandle::open(definition, true)?;

        storages.insert(identity, handle.clone());
        Ok(handle)
    })
}

/// Creates a fresh, unmanaged storage handle for a key. The caller owns
/// the complete lifecycle and must release the handle itself.
pub fn new_storage(key: impl Into<StorageKey>) -> StorageResult<StorageHandle> {
    let key = key.into();
    let definition =
        storage_definition(&key).ok_or_else(|| StorageError::UnknownKey(key.to_string()))?;

    StorageHandle::open(definition, false)
}

/// Releases a storage handle. Invoked by [`StorageHandle::release`].
pub(crate) fn release_storage(handle: &StorageHandle) {
    let (closed, managed, identity) = {
        let mut inner = handle.0.borrow_mut();

        inner.usage = inner.usage.saturating_sub(1);

        if inner.usage == 0 {
            let identity = inner.definition.identity();
            let managed = inner.managed;

            inner.close();
            (true, managed, identity)
        } else {
            (false, false, String::new())
        }
    };

    if closed && managed {
        THREAD_STORAGES.with(|storages| {
            storages.borrow_mut().remove(&identity);
        });
    }
}

/// Registers the mapping for its mapped type.
///
/// At most one mapping is active per type; re-registration replaces the
/// previous mapping.
pub fn register_mapping(mapping: Arc<dyn ObjectMapping>) {
    MAPPINGS
        .write()
        .insert(mapping.mapped_type().type_id(), mapping);
}

/// Registers a mapping factory, consulted in registration order for
/// types without an explicit mapping.
pub fn register_mapping_factory(factory: MappingFactory) {
    FACTORIES.write().push(factory);
}

/// Resolves the mapping for a type key.
pub fn mapping_for(key: TypeKey) -> StorageResult<Arc<dyn ObjectMapping>> {
    if let Some(mapping) = MAPPINGS.read().get(&key.type_id()) {
        return Ok(mapping.clone());
    }

    let factories = FACTORIES.read().clone();

    for factory in factories {
        if let Some(mapping) = factory(key) {
            MAPPINGS.write().insert(key.type_id(), mapping.clone());

            return Ok(mapping);
        }
    }

    Err(StorageError::NoMapping(key.to_string()))
}

/// Resolves the mapping for a concrete type.
pub fn get_mapping<T: 'static>() -> StorageResult<Arc<dyn ObjectMapping>> {
    mapping_for(TypeKey::of::<T>())
}

/// Resolves the mapping for an entity instance.
pub fn mapping_for_entity(entity: &dyn Entity) -> StorageResult<Arc<dyn ObjectMapping>> {
    mapping_for(entity.type_key())
}

/// Checks whether an object is already persistent in a storage, which is
/// true once it has been stored in or read from one.
#[must_use]
pub fn is_persistent(entity: &dyn Entity) -> bool {
    entity.state().is_persistent() || entity.state().is_storing()
}

/// Converts user wildcards to SQL LIKE wildcards (`*` to `%`, `?` to
/// `_`).
#[must_use]
pub fn convert_to_sql_constraint(constraint: &str) -> String {
    constraint.replace('*', "%").replace('?', "_")
}

/// Shuts down the storage management: closes the calling thread's cached
/// handles and clears the definition registry.
pub fn shutdown() {
    THREAD_STORAGES.with(|storages| storages.borrow_mut().clear());
    DEFINITIONS.write().clear();
}
