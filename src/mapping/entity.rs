//! # Entity Flags
//!
//! Every persisted object carries an [`EntityState`] with three flags:
//!
//! - **persistent**: set once the object has been stored in or read from a
//!   storage. The flag is monotonic; to store an object as new, create a
//!   copy.
//! - **storing**: set while the object is being written, cleared on success
//!   or failure. Reference stores never recurse into an object that is
//!   currently being stored.
//! - **modified**: optional modification tracking. `None` means the type
//!   does not track modifications and is always written; `Some(false)`
//!   skips the attribute update while child trees are still traversed.
//!
//! The [`Entity`] trait exposes the state together with the `Any`-style
//! downcasting the dynamic mapping layer needs. Use
//! [`impl_entity!`](crate::impl_entity) to implement it for a struct with an
//! embedded `state` field; implement the trait by hand to override the
//! [`Entity::after_store`] hook.

use crate::error::StorageResult;
use crate::mapping::TypeKey;
use std::any::Any;

/// Persistence flags carried by every entity.
#[derive(Debug, Clone, Default)]
pub struct EntityState {
    persistent: bool,
    storing: bool,
    modified: Option<bool>,
}

impl EntityState {
    /// Creates a fresh, non-persistent state without modification tracking.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state with modification tracking enabled.
    #[must_use]
    pub fn tracking_modifications() -> Self {
        Self {
            modified: Some(true),
            ..Self::default()
        }
    }

    /// True once the object exists in a storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Marks the object as persistent. The flag never clears.
    pub fn set_persistent(&mut self) {
        self.persistent = true;
    }

    /// True while the object is being written.
    #[must_use]
    pub fn is_storing(&self) -> bool {
        self.storing
    }

    /// Sets the storing flag. Managed by the framework during stores;
    /// setting it manually suppresses reference stores for this object.
    pub fn set_storing(&mut self, storing: bool) {
        self.storing = storing;
    }

    /// The modification flag, or `None` if the type does not track it.
    #[must_use]
    pub fn modified(&self) -> Option<bool> {
        self.modified
    }

    /// Sets the modification flag. Enables tracking if it was absent.
    pub fn set_modified(&mut self, modified: bool) {
        self.modified = Some(modified);
    }

    /// True if the object's attributes must be written on store.
    ///
    /// Objects without modification tracking always need to be stored.
    #[must_use]
    pub fn needs_store(&self) -> bool {
        self.modified.unwrap_or(true)
    }
}

/// A persisted domain object.
///
/// Implementations are normally generated with
/// [`impl_entity!`](crate::impl_entity).
pub trait Entity: Any + Send {
    /// The type key of the concrete entity type.
    fn type_key(&self) -> TypeKey;

    /// The persistence flags of this object.
    fn state(&self) -> &EntityState;

    /// Mutable access to the persistence flags.
    fn state_mut(&mut self) -> &mut EntityState;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Consuming upcast for downcasting boxed entities.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Invoked after a successful store, once the flags are updated.
    fn after_store(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

impl dyn Entity {
    /// Downcasts to a concrete entity type.
    #[must_use]
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Mutably downcasts to a concrete entity type.
    #[must_use]
    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_flag_is_monotonic() {
        let mut state = EntityState::new();

        assert!(!state.is_persistent());
        state.set_persistent();
        assert!(state.is_persistent());
    }

    #[test]
    fn untracked_objects_always_need_storing() {
        let state = EntityState::new();

        assert_eq!(state.modified(), None);
        assert!(state.needs_store());
    }

    #[test]
    fn tracked_objects_honor_the_flag() {
        let mut state = EntityState::tracking_modifications();

        assert!(state.needs_store());
        state.set_modified(false);
        assert!(!state.needs_store());
    }
}
