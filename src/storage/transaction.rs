//! # Group Transactions
//!
//! [`TransactionGroup`] brackets several storage handles into one
//! transactional unit: `begin`, `add` each participating handle, then
//! `commit` or `rollback` them together. The group does not own the
//! handles — acquiring and releasing them stays with the caller.
//!
//! The primary (and intentionally only framework-internal) user is the
//! default reference store: storing a referenced object runs on the
//! storage registered for the referenced type, inside a group
//! transaction. If the store or the commit fails, a rollback is attempted
//! and — should the rollback itself fail — that failure is logged and
//! swallowed so the original error reaches the caller.

use crate::error::StorageResult;
use crate::mapping::Entity;
use crate::storage::{manager, StorageHandle, StorageKey};
use tracing::error;

/// A group of storage handles committed or rolled back together.
#[derive(Default)]
pub struct TransactionGroup {
    elements: Vec<StorageHandle>,
}

impl TransactionGroup {
    /// Begins an empty group transaction.
    #[must_use]
    pub fn begin() -> Self {
        Self::default()
    }

    /// Adds a storage handle to the transactional unit.
    pub fn add(&mut self, storage: StorageHandle) {
        self.elements.push(storage);
    }

    /// Commits all participating handles in registration order.
    ///
    /// Stops at the first failing commit; already committed handles stay
    /// committed.
    pub fn commit(&mut self) -> StorageResult<()> {
        for storage in &self.elements {
            storage.commit()?;
        }

        Ok(())
    }

    /// Rolls back all participating handles.
    ///
    /// Every handle is attempted; the first failure is returned.
    pub fn rollback(&mut self) -> StorageResult<()> {
        let mut first_error = None;

        for storage in &self.elements {
            if let Err(rollback_error) = storage.rollback() {
                first_error.get_or_insert(rollback_error);
            }
        }

        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

/// Stores a referenced object inside a group transaction on the storage
/// registered for its type.
///
/// This is the default implementation behind
/// [`ObjectMapping::store_reference`](crate::mapping::ObjectMapping::store_reference).
/// A failed rollback on the error path is logged and swallowed; the
/// original store error propagates.
pub(crate) fn store_reference_in_transaction(referenced: &mut dyn Entity) -> StorageResult<()> {
    let mut transaction = TransactionGroup::begin();
    let storage = manager::get_storage(StorageKey::Type(referenced.type_key()))?;

    transaction.add(storage.clone());

    let result = storage
        .store_dyn(referenced)
        .and_then(|()| transaction.commit());

    let result = match result {
        Ok(()) => Ok(()),
        Err(store_error) => {
            if let Err(rollback_error) = transaction.rollback() {
                error!("transaction rollback failed: {rollback_error}");
            }

            Err(store_error)
        }
    };

    storage.release();
    result
}
