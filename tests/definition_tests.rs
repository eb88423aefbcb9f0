//! Storage definition identity: definitions with equal connection
//! parameters are interchangeable, and file-backed storages keep their
//! data across handle lifecycles.

mod common;

use common::*;
use relstore::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn equal_definitions_share_the_cached_handle() {
    register_test_mappings();

    let dir = tempdir().unwrap();
    let path = dir.path().join("definitions.db");

    // two definition instances with the same parameters
    let first = Arc::new(SqliteDefinition::file(&path));
    let second = Arc::new(SqliteDefinition::file(&path));

    let handle_one = manager::storage_for_definition(first).unwrap();

    handle_one.init_object_storage::<TestRecord>().unwrap();

    let mut record = TestRecord::new(1, "jones", 1, test_date());

    handle_one.store(&mut record).unwrap();

    // equality goes by parameters, never instance identity: the second
    // definition resolves to the same handle and sees uncommitted work
    let handle_two = manager::storage_for_definition(second).unwrap();
    let mut query = handle_two.query(for_all::<TestRecord>()).unwrap();

    assert_eq!(query.size().unwrap(), 1);
    drop(query);

    handle_one.commit().unwrap();
    handle_two.release();
    handle_one.release();
}

#[test]
fn file_backed_data_survives_handle_lifecycles() {
    register_test_mappings();

    let dir = tempdir().unwrap();
    let path = dir.path().join("persistent.db");

    {
        let storage = manager::storage_for_definition(Arc::new(SqliteDefinition::file(&path)))
            .unwrap();

        storage.init_object_storage::<TestRecord>().unwrap();
        store_test_records(&storage, "smith", 1, 2).unwrap();
        storage.commit().unwrap();
        storage.release();
    }

    // a fresh handle on a fresh definition reads the stored rows
    let storage =
        manager::storage_for_definition(Arc::new(SqliteDefinition::file(&path))).unwrap();
    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("smith"))))
        .unwrap();

    assert_eq!(query.size().unwrap(), 2);
    drop(query);

    storage.release();
}
