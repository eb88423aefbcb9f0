//! Delete and storage removal tests.

mod common;

use common::*;
use relstore::prelude::*;
use relstore::ErrorKind;
use std::sync::Arc;

fn open_storage(db: &str) -> StorageHandle {
    register_test_mappings();

    let definition = Arc::new(SqliteDefinition::shared_memory(db));
    let storage = manager::storage_for_definition(definition).unwrap();

    storage.init_object_storage::<TestRecord>().unwrap();
    storage
}

#[test]
fn deleting_removes_the_row() {
    let storage = open_storage("delete_basic");

    store_test_records(&storage, "jones", 1, 1).unwrap();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))))
        .unwrap();
    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let mut jones = result.next().unwrap().unwrap();

    drop(result);
    drop(query);

    // details first, then the record itself
    for detail in jones.details.load().unwrap().clone() {
        storage.delete(&detail).unwrap();
    }

    storage.delete(&jones).unwrap();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))))
        .unwrap();

    assert!(!query.execute().unwrap().has_next().unwrap());

    let mut details = storage.query(for_all::<TestDetail>()).unwrap();

    assert_eq!(details.size().unwrap(), 0);

    storage.release();
}

#[test]
fn mappings_can_forbid_deletes() {
    #[derive(Debug)]
    struct Sealed {
        id: i64,
        state: EntityState,
    }

    relstore::impl_entity!(Sealed);

    struct SealedMapping {
        attributes: Vec<Attribute>,
    }

    impl ObjectMapping for SealedMapping {
        fn mapped_type(&self) -> TypeKey {
            TypeKey::of::<Sealed>()
        }

        fn storage_name(&self) -> &str {
            "Sealed"
        }

        fn attributes(&self) -> &[Attribute] {
            &self.attributes
        }

        fn id_attribute(&self) -> &Attribute {
            &self.attributes[0]
        }

        fn is_delete_allowed(&self) -> bool {
            false
        }

        fn get_value(&self, object: &dyn Entity, _: &Attribute) -> StorageResult<Value> {
            Ok(Value::Int(downcast_ref::<Sealed>(object)?.id))
        }

        fn set_value(
            &self,
            object: &mut dyn Entity,
            _: &Attribute,
            value: Value,
        ) -> StorageResult<()> {
            downcast_mut::<Sealed>(object)?.id = expect_int(&value)?;
            Ok(())
        }

        fn create_object(
            &self,
            values: Vec<Value>,
            _: bool,
        ) -> StorageResult<Box<dyn Entity>> {
            let id = values.into_iter().next().unwrap_or(Value::Null);

            Ok(Box::new(Sealed {
                id: expect_int(&self.check_attribute_value(&self.attributes[0], id)?)?,
                state: EntityState::new(),
            }))
        }

        fn for_each_child(
            &self,
            _: &mut dyn Entity,
            _: &ChildMapping,
            _: &mut dyn FnMut(&mut dyn Entity) -> StorageResult<()>,
        ) -> StorageResult<()> {
            Ok(())
        }

        fn child_count(&self, _: &mut dyn Entity, _: &ChildMapping) -> StorageResult<usize> {
            Ok(0)
        }

        fn set_children(
            &self,
            _: &mut dyn Entity,
            _: &ChildMapping,
            _: Vec<Box<dyn Entity>>,
        ) -> StorageResult<()> {
            Ok(())
        }

        fn set_lazy_children(
            &self,
            _: &mut dyn Entity,
            _: &ChildMapping,
            _: relstore::storage::PendingChildren,
        ) -> StorageResult<()> {
            Ok(())
        }
    }

    manager::register_mapping(Arc::new(SealedMapping {
        attributes: vec![Attribute::new("id", DataType::Int4).id()],
    }));

    let storage = open_storage("delete_forbidden");
    let sealed = Sealed {
        id: 1,
        state: EntityState::new(),
    };

    // the delete is rejected before any SQL reaches the driver: the
    // type's table does not even exist
    let error = storage.delete(&sealed).unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Mapping);
    assert!(matches!(error, StorageError::DeleteNotAllowed(_)));

    storage.release();
}

#[test]
fn removing_object_storage_drops_the_table() {
    let storage = open_storage("delete_remove_storage");

    assert!(storage.has_object_storage::<TestRecord>().unwrap());

    storage.remove_object_storage::<TestRecord>().unwrap();
    assert!(!storage.has_object_storage::<TestRecord>().unwrap());

    // removal is idempotent and re-initialization works
    storage.remove_object_storage::<TestRecord>().unwrap();
    storage.init_object_storage::<TestRecord>().unwrap();
    assert!(storage.has_object_storage::<TestRecord>().unwrap());

    // child tables survive the removal of the parent table
    assert!(storage.has_object_storage::<TestDetail>().unwrap());

    storage.release();
}
