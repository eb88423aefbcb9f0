//! End-to-end query tests against a seeded SQLite storage.
//!
//! The data set mirrors the canonical fixture: one "jones" record
//! (id 1, value 1) and two "smith" records (ids 2 and 3, values 1 and 2),
//! each with five details named `<name>-1` … `<name>-5`.

mod common;

use common::*;
use relstore::prelude::*;
use relstore::Query;
use std::sync::{Arc, Once};

fn storage() -> StorageHandle {
    static ONCE: Once = Once::new();

    register_test_mappings();

    ONCE.call_once(|| {
        let definition = Arc::new(SqliteDefinition::shared_memory("relstore_query_tests"));

        manager::register_storage(
            definition.clone(),
            [
                StorageKey::of::<TestRecord>(),
                StorageKey::of::<TestDetail>(),
            ],
        )
        .unwrap();
        manager::set_default_storage(definition);

        let storage = manager::get_storage(StorageKey::of::<TestRecord>()).unwrap();

        init_and_seed(&storage).unwrap();
        storage.release();
    });

    manager::get_storage(StorageKey::of::<TestRecord>()).unwrap()
}

fn result_size(query: &mut Query<TestRecord>) -> usize {
    let mut result = query.execute().unwrap();
    let mut size = 0;

    while result.has_next().unwrap() {
        result.next().unwrap().unwrap();
        size += 1;
    }

    size
}

fn count_matching(storage: &StorageHandle, criteria: Criterion) -> usize {
    let mut query = storage.query(for_type::<TestRecord>(criteria)).unwrap();

    result_size(&mut query)
}

#[test]
fn queries_filter_by_attribute_values() {
    let storage = storage();

    let jones = if_field("name", equal_to("jones"));
    let smith = if_field("name", equal_to("smith"));

    assert_eq!(count_matching(&storage, jones.clone()), 1);
    assert_eq!(count_matching(&storage, smith.clone()), 2);
    assert_eq!(count_matching(&storage, smith.clone().or(jones.clone())), 3);
    assert_eq!(count_matching(&storage, smith.and(jones)), 0);

    storage.release();
}

#[test]
fn like_matches_sql_patterns() {
    let storage = storage();

    assert_eq!(count_matching(&storage, if_field("name", like("%ones"))), 1);
    assert_eq!(count_matching(&storage, if_field("name", like("j_nes"))), 1);
    assert_eq!(count_matching(&storage, if_field("name", like("%xyz"))), 0);

    storage.release();
}

#[test]
fn almost_like_matches_phonetically() {
    let storage = storage();

    // "jonas" sounds like "jones"; only the fuzzy function can tell
    assert_eq!(
        count_matching(&storage, if_field("name", almost_like("jonas"))),
        1
    );
    assert_eq!(
        count_matching(&storage, if_field("name", equal_to("jonas"))),
        0
    );

    storage.release();
}

#[test]
fn detail_sub_queries_select_parents() {
    let storage = storage();

    let by_detail = if_field(
        "details",
        has_child::<TestDetail>(if_field("name", equal_to("smith-1"))),
    );

    assert_eq!(count_matching(&storage, by_detail), 2);

    let by_detail_range = if_field(
        "details",
        has_child::<TestDetail>(
            if_field("name", greater_or_equal("smith-2"))
                .and(if_field("name", less_than("smith-3"))),
        ),
    );

    assert_eq!(count_matching(&storage, by_detail_range), 2);

    storage.release();
}

#[test]
fn function_predicates_apply_sql_functions() {
    let storage = storage();

    let lower_jones = if_function(field("name").lower(), equal_to("jones"));

    assert_eq!(count_matching(&storage, lower_jones), 1);

    storage.release();
}

#[test]
fn negation_laws_hold_on_row_sets() {
    let storage = storage();

    let jones = || if_field("name", equal_to("jones"));
    let smith = || if_field("name", equal_to("smith"));

    // not(not P) == P
    assert_eq!(
        count_matching(&storage, not(not(jones()))),
        count_matching(&storage, jones())
    );

    // P and Q == Q and P
    assert_eq!(
        count_matching(&storage, jones().and(smith())),
        count_matching(&storage, smith().and(jones()))
    );

    // not(P or Q) == not(P) and not(Q)
    assert_eq!(
        count_matching(&storage, not(jones().or(smith()))),
        count_matching(&storage, not(jones()).and(not(smith())))
    );

    storage.release();
}

#[test]
fn sorting_orders_results() {
    let storage = storage();

    for ascending in [true, false] {
        let mut query = storage
            .query(for_type::<TestRecord>(
                if_field("name", equal_to("smith")).and(sort_by("value", ascending)),
            ))
            .unwrap();
        let mut result = query.execute().unwrap();
        let mut expected = if ascending { 1 } else { 2 };

        while result.has_next().unwrap() {
            let record = result.next().unwrap().unwrap();

            assert_eq!(record.value, expected);
            expected += if ascending { 1 } else { -1 };
        }
    }

    storage.release();
}

#[test]
fn query_size_counts_without_iterating() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))))
        .unwrap();
    assert_eq!(query.size().unwrap(), 1);

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("smith"))))
        .unwrap();
    assert_eq!(query.size().unwrap(), 2);

    let mut query = storage
        .query(for_type::<TestRecord>(if_field(
            "name",
            equal_to("nothing"),
        )))
        .unwrap();
    assert_eq!(query.size().unwrap(), 0);

    storage.release();
}

#[test]
fn distinct_values_collect_into_a_set() {
    let storage = storage();

    let mapping = manager::get_mapping::<TestRecord>().unwrap();
    let name_attribute = mapping.attribute("name").unwrap();

    let mut query = storage.query(for_all::<TestRecord>()).unwrap();
    let names = query.get_distinct(name_attribute).unwrap();

    assert_eq!(names.len(), 2);
    assert!(names.contains(&Value::Text("jones".into())));
    assert!(names.contains(&Value::Text("smith".into())));

    storage.release();
}

#[test]
fn element_of_matches_value_collections() {
    let storage = storage();

    assert_eq!(
        count_matching(&storage, if_field("value", element_of([1, 2]))),
        3
    );
    assert_eq!(
        count_matching(&storage, if_field("value", element_of([7, 9]))),
        0
    );

    storage.release();
}

#[test]
fn paging_returns_the_requested_window() {
    let storage = storage();

    let mut query = storage
        .query(
            for_type::<TestRecord>(sort_by("name", true).and(sort_by("value", true)))
                .with_offset(1)
                .with_limit(1),
        )
        .unwrap();

    assert_eq!(query.size().unwrap(), 3);

    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let record = result.next().unwrap().unwrap();

    assert_eq!(record.name, "smith");
    assert_eq!(record.value, 1);
    assert!(!result.has_next().unwrap());

    storage.release();
}

#[test]
fn offsets_without_limits_position_the_cursor() {
    let storage = storage();

    // no limit means no paging clause; the offset is applied through
    // cursor positioning instead
    let mut query = storage
        .query(
            for_type::<TestRecord>(sort_by("name", true).and(sort_by("value", true)))
                .with_offset(1),
        )
        .unwrap();
    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let first = result.next().unwrap().unwrap();

    assert_eq!((first.name.as_str(), first.value), ("smith", 1));
    assert!(result.has_next().unwrap());

    let second = result.next().unwrap().unwrap();

    assert_eq!((second.name.as_str(), second.value), ("smith", 2));
    assert!(!result.has_next().unwrap());

    storage.release();
}

#[test]
fn absolute_positioning_rewinds_the_cursor() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(sort_by("name", true)))
        .unwrap();

    assert_eq!(query.size().unwrap(), 3);

    let mut result = query.execute().unwrap();

    while result.has_next().unwrap() {
        result.next().unwrap();
    }

    result.set_position(0, false);
    assert_eq!(result.next().unwrap().unwrap().name, "jones");

    result.set_position(2, false);
    assert_eq!(result.next().unwrap().unwrap().name, "smith");

    storage.release();
}

#[test]
fn relative_positioning_moves_from_the_cursor() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(sort_by("name", true)))
        .unwrap();
    let mut result = query.execute().unwrap();

    while result.has_next().unwrap() {
        result.next().unwrap();
    }

    result.set_position(-3, true);
    assert_eq!(result.next().unwrap().unwrap().name, "jones");

    result.set_position(2, true);
    assert_eq!(result.next().unwrap().unwrap().name, "smith");

    storage.release();
}

#[test]
fn position_of_uses_the_query_ordering() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(
            sort_by("name", true).and(sort_by("value", true)),
        ))
        .unwrap();

    assert_eq!(query.position_of(1).unwrap(), 0);
    assert_eq!(query.position_of(2).unwrap(), 1);
    assert_eq!(query.position_of(3).unwrap(), 2);

    storage.release();
}

#[test]
fn child_counts_size_lazy_lists_without_queries() {
    register_test_mappings();

    // a private database and definition, so the query counter is not
    // disturbed by concurrently running tests
    let definition = Arc::new(SqliteDefinition::shared_memory("relstore_query_lazy"));
    let storage = manager::storage_for_definition(definition.clone()).unwrap();

    init_and_seed(&storage).unwrap();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))))
        .unwrap();
    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let mut record = result.next().unwrap().unwrap();

    drop(result);
    drop(query);

    // the child count column sized the list; no child query yet
    assert!(!record.details.is_loaded());
    assert_eq!(record.details.known_size(), Some(5));

    let queries_before = definition.query_count();

    assert_eq!(record.details.len().unwrap(), 5);
    assert_eq!(definition.query_count(), queries_before);

    // iterating materializes through exactly one child query
    let names: Vec<String> = record
        .details
        .iter()
        .unwrap()
        .map(|detail| detail.name.clone())
        .collect();

    assert_eq!(definition.query_count(), queries_before + 1);
    assert_eq!(names, ["jones-1", "jones-2", "jones-3", "jones-4", "jones-5"]);

    // materialization back-filled the parent reference
    for detail in record.details.iter().unwrap() {
        assert_eq!(detail.parent, Some(1));
    }

    storage.release();
}

#[test]
fn depth_zero_leaves_child_collections_empty() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))).with_depth(0))
        .unwrap();
    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let mut record = result.next().unwrap().unwrap();

    assert!(record.details.is_loaded());
    assert_eq!(record.details.len().unwrap(), 0);

    storage.release();
}

#[test]
fn depth_one_installs_lazy_children() {
    let storage = storage();

    let mut query = storage
        .query(for_type::<TestRecord>(if_field("name", equal_to("jones"))).with_depth(1))
        .unwrap();
    let mut result = query.execute().unwrap();

    assert!(result.has_next().unwrap());

    let mut record = result.next().unwrap().unwrap();

    assert!(!record.details.is_loaded());
    assert_eq!(record.details.len().unwrap(), 5);

    storage.release();
}

#[test]
fn in_memory_evaluation_matches_compiled_semantics() {
    let storage = storage();

    let mapping = manager::get_mapping::<TestRecord>().unwrap();
    let record = TestRecord::new(9, "jones", 4, test_date());

    let by_name = for_type::<TestRecord>(if_field("name", equal_to("jones")));
    assert!(by_name.evaluate(mapping.as_ref(), &record).unwrap());

    let by_like = for_type::<TestRecord>(if_field("name", like("%ones")));
    assert!(by_like.evaluate(mapping.as_ref(), &record).unwrap());

    // sort keys are declarative and always hold in memory
    let by_sort = for_type::<TestRecord>(sort_by("value", false));
    assert!(by_sort.evaluate(mapping.as_ref(), &record).unwrap());

    let by_value = for_type::<TestRecord>(if_field("value", less_than(3)));
    assert!(!by_value.evaluate(mapping.as_ref(), &record).unwrap());

    storage.release();
}
