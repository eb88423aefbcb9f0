//! Shared test support: a SQLite adapter for the driver traits and the
//! test domain types with their hand-written mappings.
//!
//! The adapter connects to named shared-memory SQLite databases so all
//! handles of one test binary see the same data, registers a `soundex`
//! scalar function for fuzzy-search tests and buffers result sets to
//! provide scrollable cursors.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use relstore::driver::{BufferedRows, Connection, Rows, StorageDefinition};
use relstore::prelude::*;
use relstore::sql::DialectParams;
use rusqlite::functions::FunctionFlags;
use rusqlite::OpenFlags;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------
// SQLite driver adapter
// ---------------------------------------------------------------------

/// Definition of a named shared-memory SQLite database.
pub struct SqliteDefinition {
    uri: String,
    depth: Option<u32>,
    // counts SELECTs across all connections of this definition, for
    // asserting lazy-list behavior
    queries: Arc<AtomicUsize>,
    // keeps the shared in-memory database alive between connections
    anchor: Mutex<Option<rusqlite::Connection>>,
}

impl SqliteDefinition {
    pub fn shared_memory(name: &str) -> Self {
        Self {
            uri: format!("file:{name}?mode=memory&cache=shared"),
            depth: None,
            queries: Arc::new(AtomicUsize::new(0)),
            anchor: Mutex::new(None),
        }
    }

    pub fn file(path: &std::path::Path) -> Self {
        Self {
            uri: path.to_string_lossy().into_owned(),
            depth: None,
            queries: Arc::new(AtomicUsize::new(0)),
            anchor: Mutex::new(None),
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// The number of SELECTs executed through this definition.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn open(&self) -> StorageResult<rusqlite::Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;

        rusqlite::Connection::open_with_flags(&self.uri, flags)
            .map_err(|error| StorageError::driver_with("opening SQLite connection failed", error))
    }
}

impl StorageDefinition for SqliteDefinition {
    fn connect(&self) -> StorageResult<Box<dyn Connection>> {
        {
            let mut anchor = self.anchor.lock().expect("anchor lock poisoned");

            if anchor.is_none() {
                *anchor = Some(self.open()?);
            }
        }

        let connection = self.open()?;

        register_soundex(&connection)?;
        connection
            .execute_batch("BEGIN")
            .map_err(|error| StorageError::driver_with("starting transaction failed", error))?;

        Ok(Box::new(SqliteConnection {
            connection,
            queries: self.queries.clone(),
        }))
    }

    fn dialect(&self) -> DialectParams {
        DialectParams::sqlite().with_fuzzy_function("soundex")
    }

    fn identity(&self) -> String {
        self.uri.clone()
    }

    fn default_query_depth(&self) -> Option<u32> {
        self.depth
    }
}

struct SqliteConnection {
    connection: rusqlite::Connection,
    queries: Arc<AtomicUsize>,
}

impl SqliteConnection {
    fn wrap(message: &str, error: rusqlite::Error) -> StorageError {
        StorageError::driver_with(message.to_string(), error)
    }
}

impl Connection for SqliteConnection {
    fn implementation_name(&self) -> &str {
        "SQLite"
    }

    fn execute_update(&mut self, sql: &str, params: &[Value]) -> StorageResult<u64> {
        let changed = self
            .connection
            .execute(sql, rusqlite::params_from_iter(params.iter().map(to_sql)))
            .map_err(|error| Self::wrap(&format!("statement failed: {sql}"), error))?;

        Ok(changed as u64)
    }

    fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        want_generated_key: bool,
    ) -> StorageResult<Option<i64>> {
        self.execute_update(sql, params)?;

        Ok(want_generated_key.then(|| self.connection.last_insert_rowid()))
    }

    fn execute_query(&mut self, sql: &str, params: &[Value]) -> StorageResult<Box<dyn Rows>> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let mut statement = self
            .connection
            .prepare(sql)
            .map_err(|error| Self::wrap(&format!("preparing query failed: {sql}"), error))?;
        let columns = statement.column_count();
        let mut rows = statement
            .query(rusqlite::params_from_iter(params.iter().map(to_sql)))
            .map_err(|error| Self::wrap(&format!("query failed: {sql}"), error))?;
        let mut buffered = Vec::new();

        loop {
            let row = rows
                .next()
                .map_err(|error| Self::wrap("reading result row failed", error))?;

            let Some(row) = row else { break };
            let mut values = Vec::with_capacity(columns);

            for index in 0..columns {
                let value = row
                    .get_ref(index)
                    .map_err(|error| Self::wrap("reading result column failed", error))?;

                values.push(from_sql(value));
            }

            buffered.push(values);
        }

        Ok(Box::new(BufferedRows::new(buffered, columns)))
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.connection
            .execute_batch("COMMIT; BEGIN")
            .map_err(|error| Self::wrap("commit failed", error))
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.connection
            .execute_batch("ROLLBACK; BEGIN")
            .map_err(|error| Self::wrap("rollback failed", error))
    }

    fn table_exists(&mut self, table: &str) -> StorageResult<bool> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .map_err(|error| Self::wrap("reading table metadata failed", error))?;

        Ok(count > 0)
    }

    fn supports_generated_keys(&self) -> bool {
        true
    }

    fn is_valid(&self) -> bool {
        true
    }
}

fn to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Int(n) => Sql::Integer(*n),
        Value::Float(f) => Sql::Real(*f),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Bytes(b) => Sql::Blob(b.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn from_sql(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

fn register_soundex(connection: &rusqlite::Connection) -> StorageResult<()> {
    connection
        .create_scalar_function(
            "soundex",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |context| {
                let text: String = context.get(0)?;

                Ok(soundex(&text))
            },
        )
        .map_err(|error| StorageError::driver_with("registering soundex failed", error))
}

/// Standard American Soundex.
pub fn soundex(input: &str) -> String {
    let mut chars = input.chars().filter(|c| c.is_ascii_alphabetic());

    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut code = String::new();
    code.push(first.to_ascii_uppercase());

    let mut previous = soundex_digit(first);

    for c in chars {
        let digit = soundex_digit(c);

        if digit != 0 && digit != previous {
            code.push(char::from(b'0' + digit));

            if code.len() == 4 {
                return code;
            }
        }

        if !matches!(c.to_ascii_lowercase(), 'h' | 'w') {
            previous = digit;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }

    code
}

fn soundex_digit(c: char) -> u8 {
    match c.to_ascii_lowercase() {
        'b' | 'f' | 'p' | 'v' => 1,
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
        'd' | 't' => 3,
        'l' => 4,
        'm' | 'n' => 5,
        'r' => 6,
        _ => 0,
    }
}

// ---------------------------------------------------------------------
// Test domain
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TestRecord {
    pub id: i64,
    pub name: String,
    pub value: i64,
    pub date: NaiveDateTime,
    pub details: ChildList<TestDetail>,
    pub state: EntityState,
}

relstore::impl_entity!(TestRecord);

impl TestRecord {
    pub fn new(id: i64, name: &str, value: i64, date: NaiveDateTime) -> Self {
        Self {
            id,
            name: name.to_string(),
            value,
            date,
            details: ChildList::new(),
            state: EntityState::new(),
        }
    }

    pub fn add_detail(&mut self, mut detail: TestDetail) {
        detail.parent = Some(self.id);
        self.details
            .push(detail)
            .expect("fresh child lists never query");
    }
}

#[derive(Debug, Clone)]
pub struct TestDetail {
    pub id: i64,
    pub parent: Option<i64>,
    pub name: String,
    pub value: i64,
    pub state: EntityState,
}

relstore::impl_entity!(TestDetail);

impl TestDetail {
    pub fn new(name: &str, value: i64) -> Self {
        Self {
            id: -1,
            parent: None,
            name: name.to_string(),
            value,
            state: EntityState::new(),
        }
    }
}

pub struct RecordMapping {
    attributes: Vec<Attribute>,
    children: Vec<ChildMapping>,
}

impl RecordMapping {
    pub fn new() -> Self {
        Self {
            attributes: vec![
                Attribute::new("id", DataType::Int4).id().autogenerated(),
                Attribute::new("name", DataType::Text).with_length(100),
                Attribute::new("value", DataType::Int4),
                Attribute::new("date", DataType::Timestamp),
            ],
            children: vec![ChildMapping::new(TypeKey::of::<TestDetail>(), "details")],
        }
    }
}

impl ObjectMapping for RecordMapping {
    fn mapped_type(&self) -> TypeKey {
        TypeKey::of::<TestRecord>()
    }

    fn storage_name(&self) -> &str {
        "TestRecord"
    }

    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    fn id_attribute(&self) -> &Attribute {
        &self.attributes[0]
    }

    fn child_mappings(&self) -> &[ChildMapping] {
        &self.children
    }

    fn get_value(&self, object: &dyn Entity, attribute: &Attribute) -> StorageResult<Value> {
        let record = downcast_ref::<TestRecord>(object)?;

        let value = match attribute.name() {
            "id" => Value::Int(record.id),
            "name" => Value::Text(record.name.clone()),
            "value" => Value::Int(record.value),
            "date" => Value::Timestamp(record.date),
            other => return Err(unknown_attribute(other)),
        };

        Ok(value)
    }

    fn set_value(
        &self,
        object: &mut dyn Entity,
        attribute: &Attribute,
        value: Value,
    ) -> StorageResult<()> {
        let record = downcast_mut::<TestRecord>(object)?;

        match attribute.name() {
            "id" => record.id = expect_int(&value)?,
            "name" => record.name = expect_text(value)?,
            "value" => record.value = expect_int(&value)?,
            "date" => record.date = expect_timestamp(&value)?,
            other => return Err(unknown_attribute(other)),
        }

        Ok(())
    }

    fn create_object(&self, values: Vec<Value>, _as_child: bool) -> StorageResult<Box<dyn Entity>> {
        let mut values = values.into_iter();
        let mut next = |attribute: &Attribute| -> StorageResult<Value> {
            let raw = values.next().unwrap_or(Value::Null);

            self.check_attribute_value(attribute, raw)
        };

        let record = TestRecord {
            id: expect_int(&next(&self.attributes[0])?)?,
            name: expect_text(next(&self.attributes[1])?)?,
            value: expect_int(&next(&self.attributes[2])?)?,
            date: expect_timestamp(&next(&self.attributes[3])?)?,
            details: ChildList::new(),
            state: EntityState::new(),
        };

        Ok(Box::new(record))
    }

    fn for_each_child(
        &self,
        object: &mut dyn Entity,
        _child: &ChildMapping,
        action: &mut dyn FnMut(&mut dyn Entity) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let record = downcast_mut::<TestRecord>(object)?;

        for detail in record.details.iter_mut()? {
            action(detail)?;
        }

        Ok(())
    }

    fn child_count(&self, object: &mut dyn Entity, _child: &ChildMapping) -> StorageResult<usize> {
        downcast_mut::<TestRecord>(object)?.details.len()
    }

    fn set_children(
        &self,
        object: &mut dyn Entity,
        _child: &ChildMapping,
        children: Vec<Box<dyn Entity>>,
    ) -> StorageResult<()> {
        let record = downcast_mut::<TestRecord>(object)?;
        let details: StorageResult<Vec<TestDetail>> =
            children.into_iter().map(downcast_box::<TestDetail>).collect();

        record.details = ChildList::from_vec(details?);
        Ok(())
    }

    fn set_lazy_children(
        &self,
        object: &mut dyn Entity,
        _child: &ChildMapping,
        pending: relstore::storage::PendingChildren,
    ) -> StorageResult<()> {
        downcast_mut::<TestRecord>(object)?.details = ChildList::from_pending(pending);
        Ok(())
    }
}

pub struct DetailMapping {
    attributes: Vec<Attribute>,
}

impl DetailMapping {
    pub fn new() -> Self {
        Self {
            attributes: vec![
                Attribute::new("id", DataType::Int4).id().autogenerated(),
                Attribute::new("parent", DataType::Int4).parent(TypeKey::of::<TestRecord>()),
                Attribute::new("name", DataType::Text).with_length(100),
                Attribute::new("value", DataType::Int4),
            ],
        }
    }
}

impl ObjectMapping for DetailMapping {
    fn mapped_type(&self) -> TypeKey {
        TypeKey::of::<TestDetail>()
    }

    fn storage_name(&self) -> &str {
        "TestDetail"
    }

    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    fn id_attribute(&self) -> &Attribute {
        &self.attributes[0]
    }

    fn get_value(&self, object: &dyn Entity, attribute: &Attribute) -> StorageResult<Value> {
        let detail = downcast_ref::<TestDetail>(object)?;

        let value = match attribute.name() {
            "id" => Value::Int(detail.id),
            "parent" => detail.parent.into(),
            "name" => Value::Text(detail.name.clone()),
            "value" => Value::Int(detail.value),
            other => return Err(unknown_attribute(other)),
        };

        Ok(value)
    }

    fn set_value(
        &self,
        object: &mut dyn Entity,
        attribute: &Attribute,
        value: Value,
    ) -> StorageResult<()> {
        let detail = downcast_mut::<TestDetail>(object)?;

        match attribute.name() {
            "id" => detail.id = expect_int(&value)?,
            "parent" => {
                detail.parent = match value {
                    Value::Null => None,
                    other => Some(expect_int(&other)?),
                }
            }
            "name" => detail.name = expect_text(value)?,
            "value" => detail.value = expect_int(&value)?,
            other => return Err(unknown_attribute(other)),
        }

        Ok(())
    }

    fn create_object(&self, values: Vec<Value>, _as_child: bool) -> StorageResult<Box<dyn Entity>> {
        let mut values = values.into_iter();
        let mut next = |attribute: &Attribute| -> StorageResult<Value> {
            let raw = values.next().unwrap_or(Value::Null);

            self.check_attribute_value(attribute, raw)
        };

        let id = expect_int(&next(&self.attributes[0])?)?;
        let parent = match next(&self.attributes[1])? {
            Value::Null => None,
            other => Some(expect_int(&other)?),
        };

        let detail = TestDetail {
            id,
            parent,
            name: expect_text(next(&self.attributes[2])?)?,
            value: expect_int(&next(&self.attributes[3])?)?,
            state: EntityState::new(),
        };

        Ok(Box::new(detail))
    }

    fn for_each_child(
        &self,
        _object: &mut dyn Entity,
        child: &ChildMapping,
        _action: &mut dyn FnMut(&mut dyn Entity) -> StorageResult<()>,
    ) -> StorageResult<()> {
        Err(no_children(child))
    }

    fn child_count(&self, _object: &mut dyn Entity, child: &ChildMapping) -> StorageResult<usize> {
        Err(no_children(child))
    }

    fn set_children(
        &self,
        _object: &mut dyn Entity,
        child: &ChildMapping,
        _children: Vec<Box<dyn Entity>>,
    ) -> StorageResult<()> {
        Err(no_children(child))
    }

    fn set_lazy_children(
        &self,
        _object: &mut dyn Entity,
        child: &ChildMapping,
        _pending: relstore::storage::PendingChildren,
    ) -> StorageResult<()> {
        Err(no_children(child))
    }
}

// ---------------------------------------------------------------------
// Mapping helpers
// ---------------------------------------------------------------------

pub fn downcast_ref<T: Entity>(object: &dyn Entity) -> StorageResult<&T> {
    object
        .downcast_ref()
        .ok_or_else(|| StorageError::InvalidArgument("unexpected entity type".into()))
}

pub fn downcast_mut<T: Entity>(object: &mut dyn Entity) -> StorageResult<&mut T> {
    object
        .downcast_mut()
        .ok_or_else(|| StorageError::InvalidArgument("unexpected entity type".into()))
}

pub fn downcast_box<T: Entity>(object: Box<dyn Entity>) -> StorageResult<T> {
    object
        .into_any()
        .downcast::<T>()
        .map(|object| *object)
        .map_err(|_| StorageError::InvalidArgument("unexpected entity type".into()))
}

fn unknown_attribute(name: &str) -> StorageError {
    StorageError::InvalidArgument(format!("unknown attribute '{name}'"))
}

fn no_children(child: &ChildMapping) -> StorageError {
    StorageError::InvalidArgument(format!(
        "type has no child mapping '{}'",
        child.attribute()
    ))
}

pub fn expect_int(value: &Value) -> StorageResult<i64> {
    value.as_int().ok_or_else(|| StorageError::InvalidArgument(
        format!("expected an integer value, got {value:?}"),
    ))
}

pub fn expect_text(value: Value) -> StorageResult<String> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(StorageError::InvalidArgument(format!(
            "expected a text value, got {other:?}"
        ))),
    }
}

pub fn expect_timestamp(value: &Value) -> StorageResult<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Date(date) => Ok(date.and_hms_opt(0, 0, 0).expect("midnight exists")),
        other => Err(StorageError::InvalidArgument(format!(
            "expected a timestamp value, got {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------
// Registration and seeding
// ---------------------------------------------------------------------

/// Registers the test mappings once per test binary.
pub fn register_test_mappings() {
    use std::sync::Once;

    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        manager::register_mapping(Arc::new(RecordMapping::new()));
        manager::register_mapping(Arc::new(DetailMapping::new()));
    });
}

pub fn test_date() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
        .expect("valid date")
        .and_hms_opt(12, 30, 0)
        .expect("valid time")
}

/// Stores `count` records named `name` with ids starting at `id_start`,
/// each carrying five details, mirroring the canonical test data set:
/// one "jones" record and two "smith" records.
pub fn store_test_records(
    storage: &StorageHandle,
    name: &str,
    id_start: i64,
    count: i64,
) -> StorageResult<()> {
    for i in 1..=count {
        let mut record = TestRecord::new(id_start + i - 1, name, i, test_date());

        for j in 1..=5 {
            record.add_detail(TestDetail::new(&format!("{name}-{j}"), i * 10 + j));
        }

        storage.store(&mut record)?;
    }

    Ok(())
}

/// Initializes the storage for the test hierarchy and seeds the
/// canonical data set if the table is empty.
pub fn init_and_seed(storage: &StorageHandle) -> StorageResult<()> {
    storage.init_object_storage::<TestRecord>()?;

    let mut query = storage.query(for_all::<TestRecord>())?;

    if query.size()? == 0 {
        store_test_records(storage, "jones", 1, 1)?;
        store_test_records(storage, "smith", 2, 2)?;
        storage.commit()?;
    }

    Ok(())
}
