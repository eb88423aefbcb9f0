//! # Driver Traits
//!
//! Concrete database drivers live outside this crate. The framework
//! consumes three traits:
//!
//! - [`StorageDefinition`]: an opaque, comparable description of a
//!   physical store. Equality goes through the identity string derived
//!   from the connection parameters, never through instance identity.
//! - [`Connection`]: a live database connection executing parameterized
//!   statements. One storage handle owns one connection; all writes on a
//!   handle are sequential. Transactions are explicit — implementations
//!   must not auto-commit.
//! - [`Rows`]: a forward cursor over a result set with optional absolute
//!   and relative positioning. Drivers without scrollable results return
//!   the typed unsupported error from the seek methods.
//!
//! [`BufferedRows`] is a ready-made scrollable [`Rows`] implementation
//! for adapters that materialize result sets eagerly.

use crate::error::{StorageError, StorageResult};
use crate::sql::DialectParams;
use crate::types::Value;

/// An opaque, comparable description of a physical store.
///
/// Definitions are registered with the storage manager under lookup keys;
/// handles, queries and lazy child lists hold on to the definition and
/// connect through it on demand.
pub trait StorageDefinition: Send + Sync {
    /// Opens a new connection to the store.
    fn connect(&self) -> StorageResult<Box<dyn Connection>>;

    /// The dialect parameters for connections to this store.
    fn dialect(&self) -> DialectParams {
        DialectParams::standard()
    }

    /// A string identity derived from the connection parameters.
    ///
    /// Two definitions with equal identities are interchangeable; the
    /// per-thread handle cache is keyed by this value.
    fn identity(&self) -> String;

    /// The default query depth for storages of this definition.
    fn default_query_depth(&self) -> Option<u32> {
        None
    }
}

/// A live database connection.
pub trait Connection: Send {
    /// The driver's product name, for diagnostics.
    fn implementation_name(&self) -> &str;

    /// Executes a statement that returns no rows; returns the affected
    /// row count.
    fn execute_update(&mut self, sql: &str, params: &[Value]) -> StorageResult<u64>;

    /// Executes an INSERT statement. With `want_generated_key`, returns
    /// the auto-generated key if the driver supports retrieving it.
    fn execute_insert(
        &mut self,
        sql: &str,
        params: &[Value],
        want_generated_key: bool,
    ) -> StorageResult<Option<i64>>;

    /// Executes a query and returns its result cursor.
    fn execute_query(&mut self, sql: &str, params: &[Value]) -> StorageResult<Box<dyn Rows>>;

    /// Commits the current transaction.
    fn commit(&mut self) -> StorageResult<()>;

    /// Rolls back the current transaction.
    fn rollback(&mut self) -> StorageResult<()>;

    /// Checks whether a table exists.
    fn table_exists(&mut self, table: &str) -> StorageResult<bool>;

    /// Whether the driver can return auto-generated keys on insert.
    fn supports_generated_keys(&self) -> bool {
        false
    }

    /// Whether the connection is still usable.
    fn is_valid(&self) -> bool;
}

/// A cursor over query result rows.
///
/// The cursor starts before the first row. [`Rows::advance`] and the seek
/// methods position it on a row (returning whether a row is available);
/// [`Rows::row`] reads the current row.
pub trait Rows: Send {
    /// Moves to the next row. Returns false past the last row.
    fn advance(&mut self) -> StorageResult<bool>;

    /// Positions on a row by 1-based index; negative indices count from
    /// the end (`-1` is the last row).
    fn seek_absolute(&mut self, position: i64) -> StorageResult<bool> {
        let _ = position;

        Err(StorageError::Unsupported(
            "absolute positioning on a forward-only cursor",
        ))
    }

    /// Moves the cursor by a row delta relative to its current position.
    fn seek_relative(&mut self, delta: i64) -> StorageResult<bool> {
        let _ = delta;

        Err(StorageError::Unsupported(
            "relative positioning on a forward-only cursor",
        ))
    }

    /// The current row's column values.
    fn row(&self) -> StorageResult<&[Value]>;

    /// The number of columns per row.
    fn column_count(&self) -> usize;
}

/// A scrollable [`Rows`] implementation over a materialized result set.
#[derive(Debug)]
pub struct BufferedRows {
    rows: Vec<Vec<Value>>,
    columns: usize,
    /// Cursor position: 0 is before the first row, `len + 1` after the
    /// last, 1-based in between.
    cursor: usize,
}

impl BufferedRows {
    /// Creates a cursor over materialized rows.
    #[must_use]
    pub fn new(rows: Vec<Vec<Value>>, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cursor: 0,
        }
    }

    fn after_last(&self) -> usize {
        self.rows.len() + 1
    }

    fn on_row(&self) -> bool {
        self.cursor >= 1 && self.cursor <= self.rows.len()
    }
}

impl Rows for BufferedRows {
    fn advance(&mut self) -> StorageResult<bool> {
        if self.cursor < self.after_last() {
            self.cursor += 1;
        }

        Ok(self.on_row())
    }

    fn seek_absolute(&mut self, position: i64) -> StorageResult<bool> {
        let len = self.rows.len() as i64;

        self.cursor = if position > 0 {
            position.min(len + 1) as usize
        } else if position < 0 {
            // negative positions count back from the end
            (len + 1 + position).max(0) as usize
        } else {
            0
        };

        Ok(self.on_row())
    }

    fn seek_relative(&mut self, delta: i64) -> StorageResult<bool> {
        let target = self.cursor as i64 + delta;

        self.cursor = target.clamp(0, self.after_last() as i64) as usize;

        Ok(self.on_row())
    }

    fn row(&self) -> StorageResult<&[Value]> {
        if self.on_row() {
            Ok(&self.rows[self.cursor - 1])
        } else {
            Err(StorageError::driver("no current row"))
        }
    }

    fn column_count(&self) -> usize {
        self.columns
    }
}
