//! # SQL Generation
//!
//! This module lowers criteria trees and mappings into SQL text:
//!
//! - [`names`]: identifier derivation (camelCase to snake_case), quoting
//!   and child-count column naming
//! - [`dialect`]: per-dialect parameters — identifier quote, auto-id
//!   datatypes, fuzzy search function, paging template and datatype
//!   overrides
//! - [`compiler`]: the recursive criteria compiler producing a
//!   parameterized WHERE clause, the compare attribute/value vectors and
//!   the ORDER BY fragment
//!
//! Statement templates for INSERT/UPDATE/DELETE/CREATE live with the
//! storage handle (`storage`), which owns statement execution.

pub mod compiler;
pub mod dialect;
pub mod names;

pub use compiler::{CompiledCriteria, SqlCompiler};
pub use dialect::DialectParams;
