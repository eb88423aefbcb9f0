//! # Value Model
//!
//! This module provides the canonical value and datatype model used across
//! mappings, the SQL compiler and the query executor.
//!
//! - [`Value`]: an owned, self-describing value as read from or written to
//!   a storage column
//! - [`DataType`]: the datatype class declared on an attribute descriptor
//! - [`Period`]: a calendar-aware duration (months/days/microseconds) with
//!   a compact text representation

mod data_type;
mod period;
mod value;

pub use data_type::DataType;
pub use period::Period;
pub use value::Value;

pub(crate) use value::{DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
