//! # Query Predicates
//!
//! The criteria language is one closed tree, [`Criterion`]. Leaves compare
//! an attribute against values; inner nodes join, negate, sort or embed
//! sub-queries. The same tree is compiled to SQL (`sql::compiler`) and can
//! be evaluated in memory against mapped objects (`predicate::eval`).
//!
//! ## Building criteria
//!
//! ```ignore
//! use relstore::prelude::*;
//!
//! let criteria = if_field("name", equal_to("jones"))
//!     .or(if_field("name", like("%ones")))
//!     .and(sort_by("value", true));
//!
//! let query = for_type::<Record>(criteria).with_depth(2);
//! ```
//!
//! ## Shapes
//!
//! - **Element predicates** apply a value criterion to an attribute, named
//!   directly (`if_field`) or through a SQL function chain (`if_function`
//!   with a [`FieldExpr`] such as `field("name").lower()`)
//! - **Sort keys** are declarative leaves: they always evaluate to TRUE in
//!   memory and only contribute to the SQL ORDER BY clause
//! - **Sub-queries** (`has_child`, `refers_to`) carry their own type and
//!   criteria and are lowered to `IN (SELECT …)`
//! - **Negation** folds into comparison operators where possible
//!   (`=` becomes `<>`, `<` becomes `>=`), otherwise a `NOT` prefix is
//!   emitted
//!
//! Criterion trees compare structurally, so predicates can be used as cache
//! keys and verified in tests.

pub mod eval;

use crate::mapping::{Attribute, ObjectMapping, TypeKey};
use crate::types::Value;
use std::marker::PhantomData;

/// A comparison applied to an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Compare {
    /// Equality; `equal_to(null)` lowers to `IS NULL`.
    Equal(Value),
    Less(Value),
    LessOrEqual(Value),
    Greater(Value),
    GreaterOrEqual(Value),
    /// Membership in a value collection; lowers to `IN (…)`.
    In(Vec<Value>),
    /// SQL LIKE pattern match (`%`/`_` wildcards).
    Like(String),
    /// Fuzzy match through the dialect's phonetic search function.
    SimilarTo(String),
}

/// An attribute access, optionally wrapped in SQL function applications.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldExpr {
    /// Direct attribute access by name.
    Field(String),
    Lower(Box<FieldExpr>),
    Upper(Box<FieldExpr>),
    Cast(Box<FieldExpr>, crate::types::DataType),
    /// Substring by zero-based character range; `None` end runs to the end.
    Substring(Box<FieldExpr>, usize, Option<usize>),
}

impl FieldExpr {
    /// Wraps this expression in `LOWER(…)`.
    #[must_use]
    pub fn lower(self) -> Self {
        Self::Lower(Box::new(self))
    }

    /// Wraps this expression in `UPPER(…)`.
    #[must_use]
    pub fn upper(self) -> Self {
        Self::Upper(Box::new(self))
    }

    /// Wraps this expression in a SQL CAST.
    #[must_use]
    pub fn cast(self, datatype: crate::types::DataType) -> Self {
        Self::Cast(Box::new(self), datatype)
    }

    /// Wraps this expression in `SUBSTRING(…)`.
    #[must_use]
    pub fn substring(self, begin: usize, end: Option<usize>) -> Self {
        Self::Substring(Box::new(self), begin, end)
    }

    /// The innermost attribute name of this expression.
    #[must_use]
    pub fn field_name(&self) -> &str {
        match self {
            Self::Field(name) => name,
            Self::Lower(inner) | Self::Upper(inner) => inner.field_name(),
            Self::Cast(inner, _) => inner.field_name(),
            Self::Substring(inner, _, _) => inner.field_name(),
        }
    }
}

/// A sub-query embedded as a value predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    /// The sub-query's own type and criteria.
    pub query: Box<RawQuery>,
    /// Optional accessor selecting the column returned by the inner SELECT;
    /// defaults to the referenced type's id attribute.
    pub ref_attr: Option<FieldExpr>,
}

/// A query criteria tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Criterion {
    /// The always-TRUE sentinel; contributes no SQL text.
    #[default]
    Always,
    /// A bare comparison; the target attribute comes from the enclosing
    /// element predicate.
    Compare(Compare),
    /// Applies a value criterion to an attribute.
    Element {
        target: FieldExpr,
        value: Box<Criterion>,
    },
    And(Box<Criterion>, Box<Criterion>),
    Or(Box<Criterion>, Box<Criterion>),
    Not(Box<Criterion>),
    /// Declarative sort key; always TRUE in memory.
    Sort { target: FieldExpr, ascending: bool },
    /// A sub-query, lowered to `IN (SELECT …)`.
    SubQuery(SubQuery),
}

impl Criterion {
    /// Joins two criteria with AND.
    #[must_use]
    pub fn and(self, other: Criterion) -> Criterion {
        Criterion::And(Box::new(self), Box::new(other))
    }

    /// Joins two criteria with OR.
    #[must_use]
    pub fn or(self, other: Criterion) -> Criterion {
        Criterion::Or(Box::new(self), Box::new(other))
    }
}

/// An untyped query: a type key, criteria and per-query properties.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    /// The queried type.
    pub type_key: TypeKey,
    /// The criteria tree.
    pub criteria: Criterion,
    /// Maximum child materialization depth; `None` is unlimited.
    pub depth: Option<u32>,
    /// Position of the first returned record.
    pub offset: Option<u64>,
    /// Maximum number of returned records.
    pub limit: Option<u64>,
    /// True for internal child sub-queries.
    pub child_query: bool,
}

impl RawQuery {
    /// Creates a query for a type key with the given criteria.
    #[must_use]
    pub fn new(type_key: TypeKey, criteria: Criterion) -> Self {
        Self {
            type_key,
            criteria,
            depth: None,
            offset: None,
            limit: None,
            child_query: false,
        }
    }
}

/// A typed query predicate: the queried type plus a criteria tree.
///
/// A query predicate is itself a predicate — evaluating it in memory
/// delegates to its criteria — so it composes uniformly with other
/// criteria through [`has_child`] and [`refers_to`].
#[derive(Debug, Clone)]
pub struct QueryPredicate<T> {
    raw: RawQuery,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> QueryPredicate<T> {
    /// Creates a query predicate for `T` with the given criteria.
    #[must_use]
    pub fn new(criteria: Criterion) -> Self {
        Self {
            raw: RawQuery::new(TypeKey::of::<T>(), criteria),
            _marker: PhantomData,
        }
    }

    /// Limits how many child levels the executor materializes.
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.raw.depth = Some(depth);
        self
    }

    /// Sets the position of the first returned record.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.raw.offset = Some(offset);
        self
    }

    /// Limits the number of returned records.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.raw.limit = Some(limit);
        self
    }

    /// The criteria tree of this predicate.
    #[must_use]
    pub fn criteria(&self) -> &Criterion {
        &self.raw.criteria
    }

    /// The untyped query.
    #[must_use]
    pub fn raw(&self) -> &RawQuery {
        &self.raw
    }

    /// Consumes the predicate into its untyped query.
    #[must_use]
    pub fn into_raw(self) -> RawQuery {
        self.raw
    }

    /// Evaluates the criteria in memory against a mapped object.
    pub fn evaluate(
        &self,
        mapping: &dyn ObjectMapping,
        object: &dyn crate::mapping::Entity,
    ) -> crate::error::StorageResult<bool> {
        eval::evaluate(&self.raw.criteria, mapping, object)
    }
}

impl<T> PartialEq for QueryPredicate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// Creates a query predicate for a type with criteria.
#[must_use]
pub fn for_type<T: 'static>(criteria: Criterion) -> QueryPredicate<T> {
    QueryPredicate::new(criteria)
}

/// Creates a query predicate matching all objects of a type.
#[must_use]
pub fn for_all<T: 'static>() -> QueryPredicate<T> {
    QueryPredicate::new(Criterion::Always)
}

/// Accesses an attribute by name for function wrapping.
#[must_use]
pub fn field(name: impl Into<String>) -> FieldExpr {
    FieldExpr::Field(name.into())
}

/// Applies a value criterion to a named attribute.
#[must_use]
pub fn if_field(name: impl Into<String>, value: Criterion) -> Criterion {
    Criterion::Element {
        target: FieldExpr::Field(name.into()),
        value: Box::new(value),
    }
}

/// Applies a value criterion to an attribute descriptor.
#[must_use]
pub fn if_attribute(
    _mapping: &dyn ObjectMapping,
    attribute: &Attribute,
    value: Criterion,
) -> Criterion {
    if_field(attribute.name(), value)
}

/// Applies a value criterion to a function expression over an attribute.
#[must_use]
pub fn if_function(target: FieldExpr, value: Criterion) -> Criterion {
    Criterion::Element {
        target,
        value: Box::new(value),
    }
}

/// Matches attribute values equal to the given value.
#[must_use]
pub fn equal_to(value: impl Into<Value>) -> Criterion {
    Criterion::Compare(Compare::Equal(value.into()))
}

/// Matches NULL attribute values.
#[must_use]
pub fn is_null() -> Criterion {
    Criterion::Compare(Compare::Equal(Value::Null))
}

/// Matches attribute values less than the given value.
#[must_use]
pub fn less_than(value: impl Into<Value>) -> Criterion {
    Criterion::Compare(Compare::Less(value.into()))
}

/// Matches attribute values less than or equal to the given value.
#[must_use]
pub fn less_or_equal(value: impl Into<Value>) -> Criterion {
    Criterion::Compare(Compare::LessOrEqual(value.into()))
}

/// Matches attribute values greater than the given value.
#[must_use]
pub fn greater_than(value: impl Into<Value>) -> Criterion {
    Criterion::Compare(Compare::Greater(value.into()))
}

/// Matches attribute values greater than or equal to the given value.
#[must_use]
pub fn greater_or_equal(value: impl Into<Value>) -> Criterion {
    Criterion::Compare(Compare::GreaterOrEqual(value.into()))
}

/// Matches attribute values contained in the given collection.
#[must_use]
pub fn element_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Criterion {
    Criterion::Compare(Compare::In(values.into_iter().map(Into::into).collect()))
}

/// Matches attribute values against a SQL LIKE pattern.
#[must_use]
pub fn like(pattern: impl Into<String>) -> Criterion {
    Criterion::Compare(Compare::Like(pattern.into()))
}

/// Matches attribute values that sound like the given value, using the
/// dialect's fuzzy search function.
#[must_use]
pub fn almost_like(value: impl Into<String>) -> Criterion {
    Criterion::Compare(Compare::SimilarTo(value.into()))
}

/// Negates a criterion. Negations of comparisons fold into the operator.
#[must_use]
pub fn not(criterion: Criterion) -> Criterion {
    Criterion::Not(Box::new(criterion))
}

/// Declares a sort order for an attribute. Sort keys always evaluate to
/// TRUE and only affect the SQL ORDER BY clause.
#[must_use]
pub fn sort_by(name: impl Into<String>, ascending: bool) -> Criterion {
    Criterion::Sort {
        target: FieldExpr::Field(name.into()),
        ascending,
    }
}

/// Matches parents that have a child of the given type satisfying the
/// criteria. Applied to the parent's collection attribute with
/// [`if_field`].
#[must_use]
pub fn has_child<T: 'static>(criteria: Criterion) -> Criterion {
    Criterion::SubQuery(SubQuery {
        query: Box::new(RawQuery::new(TypeKey::of::<T>(), criteria)),
        ref_attr: None,
    })
}

/// Matches objects whose reference attribute points to an object of the
/// referenced type satisfying the criteria.
#[must_use]
pub fn refers_to<T: 'static>(criteria: Criterion) -> Criterion {
    Criterion::SubQuery(SubQuery {
        query: Box::new(RawQuery::new(TypeKey::of::<T>(), criteria)),
        ref_attr: None,
    })
}

/// Like [`refers_to`], selecting the compared column of the referenced
/// type through an accessor expression instead of its id attribute.
#[must_use]
pub fn refers_to_attr<T: 'static>(accessor: FieldExpr, criteria: Criterion) -> Criterion {
    Criterion::SubQuery(SubQuery {
        query: Box::new(RawQuery::new(TypeKey::of::<T>(), criteria)),
        ref_attr: Some(accessor),
    })
}
