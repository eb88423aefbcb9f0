//! # Internal Macros
//!
//! This module provides macros for reducing boilerplate when declaring
//! persisted entity types.
//!
//! ## impl_entity!
//!
//! Implements the [`Entity`](crate::mapping::Entity) trait for a struct that
//! embeds an [`EntityState`](crate::mapping::EntityState) field. The state
//! field defaults to `state` and can be overridden with a second argument.
//!
//! ### Usage
//!
//! ```ignore
//! use relstore::mapping::EntityState;
//!
//! pub struct Record {
//!     pub id: i64,
//!     pub name: String,
//!     pub state: EntityState,
//! }
//!
//! relstore::impl_entity!(Record);
//!
//! // or, with a differently named state field:
//! // relstore::impl_entity!(Record, persistence);
//! ```
//!
//! Types that need an after-store hook implement
//! [`Entity`](crate::mapping::Entity) by hand instead and override
//! `after_store`.

/// Implements [`Entity`](crate::mapping::Entity) for a struct with an
/// embedded [`EntityState`](crate::mapping::EntityState) field.
#[macro_export]
macro_rules! impl_entity {
    ($type:ty) => {
        $crate::impl_entity!($type, state);
    };
    ($type:ty, $field:ident) => {
        impl $crate::mapping::Entity for $type {
            fn type_key(&self) -> $crate::mapping::TypeKey {
                $crate::mapping::TypeKey::of::<$type>()
            }

            fn state(&self) -> &$crate::mapping::EntityState {
                &self.$field
            }

            fn state_mut(&mut self) -> &mut $crate::mapping::EntityState {
                &mut self.$field
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }
    };
}
