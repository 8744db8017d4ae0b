//! shapr ABI: values and explicit type descriptors
//!
//! This crate is the `no_std` half of shapr. It holds the two things both the
//! host library and derived code need to agree on:
//!
//! - [`Value`]: the dynamic in-memory value a payload mapper converts from and to
//! - [`Type`] / [`TypeDef`] / [`TypeRegistry`]: statically constructed
//!   descriptions of structural types, the input of metaclass introspection
//!
//! Rust types describe themselves through the [`Shape`] trait, usually via
//! `#[derive(Shape)]` (enable the `derive` feature). Structs become records;
//! enums with unit variants become string leaves holding the variant name.
//!
//! ```ignore
//! use shapr_abi::{Shape, TypeRegistry, Value};
//!
//! #[derive(Shape)]
//! struct Person {
//!     name: String,
//!     age: i64,
//! }
//!
//! let mut registry = TypeRegistry::new();
//! let ty = Person::describe(&mut registry);
//! assert_eq!(ty.to_string(), "Person");
//!
//! let value: Value = Person { name: "Ana".into(), age: 30 }.into();
//! ```

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod shape;
mod types;
mod value;

pub use shape::Shape;
pub use types::{Align, Field, Format, Type, TypeDef, TypeRegistry, RegistryError};
pub use value::{FromValue, Value};

#[cfg(feature = "derive")]
pub use shapr_derive::Shape;

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

/// Errors raised when converting a [`Value`] back into a Rust value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    TypeMismatch { expected: String, got: String },
    MissingField(String),
    UnknownField(String),
    /// A string that names no variant of a unit enum.
    UnknownVariant(String),
    FieldError(String, Box<ConversionError>),
    IndexError(usize, Box<ConversionError>),
    ExpectedRecord(String),
    ExpectedList(String),
    ExpectedOption(String),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            ConversionError::MissingField(name) => write!(f, "missing field `{name}`"),
            ConversionError::UnknownField(name) => write!(f, "unknown field `{name}`"),
            ConversionError::UnknownVariant(name) => write!(f, "unknown variant `{name}`"),
            ConversionError::FieldError(name, inner) => write!(f, "field `{name}`: {inner}"),
            ConversionError::IndexError(index, inner) => write!(f, "item {index}: {inner}"),
            ConversionError::ExpectedRecord(got) => write!(f, "expected record, got {got}"),
            ConversionError::ExpectedList(got) => write!(f, "expected list, got {got}"),
            ConversionError::ExpectedOption(got) => write!(f, "expected option, got {got}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConversionError {}

/// Re-exports used by `#[derive(Shape)]` expansions. Not part of the public API.
#[doc(hidden)]
pub mod __private {
    pub use alloc::borrow::ToOwned;
    pub use alloc::boxed::Box;
    pub use alloc::format;
    pub use alloc::string::String;
    pub use alloc::vec;
    pub use alloc::vec::Vec;
    pub use core::any::TypeId;
    pub use core::convert::{From, TryFrom};
    pub use core::default::Default;
    pub use core::iter::Iterator;
    pub use core::option::Option::{self, None, Some};
    pub use core::result::Result::{self, Err, Ok};
}
