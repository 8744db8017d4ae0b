//! Static type descriptions for Rust types

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::types::{Type, TypeRegistry};

/// A Rust type that can describe its own structure.
///
/// `describe` returns the [`Type`] reference for `Self` and defines every
/// named type it depends on in `registry`. Record types are usually derived:
///
/// ```ignore
/// #[derive(Shape)]
/// struct Phone {
///     #[shape(size = 10)]
///     number: String,
/// }
/// ```
pub trait Shape {
    fn describe(registry: &mut TypeRegistry) -> Type;
}

macro_rules! primitive_shape {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Shape for $ty {
                fn describe(_: &mut TypeRegistry) -> Type {
                    Type::$variant
                }
            }
        )*
    };
}

primitive_shape! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => S8,
    i16 => S16,
    i32 => S32,
    i64 => S64,
    f32 => F32,
    f64 => F64,
    char => Char,
    String => String,
}

impl<T: Shape> Shape for Vec<T> {
    fn describe(registry: &mut TypeRegistry) -> Type {
        Type::list(T::describe(registry))
    }
}

impl<T: Shape> Shape for Option<T> {
    fn describe(registry: &mut TypeRegistry) -> Type {
        Type::option(T::describe(registry))
    }
}

impl<T: Shape> Shape for Box<T> {
    fn describe(registry: &mut TypeRegistry) -> Type {
        T::describe(registry)
    }
}
