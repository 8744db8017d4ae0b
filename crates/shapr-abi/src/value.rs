//! Runtime values

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ConversionError;

/// An in-memory value that a payload mapper converts to and from text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    // Primitives
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),

    // Compound
    List(Vec<Value>),
    Option(Option<Box<Value>>),
    Record(Vec<(String, Value)>),
}

impl Value {
    /// The absent optional value.
    pub const NONE: Value = Value::Option(None);

    /// Wrap a value as a present optional.
    pub fn some(value: impl Into<Value>) -> Self {
        Value::Option(Some(Box::new(value.into())))
    }

    /// Build a record from `(name, value)` pairs.
    pub fn record<N, V, I>(fields: I) -> Self
    where
        N: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (N, V)>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::Option(None))
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::S8(_) => "s8",
            Value::S16(_) => "s16",
            Value::S32(_) => "s32",
            Value::S64(_) => "s64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Option(_) => "option",
            Value::Record(_) => "record",
        }
    }
}

// ============================================================================
// From implementations
// ============================================================================

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self { Value::$variant(v) }
            }
        )*
    };
}

value_from! {
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

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(String::from(v))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        Value::Option(v.map(|x| Box::new(x.into())))
    }
}

impl<T: Into<Value>> From<Box<T>> for Value {
    fn from(v: Box<T>) -> Self {
        (*v).into()
    }
}

// ============================================================================
// TryFrom implementations
// ============================================================================

macro_rules! value_try_into {
    ($($ty:ty => $variant:ident, $name:literal),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = ConversionError;
                fn try_from(v: Value) -> Result<Self, Self::Error> {
                    match v {
                        Value::$variant(x) => Ok(x),
                        other => Err(ConversionError::TypeMismatch {
                            expected: String::from($name),
                            got: format!("{:?}", other),
                        }),
                    }
                }
            }
        )*
    };
}

value_try_into! {
    bool => Bool, "bool",
    u8 => U8, "u8",
    u16 => U16, "u16",
    u32 => U32, "u32",
    u64 => U64, "u64",
    i8 => S8, "i8",
    i16 => S16, "i16",
    i32 => S32, "i32",
    i64 => S64, "i64",
    f32 => F32, "f32",
    f64 => F64, "f64",
    char => Char, "char",
    String => String, "String",
}

impl<T: FromValue> TryFrom<Value> for Vec<T> {
    type Error = ConversionError;
    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    T::from_value(item).map_err(|e| ConversionError::IndexError(i, Box::new(e)))
                })
                .collect(),
            other => Err(ConversionError::ExpectedList(format!("{:?}", other))),
        }
    }
}

// ============================================================================
// FromValue trait - avoids coherence issues with TryFrom for Option<T>
// ============================================================================

/// Trait for converting from a Value.
///
/// This trait exists to avoid coherence issues with Rust's blanket
/// `impl<T, U> TryFrom<U> for T where U: Into<T>` when implementing
/// conversions for generic types like `Option<T>`.
pub trait FromValue: Sized {
    fn from_value(v: Value) -> Result<Self, ConversionError>;
}

/// Blanket implementation for all types that implement TryFrom<Value>
impl<T: TryFrom<Value, Error = ConversionError>> FromValue for T {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        T::try_from(v)
    }
}

/// FromValue implementation for Option<T> - uses FromValue bound to avoid coherence issues
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(v: Value) -> Result<Self, ConversionError> {
        match v {
            Value::Option(None) => Ok(None),
            Value::Option(Some(inner)) => T::from_value(*inner).map(Some),
            other => Err(ConversionError::ExpectedOption(format!("{:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(Value::from(30i64), Value::S64(30));
        assert_eq!(Value::from("Ana"), Value::String(String::from("Ana")));
        assert_eq!(i64::try_from(Value::S64(-4)), Ok(-4));
        assert!(matches!(
            u8::try_from(Value::S64(1)),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_vec_conversion() {
        let value = Value::from(vec![1u32, 2, 3]);
        assert_eq!(
            value,
            Value::List(vec![Value::U32(1), Value::U32(2), Value::U32(3)])
        );
        let back: Vec<u32> = Vec::try_from(value).unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        let err = Vec::<u32>::try_from(Value::List(vec![Value::Bool(true)])).unwrap_err();
        assert!(matches!(err, ConversionError::IndexError(0, _)));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(Some(5u8)), Value::some(5u8));
        assert_eq!(Value::from(None::<u8>), Value::NONE);
        assert_eq!(Option::<u8>::from_value(Value::some(5u8)), Ok(Some(5)));
        assert_eq!(Option::<u8>::from_value(Value::NONE), Ok(None));
        assert!(Option::<u8>::from_value(Value::U8(5)).is_err());
    }

    #[test]
    fn test_record_helpers() {
        let value = Value::record([("name", Value::from("Ana")), ("age", Value::S64(30))]);
        assert_eq!(value.field("age"), Some(&Value::S64(30)));
        assert_eq!(value.field("missing"), None);
        assert_eq!(value.kind_name(), "record");
        assert!(Value::NONE.is_none());
    }
}
