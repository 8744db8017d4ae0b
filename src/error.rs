//! Error types

use shapr_abi::{ConversionError, RegistryError};
use thiserror::Error;

/// A type could not be decomposed into a metaclass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeIntrospectionError {
    #[error("Undefined type `{name}`")]
    UndefinedType { name: String },

    #[error("Member `{member}` has the opaque type `value`")]
    OpaqueMember { member: String },

    #[error("Type `{name}` has no members")]
    NoMembers { name: String },

    #[error("Member `{member}` of type `{owner}` is declared twice")]
    DuplicateMember { owner: String, member: String },

    #[error("Member `{member}` is a list without an element type")]
    MissingElementType { member: String },

    #[error("Member `{member}` is a nested collection: {ty}")]
    NestedCollection { member: String, ty: String },

    #[error("Member `{member}` has optional list elements: {ty}")]
    NullableElement { member: String, ty: String },

    #[error("Member `{member}` is optional twice: {ty}")]
    DoublyOptional { member: String, ty: String },

    #[error("Invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Conflicting definition: {0}")]
    ConflictingDefinition(#[from] RegistryError),

    #[error("Element type `{element}` conflicts with root type `{root}`")]
    ConflictingElementType { root: String, element: String },

    #[error("Type nesting exceeds the maximum depth of {max}")]
    TooDeep { max: usize },
}

/// A type graph refers back to a type that is still being expanded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cyclic type: {}", .chain.join(" -> "))]
pub struct CyclicTypeError {
    /// Named types on the cycle, first and last entries equal.
    pub chain: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error(transparent)]
    Introspection(#[from] TypeIntrospectionError),

    #[error(transparent)]
    Cyclic(#[from] CyclicTypeError),
}

/// No mapper can be built for a metaclass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingConstructionError {
    #[error("Member `{member}`: no codec registered for kind `{kind}`")]
    UnregisteredKind { member: String, kind: String },

    #[error("Member `{member}`: invalid format: {reason}")]
    InvalidFormat { member: String, reason: String },
}

/// A leaf codec could not render or parse a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {expected}, got {got}")]
    Unexpected { expected: String, got: String },

    #[error("invalid text {0:?}")]
    Invalid(String),
}

/// Encoding or decoding a payload failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Type mismatch at `{member}`: expected {expected}, got {got}")]
    TypeMismatch {
        member: String,
        expected: String,
        got: String,
    },

    #[error("Record `{record}` is missing field `{field}`")]
    MissingField { record: String, field: String },

    #[error("Record `{record}` has unknown field `{field}`")]
    UnknownField { record: String, field: String },

    #[error("Record `{record}` has field `{field}` more than once")]
    DuplicateField { record: String, field: String },

    #[error("Member `{member}` needs {needed} but only {available} fit")]
    Overflow {
        member: String,
        needed: usize,
        available: usize,
    },

    #[error("Malformed header at {position}: {reason}")]
    MalformedHeader { position: usize, reason: String },

    #[error("Header does not match metaclass: expected {expected}, found {found}")]
    HeaderMismatch { expected: String, found: String },

    #[error("Malformed payload at {position}: {reason}")]
    MalformedPayload { position: usize, reason: String },

    #[error("Invalid {kind} text {text:?} at `{member}`")]
    InvalidLeaf {
        member: String,
        kind: String,
        text: String,
    },

    #[error("Layout does not fit member `{member}`")]
    LayoutMismatch { member: String },

    #[error("Limit exceeded: {what} is {value}, max {max}")]
    LimitExceeded {
        what: &'static str,
        value: usize,
        max: usize,
    },

    #[error("Payload ends early at {position}")]
    UnexpectedEnd { position: usize },

    #[error("{remaining} trailing characters after payload")]
    TrailingInput { remaining: usize },
}

/// Any failure surfaced by [`Context`](crate::Context).
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Mapping(#[from] MappingConstructionError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Value conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl From<TypeIntrospectionError> for Error {
    fn from(err: TypeIntrospectionError) -> Self {
        Error::Read(err.into())
    }
}

impl From<CyclicTypeError> for Error {
    fn from(err: CyclicTypeError) -> Self {
        Error::Read(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
