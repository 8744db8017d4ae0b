//! shapr: metadata-driven mapping between structural types and text payloads
//!
//! A structural type is introspected once into a [`Metaclass`], a canonical
//! description of its members. A [`PayloadMapper`] built from that metaclass
//! then converts any number of values of that shape to and from a positional
//! text payload.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Context   - typed to_payload / from_payload │
//! ├──────────────────────────────────────────────┤
//! │  reader    - Type descriptors -> Metaclass   │
//! │  factory   - Metaclass -> PayloadMapper      │
//! │  mapper    - Value <-> header + payload      │
//! ├──────────────────────────────────────────────┤
//! │  shapr-abi - Value, Type, #[derive(Shape)]   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Payload format
//!
//! ```text
//! {name:string(3);age:s64(2)}Ana30
//! ```
//!
//! The header lists every slot and its width; the payload fills the slots in
//! member order. See [`mapper`] for the full grammar.
//!
//! Metaclasses are cached per `(type, element type)` and mappers per metaclass
//! fingerprint. Both caches build each entry once, even under concurrent first
//! use.

pub mod cache;
pub mod context;
pub mod error;
pub mod factory;
pub mod limits;
pub mod mapper;
pub mod metaclass;
pub mod reader;

pub use context::{Context, ContextBuilder};
pub use error::{
    CodecError, CyclicTypeError, Error, MappingConstructionError, PayloadError, ReadError, Result,
    TypeIntrospectionError,
};
pub use factory::{BasicParserFactory, ParserFactory, ParserFactoryBuilder};
pub use limits::Limits;
pub use mapper::{read_metaclass, LeafCodec, PayloadMapper};
pub use metaclass::{Cardinality, Fingerprint, LeafKind, Metaclass, Structure};
pub use reader::{BasicMetaclassReader, BasicSkipStrategy, IgnoreFields, MetaclassReader, SkipStrategy};

pub use shapr_abi::{
    Align, ConversionError, Field, Format, FromValue, Shape, Type, TypeDef, TypeRegistry, Value,
};
