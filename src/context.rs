//! Typed façade over a reader and a factory

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use shapr_abi::{FromValue, Shape, Type, TypeRegistry, Value};

use crate::cache::SingleFlight;
use crate::error::{Result, TypeIntrospectionError};
use crate::factory::{BasicParserFactory, ParserFactory, ParserFactoryBuilder};
use crate::limits::Limits;
use crate::mapper::{read_metaclass, LeafCodec, PayloadMapper};
use crate::metaclass::Metaclass;
use crate::reader::{BasicMetaclassReader, MetaclassReader, SkipStrategy};

/// Converts [`Shape`] types to and from payloads.
///
/// ```ignore
/// use shapr::{Context, Shape};
///
/// #[derive(Shape)]
/// struct Person {
///     name: String,
///     age: i64,
/// }
///
/// let ctx = Context::new();
/// let text = ctx.to_payload(Person { name: "Ana".into(), age: 30 })?;
/// assert_eq!(text, "{name:string(3);age:s64(2)}Ana30");
/// let person: Person = ctx.from_payload(&text)?;
/// ```
pub struct Context {
    reader: Arc<dyn MetaclassReader>,
    factory: Arc<dyn ParserFactory>,
    limits: Limits,
    registered: SingleFlight<TypeId, Type>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("limits", &self.limits)
            .field("registered", &self.registered.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn reader(&self) -> &dyn MetaclassReader {
        self.reader.as_ref()
    }

    pub fn factory(&self) -> &dyn ParserFactory {
        self.factory.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Add hand-written type definitions.
    pub fn define(&self, registry: &TypeRegistry) -> Result<()> {
        self.reader.define(registry)?;
        Ok(())
    }

    /// Type reference of `T`, defining its descriptors on first use.
    fn describe<T: Shape + 'static>(&self) -> Result<Type, TypeIntrospectionError> {
        self.registered.get_or_try_init(TypeId::of::<T>(), || {
            let mut registry = TypeRegistry::new();
            let ty = T::describe(&mut registry);
            self.reader.define(&registry)?;
            Ok(ty)
        })
    }

    pub fn metaclass_of<T: Shape + 'static>(&self) -> Result<Arc<Metaclass>> {
        let ty = self.describe::<T>()?;
        Ok(self.reader.read(&ty)?)
    }

    /// Metaclass of a list whose items are `T`.
    pub fn list_metaclass_of<T: Shape + 'static>(&self) -> Result<Arc<Metaclass>> {
        let ty = self.describe::<T>()?;
        Ok(self.reader.read_with_element(&Type::raw_list(), &ty)?)
    }

    pub fn mapper(&self, metaclass: &Metaclass) -> Result<Arc<dyn PayloadMapper>> {
        Ok(self.factory.create(metaclass)?)
    }

    pub fn encode_value(&self, metaclass: &Metaclass, value: &Value) -> Result<String> {
        Ok(self.mapper(metaclass)?.encode(value)?)
    }

    pub fn decode_value(&self, metaclass: &Metaclass, text: &str) -> Result<Value> {
        Ok(self
            .mapper(metaclass)?
            .decode_with_limits(text, &self.limits)?)
    }

    /// Metaclass described by a payload's own header.
    pub fn payload_metaclass(&self, text: &str) -> Result<Metaclass> {
        Ok(read_metaclass(text, &self.limits)?)
    }

    /// Decode a payload without knowing its type.
    ///
    /// Records come back as [`Value::Record`] in header order and custom kinds
    /// still need a registered codec.
    pub fn decode_dynamic(&self, text: &str) -> Result<Value> {
        let metaclass = self.payload_metaclass(text)?;
        self.decode_value(&metaclass, text)
    }

    pub fn to_payload<T: Shape + Into<Value> + 'static>(&self, value: T) -> Result<String> {
        let metaclass = self.metaclass_of::<T>()?;
        self.encode_value(&metaclass, &value.into())
    }

    pub fn from_payload<T: Shape + FromValue + 'static>(&self, text: &str) -> Result<T> {
        let metaclass = self.metaclass_of::<T>()?;
        let value = self.decode_value(&metaclass, text)?;
        Ok(T::from_value(value)?)
    }

    pub fn to_payload_list<T: Shape + Into<Value> + 'static>(&self, values: Vec<T>) -> Result<String> {
        let metaclass = self.list_metaclass_of::<T>()?;
        self.encode_value(&metaclass, &Value::from(values))
    }

    pub fn from_payload_list<T: Shape + FromValue + 'static>(&self, text: &str) -> Result<Vec<T>> {
        let metaclass = self.list_metaclass_of::<T>()?;
        let value = self.decode_value(&metaclass, text)?;
        Ok(Vec::<T>::from_value(value)?)
    }
}

/// Wires a [`Context`].
///
/// Without an explicit reader, a [`BasicMetaclassReader`] is built with the
/// configured limits and skip strategy. Without an explicit factory, a
/// [`BasicParserFactory`] is built with the configured codecs; codecs are
/// ignored when a factory is supplied.
#[derive(Default)]
pub struct ContextBuilder {
    reader: Option<Arc<dyn MetaclassReader>>,
    factory: Option<Arc<dyn ParserFactory>>,
    codecs: ParserFactoryBuilder,
    skip: Option<Arc<dyn SkipStrategy>>,
    limits: Limits,
}

impl ContextBuilder {
    pub fn reader(mut self, reader: impl MetaclassReader + 'static) -> Self {
        self.reader = Some(Arc::new(reader));
        self
    }

    pub fn factory(mut self, factory: impl ParserFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn codec(mut self, kind: impl Into<String>, codec: impl LeafCodec + 'static) -> Self {
        self.codecs = self.codecs.codec(kind, codec);
        self
    }

    pub fn skip_strategy(mut self, skip: impl SkipStrategy + 'static) -> Self {
        self.skip = Some(Arc::new(skip));
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> Context {
        let limits = self.limits;
        let reader: Arc<dyn MetaclassReader> = match (self.reader, self.skip) {
            (Some(reader), _) => reader,
            (None, Some(skip)) => Arc::new(
                BasicMetaclassReader::new()
                    .with_limits(limits)
                    .with_skip_strategy(skip),
            ),
            (None, None) => Arc::new(BasicMetaclassReader::new().with_limits(limits)),
        };
        let factory: Arc<dyn ParserFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(self.codecs.build()),
        };

        Context {
            reader,
            factory,
            limits,
            registered: SingleFlight::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, PayloadError, ReadError};
    use crate::reader::IgnoreFields;
    use shapr_abi::{Field, TypeDef};

    fn contact_registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record(
            "Contact",
            vec![
                Field::new("name", Type::String),
                Field::new("email", Type::String),
            ],
        ));
        registry
    }

    fn contact(name: &str, email: &str) -> Value {
        Value::record([("name", Value::from(name)), ("email", Value::from(email))])
    }

    #[test]
    fn hand_written_definitions() {
        let ctx = Context::new();
        ctx.define(&contact_registry()).unwrap();

        let metaclass = ctx.reader().read(&Type::named("Contact")).unwrap();
        let value = contact("Jo", "jo@x.io");
        let text = ctx.encode_value(&metaclass, &value).unwrap();
        assert_eq!(text, "{name:string(2);email:string(7)}Jojo@x.io");
        assert_eq!(ctx.decode_value(&metaclass, &text).unwrap(), value);
    }

    #[test]
    fn skip_strategy_reaches_default_reader() {
        let ctx = Context::builder()
            .skip_strategy(IgnoreFields::new().ignore("Contact", "email"))
            .build();
        ctx.define(&contact_registry()).unwrap();

        let metaclass = ctx.reader().read(&Type::named("Contact")).unwrap();
        let names: Vec<&str> = metaclass.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["name"]);
    }

    #[test]
    fn limits_reach_reader_and_decoder() {
        let ctx = Context::builder()
            .limits(Limits::default().with_max_payload_len(10))
            .build();
        ctx.define(&contact_registry()).unwrap();
        assert_eq!(ctx.limits().max_payload_len, 10);

        let metaclass = ctx.reader().read(&Type::named("Contact")).unwrap();
        let text = ctx.encode_value(&metaclass, &contact("Jo", "jo@x.io")).unwrap();
        assert!(matches!(
            ctx.decode_value(&metaclass, &text),
            Err(Error::Payload(_))
        ));

        let shallow = Context::builder()
            .limits(Limits::default().with_max_depth(0))
            .build();
        shallow.define(&contact_registry()).unwrap();
        assert!(matches!(
            shallow.reader().read(&Type::named("Contact")),
            Err(ReadError::Introspection(TypeIntrospectionError::TooDeep { max: 0 }))
        ));
    }

    #[test]
    fn primitive_payloads() {
        let ctx = Context::new();
        assert_eq!(ctx.to_payload(42u16).unwrap(), "u16(2)42");
        assert_eq!(ctx.from_payload::<u16>("u16(3) 42").unwrap(), 42);

        let text = ctx.to_payload_list(vec![1i32, -20]).unwrap();
        assert_eq!(text, "s32(3)[2]2  1-20");
        assert_eq!(ctx.from_payload_list::<i32>(&text).unwrap(), vec![1, -20]);
    }

    #[test]
    fn dynamic_decoding() {
        let ctx = Context::new();
        ctx.define(&contact_registry()).unwrap();
        let metaclass = ctx.reader().read(&Type::named("Contact")).unwrap();
        let text = ctx.encode_value(&metaclass, &contact("Jo", "jo@x.io")).unwrap();

        assert_eq!(ctx.decode_dynamic(&text).unwrap(), contact("Jo", "jo@x.io"));
        assert_eq!(ctx.decode_dynamic("s32(3)[2]2  1-20").unwrap(), Value::from(vec![1i32, -20]));
        assert_eq!(ctx.decode_dynamic("string(1)?").unwrap(), Value::from("?"));

        assert!(matches!(
            ctx.decode_dynamic("{born:date(10)}2024-01-31"),
            Err(Error::Mapping(_))
        ));
        assert!(matches!(
            ctx.decode_dynamic("{name:string(2)}J"),
            Err(Error::Payload(PayloadError::UnexpectedEnd { .. }))
        ));
    }

    #[test]
    fn conversion_errors_surface() {
        let ctx = Context::new();
        assert!(matches!(
            ctx.from_payload::<u16>("string(2)42"),
            Err(Error::Payload(_))
        ));
    }
}
