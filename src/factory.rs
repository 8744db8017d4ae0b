//! Mapper construction
//!
//! [`BasicParserFactory`] dispatches on the metaclass alone:
//!
//! 1. optional → [`OptionalMapper`] around the required view
//! 2. repeated → [`RepeatedMapper`] around the element view
//! 3. leaf → [`LeafMapper`] with the codec registered for its kind
//! 4. record → [`RecordMapper`] over one mapper per member
//!
//! Nested mappers are obtained through [`ParserFactory::create`], so equal
//! sub-shapes share one mapper.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::SingleFlight;
use crate::error::MappingConstructionError;
use crate::mapper::{
    builtin_codec, LeafCodec, LeafMapper, OptionalMapper, PayloadMapper, RecordMapper,
    RepeatedMapper,
};
use crate::metaclass::{Cardinality, Fingerprint, LeafKind, Metaclass, Structure};

/// Builds payload mappers from metaclasses.
pub trait ParserFactory: Send + Sync {
    fn create(&self, metaclass: &Metaclass)
        -> Result<Arc<dyn PayloadMapper>, MappingConstructionError>;
}

#[derive(Debug, Default)]
pub struct BasicParserFactory {
    codecs: HashMap<String, Arc<dyn LeafCodec>>,
    cache: SingleFlight<Fingerprint, Arc<dyn PayloadMapper>>,
}

impl BasicParserFactory {
    /// A factory with the built-in codecs only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ParserFactoryBuilder {
        ParserFactoryBuilder::default()
    }

    /// Number of live mappers.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn codec(&self, kind: &LeafKind) -> Option<Arc<dyn LeafCodec>> {
        self.codecs
            .get(kind.name())
            .cloned()
            .or_else(|| builtin_codec(kind))
    }

    fn construct(
        &self,
        metaclass: &Metaclass,
    ) -> Result<Arc<dyn PayloadMapper>, MappingConstructionError> {
        let shared = Arc::new(metaclass.clone());
        let format = metaclass.format();

        let mapper: Arc<dyn PayloadMapper> =
            match (metaclass.is_optional(), metaclass.cardinality(), metaclass.shape()) {
                (true, _, _) => {
                    let inner = self.create(&metaclass.required())?;
                    Arc::new(OptionalMapper::new(shared, inner))
                }
                (false, Cardinality::Repeated, _) => {
                    if format.max_occurs == Some(0) {
                        return Err(invalid(metaclass, "max_occurs must be at least 1"));
                    }
                    let element = self.create(&metaclass.element())?;
                    Arc::new(RepeatedMapper::new(shared, element))
                }
                (false, Cardinality::Single, Structure::Leaf(kind)) => {
                    if format.max_occurs.is_some() {
                        return Err(invalid(metaclass, "max_occurs on a single member"));
                    }
                    let codec = self.codec(kind).ok_or_else(|| {
                        MappingConstructionError::UnregisteredKind {
                            member: metaclass.name().to_string(),
                            kind: kind.name().to_string(),
                        }
                    })?;
                    match (format.size, codec.fixed_width()) {
                        (Some(0), _) => return Err(invalid(metaclass, "size must be at least 1")),
                        (Some(size), Some(fixed)) if size as usize != fixed => {
                            return Err(invalid(
                                metaclass,
                                &format!("size {size} contradicts the fixed width {fixed} of `{kind}`"),
                            ));
                        }
                        _ => {}
                    }
                    Arc::new(LeafMapper::new(shared, kind.clone(), codec))
                }
                (false, Cardinality::Single, Structure::Record(members)) => {
                    if format.max_occurs.is_some() {
                        return Err(invalid(metaclass, "max_occurs on a single member"));
                    }
                    if format.size.is_some() {
                        return Err(invalid(metaclass, "size on a record"));
                    }
                    let members = members
                        .iter()
                        .map(|member| self.create(member))
                        .collect::<Result<Vec<_>, _>>()?;
                    Arc::new(RecordMapper::new(shared, members))
                }
            };

        log::debug!("constructed mapper for `{metaclass}`");
        Ok(mapper)
    }
}

impl ParserFactory for BasicParserFactory {
    fn create(
        &self,
        metaclass: &Metaclass,
    ) -> Result<Arc<dyn PayloadMapper>, MappingConstructionError> {
        let key = metaclass.fingerprint();
        self.cache.get_or_try_init(key, || {
            log::trace!("mapper cache miss for `{metaclass}` ({key})");
            self.construct(metaclass)
        })
    }
}

fn invalid(metaclass: &Metaclass, reason: &str) -> MappingConstructionError {
    MappingConstructionError::InvalidFormat {
        member: metaclass.name().to_string(),
        reason: reason.to_string(),
    }
}

/// Registers leaf codecs for a [`BasicParserFactory`].
///
/// A codec registered under a built-in kind name replaces the built-in codec.
#[derive(Debug, Default)]
pub struct ParserFactoryBuilder {
    codecs: HashMap<String, Arc<dyn LeafCodec>>,
}

impl ParserFactoryBuilder {
    pub fn codec(mut self, kind: impl Into<String>, codec: impl LeafCodec + 'static) -> Self {
        self.codecs.insert(kind.into(), Arc::new(codec));
        self
    }

    pub fn build(self) -> BasicParserFactory {
        BasicParserFactory {
            codecs: self.codecs,
            cache: SingleFlight::new(),
        }
    }
}
