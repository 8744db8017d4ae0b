//! Metaclass introspection
//!
//! [`BasicMetaclassReader`] walks explicit type descriptors from a
//! [`TypeRegistry`] and builds [`Metaclass`] trees:
//!
//! - primitive and custom types become leaves
//! - named records recurse into nested metaclasses, members in declared order
//! - `list<T>` marks a member repeated, `option<T>` marks it optional
//! - aliases resolve to their target
//!
//! The named types being expanded on the current path form a stack; meeting
//! one of them again is a cycle. Results are memoized per
//! `(type, element type)`, but the walk itself never consults the cache.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use shapr_abi::{Field, Format, Shape, Type, TypeDef, TypeRegistry};

use crate::cache::SingleFlight;
use crate::error::{CyclicTypeError, ReadError, TypeIntrospectionError};
use crate::limits::Limits;
use crate::metaclass::{Cardinality, LeafKind, Metaclass, Structure};

/// Produces metaclasses from type descriptors.
pub trait MetaclassReader: Send + Sync {
    /// Metaclass of a root type.
    fn read(&self, ty: &Type) -> Result<Arc<Metaclass>, ReadError>;

    /// Metaclass of a root type whose items are described by `element`.
    ///
    /// A `list<…>` root becomes `list<element>`; a dynamic `value` root, or a
    /// root equal to `element`, becomes a single item. `option<…>` roots keep
    /// their wrapper. Any other root that differs from `element` conflicts.
    fn read_with_element(&self, ty: &Type, element: &Type) -> Result<Arc<Metaclass>, ReadError>;

    /// Add type definitions.
    fn define(&self, registry: &TypeRegistry) -> Result<(), TypeIntrospectionError>;
}

// ============================================================================
// Skip strategies
// ============================================================================

/// Decides which fields of a record stay out of its metaclass.
pub trait SkipStrategy: Send + Sync + fmt::Debug {
    fn skip(&self, owner: &str, field: &Field) -> bool;
}

/// Skips fields flagged with `skip`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicSkipStrategy;

impl SkipStrategy for BasicSkipStrategy {
    fn skip(&self, _owner: &str, field: &Field) -> bool {
        field.skip
    }
}

impl<S: SkipStrategy + ?Sized> SkipStrategy for Arc<S> {
    fn skip(&self, owner: &str, field: &Field) -> bool {
        (**self).skip(owner, field)
    }
}

/// Skips flagged fields plus an explicit list of `(type, field)` pairs.
#[derive(Debug, Default, Clone)]
pub struct IgnoreFields {
    ignored: HashMap<String, HashSet<String>>,
}

impl IgnoreFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(mut self, owner: impl Into<String>, field: impl Into<String>) -> Self {
        self.ignored
            .entry(owner.into())
            .or_default()
            .insert(field.into());
        self
    }
}

impl SkipStrategy for IgnoreFields {
    fn skip(&self, owner: &str, field: &Field) -> bool {
        field.skip
            || self
                .ignored
                .get(owner)
                .map_or(false, |fields| fields.contains(&field.name))
    }
}

// ============================================================================
// BasicMetaclassReader
// ============================================================================

type ReadKey = (Type, Option<Type>);

#[derive(Debug)]
pub struct BasicMetaclassReader {
    registry: RwLock<TypeRegistry>,
    skip: Arc<dyn SkipStrategy>,
    limits: Limits,
    cache: SingleFlight<ReadKey, Arc<Metaclass>>,
}

impl Default for BasicMetaclassReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicMetaclassReader {
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::new())
    }

    /// Create a reader that starts from existing definitions.
    ///
    /// Names are validated on the first read that reaches them.
    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
            skip: Arc::new(BasicSkipStrategy),
            limits: Limits::default(),
            cache: SingleFlight::new(),
        }
    }

    pub fn with_skip_strategy(mut self, skip: impl SkipStrategy + 'static) -> Self {
        self.skip = Arc::new(skip);
        self.cache.clear();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self.cache.clear();
        self
    }

    /// Define `T` and everything it refers to; returns the type reference.
    pub fn register<T: Shape>(&self) -> Result<Type, TypeIntrospectionError> {
        let mut registry = TypeRegistry::new();
        let ty = T::describe(&mut registry);
        self.define(&registry)?;
        Ok(ty)
    }

    /// Number of memoized metaclasses.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn read_uncached(&self, ty: &Type, element: Option<&Type>) -> Result<Metaclass, ReadError> {
        let registry = self.registry.read();
        let mut walk = Walk {
            registry: &registry,
            skip: self.skip.as_ref(),
            max_depth: self.limits.max_depth,
            path: Vec::new(),
        };

        let root = match element {
            Some(element) => walk.apply_element(ty, element)?,
            None => ty.clone(),
        };
        walk.member(root_name(&root), &root, Format::default(), 0)
    }
}

impl MetaclassReader for BasicMetaclassReader {
    fn read(&self, ty: &Type) -> Result<Arc<Metaclass>, ReadError> {
        self.cache.get_or_try_init((ty.clone(), None), || {
            log::debug!("reading metaclass for `{ty}`");
            self.read_uncached(ty, None).map(Arc::new)
        })
    }

    fn read_with_element(&self, ty: &Type, element: &Type) -> Result<Arc<Metaclass>, ReadError> {
        self.cache
            .get_or_try_init((ty.clone(), Some(element.clone())), || {
                log::debug!("reading metaclass for `{ty}` with element `{element}`");
                self.read_uncached(ty, Some(element)).map(Arc::new)
            })
    }

    fn define(&self, registry: &TypeRegistry) -> Result<(), TypeIntrospectionError> {
        for def in registry.iter() {
            validate_name(def.name())?;
        }
        self.registry.write().merge(registry)?;
        log::trace!("defined {} types", registry.len());
        Ok(())
    }
}

fn root_name(ty: &Type) -> String {
    match ty.innermost() {
        Type::Named(name) => name.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Names
// ============================================================================

/// Member and type names: non-empty; letters, digits, `_` and `-`.
fn validate_name(name: &str) -> Result<(), TypeIntrospectionError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        "only ASCII letters, digits, '_' and '-' are allowed"
    } else {
        return Ok(());
    };
    Err(TypeIntrospectionError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Custom kind names: an identifier that does not shadow a built-in kind.
fn validate_kind(kind: &str) -> Result<(), TypeIntrospectionError> {
    let reason = match kind.chars().next() {
        None => "kind name is empty",
        Some(first) if !first.is_ascii_alphabetic() => "kind name must start with a letter",
        Some(_) if !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            "only ASCII letters, digits and '_' are allowed in a kind name"
        }
        Some(_) if LeafKind::is_builtin_name(kind) || kind == "value" => {
            "kind name shadows a built-in type"
        }
        Some(_) => return Ok(()),
    };
    Err(TypeIntrospectionError::InvalidName {
        name: kind.to_string(),
        reason,
    })
}

// ============================================================================
// Walk
// ============================================================================

struct Walk<'a> {
    registry: &'a TypeRegistry,
    skip: &'a dyn SkipStrategy,
    max_depth: usize,
    /// Named record types being expanded, outermost first.
    path: Vec<String>,
}

impl Walk<'_> {
    /// Follow aliases until a non-alias type is reached.
    fn resolve(&self, ty: &Type) -> Result<Type, ReadError> {
        let mut current = ty.clone();
        let mut seen: Vec<String> = Vec::new();
        loop {
            let Type::Named(name) = &current else {
                return Ok(current);
            };
            if let Some(pos) = seen.iter().position(|n| n == name) {
                let mut chain = seen[pos..].to_vec();
                chain.push(name.clone());
                return Err(CyclicTypeError { chain }.into());
            }
            match self.registry.get(name) {
                Some(TypeDef::Alias { ty, .. }) => {
                    seen.push(name.clone());
                    current = ty.clone();
                }
                Some(TypeDef::Record { .. }) => return Ok(current),
                None => {
                    return Err(TypeIntrospectionError::UndefinedType { name: name.clone() }.into())
                }
            }
        }
    }

    /// Combine a root type with an explicit element type.
    fn apply_element(&self, root: &Type, element: &Type) -> Result<Type, ReadError> {
        let resolved_element = self.resolve(element)?;
        if resolved_element.is_list() {
            return Err(TypeIntrospectionError::NestedCollection {
                member: root_name(root),
                ty: element.to_string(),
            }
            .into());
        }

        match self.resolve(root)? {
            Type::Option(inner) => Ok(Type::option(self.apply_element(&inner, element)?)),
            Type::List(item) => {
                if !item.is_dynamic() && self.resolve(&item)? != resolved_element {
                    log::debug!("element type `{element}` overrides list item type `{item}`");
                }
                Ok(Type::list(element.clone()))
            }
            Type::Value => Ok(element.clone()),
            other if other == resolved_element => Ok(element.clone()),
            other => Err(TypeIntrospectionError::ConflictingElementType {
                root: other.to_string(),
                element: element.to_string(),
            }
            .into()),
        }
    }

    /// Metaclass of one member (or of the root).
    fn member(
        &mut self,
        name: String,
        ty: &Type,
        format: Format,
        depth: usize,
    ) -> Result<Metaclass, ReadError> {
        if depth > self.max_depth {
            return Err(TypeIntrospectionError::TooDeep {
                max: self.max_depth,
            }
            .into());
        }

        let (optional, inner) = match self.resolve(ty)? {
            Type::Option(inner) => (true, self.resolve(&inner)?),
            other => (false, other),
        };
        if optional && matches!(inner, Type::Option(_)) {
            return Err(TypeIntrospectionError::DoublyOptional {
                member: name,
                ty: ty.to_string(),
            }
            .into());
        }

        let (cardinality, item) = match inner {
            Type::List(element) => match self.resolve(&element)? {
                Type::Value => {
                    return Err(TypeIntrospectionError::MissingElementType { member: name }.into())
                }
                Type::List(_) => {
                    return Err(TypeIntrospectionError::NestedCollection {
                        member: name,
                        ty: ty.to_string(),
                    }
                    .into())
                }
                Type::Option(_) => {
                    return Err(TypeIntrospectionError::NullableElement {
                        member: name,
                        ty: ty.to_string(),
                    }
                    .into())
                }
                item => (Cardinality::Repeated, item),
            },
            item => (Cardinality::Single, item),
        };

        let (shape, skipped) = self.structure(&name, &item, depth)?;
        Ok(Metaclass::from_parts(
            name,
            item,
            cardinality,
            optional,
            format,
            shape,
        )
        .with_skipped(skipped))
    }

    /// Shape of a resolved item type, plus the names of skipped record fields.
    fn structure(
        &mut self,
        member: &str,
        item: &Type,
        depth: usize,
    ) -> Result<(Structure, Vec<String>), ReadError> {
        match item {
            Type::Named(type_name) => self.record(type_name, depth),
            Type::Custom(kind) => {
                validate_kind(kind)?;
                Ok((Structure::Leaf(LeafKind::Custom(kind.clone())), Vec::new()))
            }
            Type::Value => Err(TypeIntrospectionError::OpaqueMember {
                member: member.to_string(),
            }
            .into()),
            Type::Option(_) => Err(TypeIntrospectionError::DoublyOptional {
                member: member.to_string(),
                ty: item.to_string(),
            }
            .into()),
            Type::List(_) => Err(TypeIntrospectionError::NestedCollection {
                member: member.to_string(),
                ty: item.to_string(),
            }
            .into()),
            primitive => match LeafKind::from_type(primitive) {
                Some(kind) => Ok((Structure::Leaf(kind), Vec::new())),
                None => Err(TypeIntrospectionError::OpaqueMember {
                    member: member.to_string(),
                }
                .into()),
            },
        }
    }

    fn record(
        &mut self,
        type_name: &str,
        depth: usize,
    ) -> Result<(Structure, Vec<String>), ReadError> {
        if let Some(pos) = self.path.iter().position(|n| n == type_name) {
            let mut chain = self.path[pos..].to_vec();
            chain.push(type_name.to_string());
            return Err(CyclicTypeError { chain }.into());
        }

        let fields = match self.registry.get(type_name) {
            Some(TypeDef::Record { fields, .. }) => fields,
            _ => {
                return Err(TypeIntrospectionError::UndefinedType {
                    name: type_name.to_string(),
                }
                .into())
            }
        };

        let (kept, skipped): (Vec<&Field>, Vec<&Field>) = fields
            .iter()
            .partition(|field| !self.skip.skip(type_name, field));
        if kept.is_empty() {
            return Err(TypeIntrospectionError::NoMembers {
                name: type_name.to_string(),
            }
            .into());
        }

        self.path.push(type_name.to_string());
        let mut members: Vec<Metaclass> = Vec::with_capacity(kept.len());
        for field in kept {
            validate_name(&field.name)?;
            if members.iter().any(|m| m.name() == field.name) {
                return Err(TypeIntrospectionError::DuplicateMember {
                    owner: type_name.to_string(),
                    member: field.name.clone(),
                }
                .into());
            }
            members.push(self.member(field.name.clone(), &field.ty, field.format, depth + 1)?);
        }
        self.path.pop();

        let skipped = skipped.into_iter().map(|field| field.name.clone()).collect();
        Ok((Structure::Record(members), skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record(
            "Person",
            vec![Field::new("name", Type::String), Field::new("age", Type::S64)],
        ));
        registry.define(TypeDef::record(
            "Phone",
            vec![Field::new("number", Type::String), Field::new("kind", Type::Char)],
        ));
        registry.define(TypeDef::alias("Phones", Type::list(Type::named("Phone"))));
        registry
    }

    fn reader() -> BasicMetaclassReader {
        BasicMetaclassReader::with_registry(registry())
    }

    fn introspection(err: ReadError) -> TypeIntrospectionError {
        match err {
            ReadError::Introspection(err) => err,
            other => panic!("expected introspection error, got {other:?}"),
        }
    }

    #[test]
    fn reads_record_in_declared_order() {
        let meta = reader().read(&Type::named("Person")).unwrap();
        assert_eq!(meta.name(), "Person");
        assert!(meta.is_record());
        let names: Vec<&str> = meta.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(meta.members()[1].leaf_kind(), Some(&LeafKind::S64));
    }

    #[test]
    fn reads_are_memoized() {
        let reader = reader();
        let first = reader.read(&Type::named("Person")).unwrap();
        let second = reader.read(&Type::named("Person")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reader.cached(), 1);
    }

    #[test]
    fn aliases_resolve() {
        let meta = reader().read(&Type::named("Phones")).unwrap();
        assert!(meta.is_repeated());
        assert_eq!(meta.element_type(), &Type::named("Phone"));
        assert_eq!(meta.declared(), Type::list(Type::named("Phone")));
    }

    #[test]
    fn element_type_fills_raw_list() {
        let meta = reader()
            .read_with_element(&Type::raw_list(), &Type::named("Phone"))
            .unwrap();
        assert!(meta.is_repeated());
        assert_eq!(meta.members().len(), 2);

        let err = reader().read(&Type::raw_list()).unwrap_err();
        assert!(matches!(
            introspection(err),
            TypeIntrospectionError::MissingElementType { .. }
        ));
    }

    #[test]
    fn element_type_precedence() {
        let reader = reader();

        let meta = reader
            .read_with_element(&Type::list(Type::named("Person")), &Type::named("Phone"))
            .unwrap();
        assert_eq!(meta.element_type(), &Type::named("Phone"));

        let meta = reader
            .read_with_element(&Type::Value, &Type::named("Person"))
            .unwrap();
        assert_eq!(meta.cardinality(), Cardinality::Single);

        let meta = reader
            .read_with_element(&Type::option(Type::raw_list()), &Type::named("Phone"))
            .unwrap();
        assert!(meta.is_optional() && meta.is_repeated());

        let err = reader
            .read_with_element(&Type::named("Person"), &Type::named("Phone"))
            .unwrap_err();
        assert!(matches!(
            introspection(err),
            TypeIntrospectionError::ConflictingElementType { .. }
        ));

        let err = reader
            .read_with_element(&Type::raw_list(), &Type::list(Type::U8))
            .unwrap_err();
        assert!(matches!(
            introspection(err),
            TypeIntrospectionError::NestedCollection { .. }
        ));
    }

    #[test]
    fn rejects_invalid_members() {
        let mut registry = registry();
        registry.define(TypeDef::record("Opaque", vec![Field::new("any", Type::Value)]));
        registry.define(TypeDef::record(
            "Nested",
            vec![Field::new("grid", Type::list(Type::list(Type::U8)))],
        ));
        registry.define(TypeDef::record(
            "Holes",
            vec![Field::new("items", Type::list(Type::option(Type::U8)))],
        ));
        registry.define(TypeDef::record(
            "Maybe",
            vec![Field::new("x", Type::option(Type::option(Type::U8)))],
        ));
        registry.define(TypeDef::record("Spaced", vec![Field::new("a b", Type::U8)]));
        registry.define(TypeDef::record(
            "Shadow",
            vec![Field::new("d", Type::custom("s64"))],
        ));
        registry.define(TypeDef::record(
            "Twice",
            vec![Field::new("a", Type::U8), Field::new("a", Type::U16)],
        ));
        let reader = BasicMetaclassReader::with_registry(registry);

        let read = |name: &str| introspection(reader.read(&Type::named(name)).unwrap_err());

        assert!(matches!(read("Opaque"), TypeIntrospectionError::OpaqueMember { .. }));
        assert!(matches!(read("Nested"), TypeIntrospectionError::NestedCollection { .. }));
        assert!(matches!(read("Holes"), TypeIntrospectionError::NullableElement { .. }));
        assert!(matches!(read("Maybe"), TypeIntrospectionError::DoublyOptional { .. }));
        assert!(matches!(read("Spaced"), TypeIntrospectionError::InvalidName { .. }));
        assert!(matches!(read("Shadow"), TypeIntrospectionError::InvalidName { .. }));
        assert!(matches!(read("Twice"), TypeIntrospectionError::DuplicateMember { .. }));
        assert!(matches!(read("Ghost"), TypeIntrospectionError::UndefinedType { .. }));
    }

    #[test]
    fn skip_strategies() {
        let mut registry = registry();
        registry.define(TypeDef::record(
            "Cached",
            vec![
                Field::new("id", Type::U32),
                Field::new("memo", Type::Value).skipped(),
                Field::new("debug", Type::String),
            ],
        ));

        let basic = BasicMetaclassReader::with_registry(registry.clone());
        let meta = basic.read(&Type::named("Cached")).unwrap();
        let names: Vec<&str> = meta.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["id", "debug"]);
        assert_eq!(meta.skipped(), ["memo".to_string()]);

        let hiding = BasicMetaclassReader::with_registry(registry.clone())
            .with_skip_strategy(IgnoreFields::new().ignore("Cached", "debug"));
        let meta = hiding.read(&Type::named("Cached")).unwrap();
        assert_eq!(meta.members().len(), 1);
        assert!(meta.is_skipped("memo") && meta.is_skipped("debug"));

        let ignoring = BasicMetaclassReader::with_registry(registry)
            .with_skip_strategy(IgnoreFields::new().ignore("Cached", "debug").ignore("Cached", "id"));
        let err = ignoring.read(&Type::named("Cached")).unwrap_err();
        assert_eq!(
            introspection(err),
            TypeIntrospectionError::NoMembers {
                name: "Cached".into()
            }
        );
    }

    #[test]
    fn detects_cycles() {
        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record(
            "Node",
            vec![Field::new("children", Type::list(Type::named("Edge")))],
        ));
        registry.define(TypeDef::record(
            "Edge",
            vec![Field::new("target", Type::option(Type::named("Node")))],
        ));
        registry.define(TypeDef::alias("Loop", Type::named("Loop")));
        let reader = BasicMetaclassReader::with_registry(registry);

        let err = reader.read(&Type::named("Node")).unwrap_err();
        assert_eq!(
            err,
            ReadError::Cyclic(CyclicTypeError {
                chain: vec!["Node".into(), "Edge".into(), "Node".into()]
            })
        );

        let err = reader.read(&Type::named("Loop")).unwrap_err();
        assert!(matches!(err, ReadError::Cyclic(_)));
    }

    #[test]
    fn depth_limit() {
        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record("A", vec![Field::new("b", Type::named("B"))]));
        registry.define(TypeDef::record("B", vec![Field::new("c", Type::named("C"))]));
        registry.define(TypeDef::record("C", vec![Field::new("x", Type::U8)]));

        let shallow = BasicMetaclassReader::with_registry(registry.clone())
            .with_limits(Limits::default().with_max_depth(2));
        let err = shallow.read(&Type::named("A")).unwrap_err();
        assert_eq!(introspection(err), TypeIntrospectionError::TooDeep { max: 2 });

        let deep = BasicMetaclassReader::with_registry(registry)
            .with_limits(Limits::default().with_max_depth(3));
        assert!(deep.read(&Type::named("A")).is_ok());
    }

    #[test]
    fn define_rejects_conflicts() {
        let reader = reader();
        let mut other = TypeRegistry::new();
        other.define(TypeDef::record("Person", vec![Field::new("id", Type::U32)]));
        assert!(matches!(
            reader.define(&other),
            Err(TypeIntrospectionError::ConflictingDefinition(_))
        ));

        let mut bad = TypeRegistry::new();
        bad.define(TypeDef::record("Bad Name", vec![Field::new("id", Type::U32)]));
        assert!(matches!(
            reader.define(&bad),
            Err(TypeIntrospectionError::InvalidName { .. })
        ));
    }

    #[test]
    fn errors_are_not_memoized() {
        let reader = BasicMetaclassReader::new();
        assert!(reader.read(&Type::named("Late")).is_err());

        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record("Late", vec![Field::new("x", Type::U8)]));
        reader.define(&registry).unwrap();

        assert!(reader.read(&Type::named("Late")).is_ok());
    }
}
