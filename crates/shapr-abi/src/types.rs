//! Explicit type descriptors
//!
//! A structural type is described once, statically, by a [`TypeDef`] stored in
//! a [`TypeRegistry`] and referenced through [`Type::Named`]. Introspection
//! walks these descriptors instead of runtime reflection.
//!
//! Key design decisions:
//! - **Nominal typing** - a `Named` type is identified by its name
//! - **Named references** are the only way to express recursion, so a cycle is
//!   always visible as a repeated name
//! - **Everything derives `Hash`** - descriptors can key caches directly
//! - **`Value` kept** as the dynamic escape hatch (no discoverable members)

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::TypeId;
use core::fmt;

use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Type - Type References
// ============================================================================

/// A type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    // Primitive types
    Bool,
    U8,
    U16,
    U32,
    U64,
    S8,
    S16,
    S32,
    S64,
    F32,
    F64,
    Char,
    String,

    // Compound types
    List(Box<Type>),
    Option(Box<Type>),

    /// Reference to a [`TypeDef`] by name.
    Named(String),

    /// Extension leaf kind, e.g. `date`. Needs a registered codec to be mapped.
    Custom(String),

    /// Dynamic value (escape hatch for untyped data)
    Value,
}

impl Type {
    /// Create a list type.
    pub fn list(inner: Type) -> Self {
        Type::List(Box::new(inner))
    }

    /// Create an option type.
    pub fn option(inner: Type) -> Self {
        Type::Option(Box::new(inner))
    }

    /// Create a reference to a named type.
    pub fn named(name: impl Into<String>) -> Self {
        Type::Named(name.into())
    }

    /// Create a custom leaf kind.
    pub fn custom(kind: impl Into<String>) -> Self {
        Type::Custom(kind.into())
    }

    /// A list whose element type is not known (`list<value>`).
    pub fn raw_list() -> Self {
        Type::List(Box::new(Type::Value))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Bool
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::S8
                | Type::S16
                | Type::S32
                | Type::S64
                | Type::F32
                | Type::F64
                | Type::Char
                | Type::String
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Type::List(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Value)
    }

    /// The item type: strips `option<…>` and `list<…>` wrappers.
    pub fn innermost(&self) -> &Type {
        match self {
            Type::List(inner) | Type::Option(inner) => inner.innermost(),
            other => other,
        }
    }

    /// Replace the item type, keeping `option<…>` and `list<…>` wrappers.
    pub fn with_innermost(self, item: Type) -> Type {
        match self {
            Type::List(inner) => Type::List(Box::new(inner.with_innermost(item))),
            Type::Option(inner) => Type::Option(Box::new(inner.with_innermost(item))),
            _ => item,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::U8 => f.write_str("u8"),
            Type::U16 => f.write_str("u16"),
            Type::U32 => f.write_str("u32"),
            Type::U64 => f.write_str("u64"),
            Type::S8 => f.write_str("s8"),
            Type::S16 => f.write_str("s16"),
            Type::S32 => f.write_str("s32"),
            Type::S64 => f.write_str("s64"),
            Type::F32 => f.write_str("f32"),
            Type::F64 => f.write_str("f64"),
            Type::Char => f.write_str("char"),
            Type::String => f.write_str("string"),
            Type::List(inner) => write!(f, "list<{inner}>"),
            Type::Option(inner) => write!(f, "option<{inner}>"),
            Type::Named(name) => f.write_str(name),
            Type::Custom(kind) => f.write_str(kind),
            Type::Value => f.write_str("value"),
        }
    }
}

// ============================================================================
// Format - Per-member formatting hints
// ============================================================================

/// Horizontal alignment of a value inside its fixed-width slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Align {
    Left,
    Right,
}

/// Formatting hints attached to a member.
///
/// Hints are carried verbatim into the metaclass; they are interpreted only
/// by the payload mappers. `None` means "measure from the value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Format {
    /// Fixed slot width, in characters.
    pub size: Option<u32>,
    /// Fixed number of occurrence slots for a repeated member.
    pub max_occurs: Option<u32>,
    /// Alignment override.
    pub align: Option<Align>,
}

impl Format {
    pub fn sized(size: u32) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn with_max_occurs(mut self, max_occurs: u32) -> Self {
        self.max_occurs = Some(max_occurs);
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// TypeDef - Type Definitions
// ============================================================================

/// A type definition (named type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TypeDef {
    /// Type alias: `type foo = bar`
    Alias { name: String, ty: Type },

    /// Record type: `record foo { field: type, ... }`
    Record { name: String, fields: Vec<Field> },
}

impl TypeDef {
    /// Get the name of this type definition.
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Alias { name, .. } => name,
            TypeDef::Record { name, .. } => name,
        }
    }

    /// Create an alias type definition.
    pub fn alias(name: impl Into<String>, ty: Type) -> Self {
        TypeDef::Alias {
            name: name.into(),
            ty,
        }
    }

    /// Create a record type definition.
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        TypeDef::Record {
            name: name.into(),
            fields,
        }
    }
}

/// A record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: Type,
    /// Formatting hints
    pub format: Format,
    /// Excluded from introspection
    pub skip: bool,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            format: Format::default(),
            skip: false,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// A name was defined twice with different definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryError {
    pub name: String,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type `{}` is already defined differently", self.name)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistryError {}

/// Named type definitions, in definition order.
///
/// Derived descriptors [`claim`](TypeRegistry::claim) their name for the Rust
/// type that owns it. Two distinct Rust types claiming one name is recorded as
/// a conflict and reported by [`check`](TypeRegistry::check) and
/// [`merge`](TypeRegistry::merge).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    defs: Vec<TypeDef>,
    index: HashMap<String, usize>,
    owners: HashMap<String, TypeId>,
    conflicts: Vec<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a type.
    pub fn define(&mut self, def: TypeDef) {
        match self.index.get(def.name()) {
            Some(&slot) => self.defs[slot] = def,
            None => {
                self.index.insert(String::from(def.name()), self.defs.len());
                self.defs.push(def);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.index.get(name).map(|&slot| &self.defs[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.defs.iter()
    }

    /// Claim `name` for the Rust type `owner`.
    ///
    /// Returns `true` when the caller must define `name` now. A name that is
    /// already held by the same owner returns `false`. A name held by another
    /// owner, or defined by hand, is recorded as a conflict.
    pub fn claim(&mut self, name: &str, owner: TypeId) -> bool {
        match self.owners.get(name) {
            Some(held) if *held == owner => false,
            Some(_) => {
                self.conflict(name);
                false
            }
            None if self.contains(name) => {
                self.conflict(name);
                false
            }
            None => {
                self.owners.insert(String::from(name), owner);
                true
            }
        }
    }

    fn conflict(&mut self, name: &str) {
        if !self.conflicts.iter().any(|n| n == name) {
            self.conflicts.push(String::from(name));
        }
    }

    /// Names claimed by more than one owner, in discovery order.
    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }

    /// Fail on the first conflicting claim.
    pub fn check(&self) -> Result<(), RegistryError> {
        match self.conflicts.first() {
            Some(name) => Err(RegistryError { name: name.clone() }),
            None => Ok(()),
        }
    }

    /// Copy every definition of `other` into `self`.
    ///
    /// Identical redefinitions are accepted; a different definition under a
    /// name that already exists, or a conflicting claim inside `other`, is
    /// rejected and nothing is merged.
    pub fn merge(&mut self, other: &TypeRegistry) -> Result<(), RegistryError> {
        other.check()?;
        for def in other.iter() {
            if let Some(existing) = self.get(def.name()) {
                if existing != def {
                    return Err(RegistryError {
                        name: String::from(def.name()),
                    });
                }
            }
        }
        for def in other.iter() {
            if !self.contains(def.name()) {
                self.define(def.clone());
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn person() -> TypeDef {
        TypeDef::record(
            "Person",
            vec![Field::new("name", Type::String), Field::new("age", Type::S64)],
        )
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::S32.to_string(), "s32");
        assert_eq!(Type::list(Type::named("Phone")).to_string(), "list<Phone>");
        assert_eq!(Type::option(Type::String).to_string(), "option<string>");
        assert_eq!(Type::raw_list().to_string(), "list<value>");
        assert_eq!(Type::custom("date").to_string(), "date");
    }

    #[test]
    fn test_innermost() {
        let ty = Type::option(Type::list(Type::named("Phone")));
        assert_eq!(ty.innermost(), &Type::named("Phone"));
        assert_eq!(Type::U8.innermost(), &Type::U8);

        let dates = Type::option(Type::list(Type::String)).with_innermost(Type::custom("date"));
        assert_eq!(dates, Type::option(Type::list(Type::custom("date"))));
    }

    #[test]
    fn test_registry_define_and_get() {
        let mut registry = TypeRegistry::new();
        registry.define(person());
        registry.define(TypeDef::alias("Age", Type::S64));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Person"));
        assert_eq!(registry.get("Age"), Some(&TypeDef::alias("Age", Type::S64)));
        assert!(registry.get("Nope").is_none());
    }

    #[test]
    fn test_registry_redefine_keeps_order() {
        let mut registry = TypeRegistry::new();
        registry.define(TypeDef::record("A", vec![]));
        registry.define(TypeDef::record("B", vec![]));
        registry.define(TypeDef::record("A", vec![Field::new("x", Type::U8)]));

        let names: Vec<&str> = registry.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_registry_merge_conflict() {
        let mut left = TypeRegistry::new();
        left.define(person());

        let mut same = TypeRegistry::new();
        same.define(person());
        assert!(left.merge(&same).is_ok());

        let mut other = TypeRegistry::new();
        other.define(TypeDef::record("Person", vec![Field::new("id", Type::U32)]));
        other.define(TypeDef::alias("Id", Type::U32));
        let err = left.merge(&other).unwrap_err();
        assert_eq!(err.name, "Person");
        assert!(!left.contains("Id"));
    }

    #[test]
    fn test_registry_claims() {
        struct Mine;
        struct Theirs;

        let mut registry = TypeRegistry::new();
        assert!(registry.claim("Phone", TypeId::of::<Mine>()));
        registry.define(TypeDef::record("Phone", vec![Field::new("number", Type::String)]));
        assert!(!registry.claim("Phone", TypeId::of::<Mine>()));
        assert!(registry.check().is_ok());

        assert!(!registry.claim("Phone", TypeId::of::<Theirs>()));
        assert_eq!(registry.conflicts(), ["Phone".to_string()]);

        registry.define(TypeDef::alias("Id", Type::U32));
        assert!(!registry.claim("Id", TypeId::of::<Mine>()));
        assert_eq!(registry.conflicts().len(), 2);

        let err = TypeRegistry::new().merge(&registry).unwrap_err();
        assert_eq!(err.name, "Phone");
    }

    #[test]
    fn test_format_builders() {
        let format = Format::sized(10).with_max_occurs(3).with_align(Align::Right);
        assert_eq!(format.size, Some(10));
        assert_eq!(format.max_occurs, Some(3));
        assert_eq!(format.align, Some(Align::Right));
        assert!(Format::default().is_default());
        assert!(!format.is_default());
    }

    #[test]
    fn test_field_skipped() {
        let field = Field::new("cache", Type::String).skipped();
        assert!(field.skip);
        assert!(field.format.is_default());
    }
}
