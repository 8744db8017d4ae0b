//! Metaclass: canonical shape descriptions
//!
//! A [`Metaclass`] is what the reader produces and what the factory consumes.
//! It is independent of any wire format and of the Rust type it came from;
//! only the structure remains:
//!
//! - **name** - the member name (the type name for a root)
//! - **element** - the per-item type (list and option wrappers stripped)
//! - **cardinality** and **optional** - how the item is wrapped
//! - **format** - formatting hints carried through from the type descriptor
//! - **shape** - a leaf kind, or the ordered member metaclasses of a record
//! - **skipped** - names of record fields a skip strategy left out
//!
//! Two reads of the same type yield equal metaclasses, so a metaclass (or its
//! [`Fingerprint`]) can key caches.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shapr_abi::{Align, Format, Type};

// ============================================================================
// Leaf kinds
// ============================================================================

/// Kind of a leaf member; selects the codec used to render it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafKind {
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
    /// Extension kind resolved through a registered codec.
    Custom(String),
}

const BUILTIN_KINDS: [(&str, LeafKind); 13] = [
    ("bool", LeafKind::Bool),
    ("u8", LeafKind::U8),
    ("u16", LeafKind::U16),
    ("u32", LeafKind::U32),
    ("u64", LeafKind::U64),
    ("s8", LeafKind::S8),
    ("s16", LeafKind::S16),
    ("s32", LeafKind::S32),
    ("s64", LeafKind::S64),
    ("f32", LeafKind::F32),
    ("f64", LeafKind::F64),
    ("char", LeafKind::Char),
    ("string", LeafKind::String),
];

impl LeafKind {
    /// The name used in headers and error messages.
    pub fn name(&self) -> &str {
        match self {
            LeafKind::Custom(kind) => kind,
            builtin => BUILTIN_KINDS
                .iter()
                .find(|(_, kind)| kind == builtin)
                .map(|(name, _)| *name)
                .unwrap_or_default(),
        }
    }

    /// Parse a kind name; anything that is not built in is a custom kind.
    pub fn from_name(name: &str) -> LeafKind {
        BUILTIN_KINDS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| LeafKind::Custom(name.to_string()))
    }

    pub fn is_builtin_name(name: &str) -> bool {
        BUILTIN_KINDS.iter().any(|(builtin, _)| *builtin == name)
    }

    /// The leaf kind of a primitive or custom type.
    pub fn from_type(ty: &Type) -> Option<LeafKind> {
        Some(match ty {
            Type::Bool => LeafKind::Bool,
            Type::U8 => LeafKind::U8,
            Type::U16 => LeafKind::U16,
            Type::U32 => LeafKind::U32,
            Type::U64 => LeafKind::U64,
            Type::S8 => LeafKind::S8,
            Type::S16 => LeafKind::S16,
            Type::S32 => LeafKind::S32,
            Type::S64 => LeafKind::S64,
            Type::F32 => LeafKind::F32,
            Type::F64 => LeafKind::F64,
            Type::Char => LeafKind::Char,
            Type::String => LeafKind::String,
            Type::Custom(kind) => LeafKind::Custom(kind.clone()),
            _ => return None,
        })
    }

    pub fn to_type(&self) -> Type {
        match self {
            LeafKind::Bool => Type::Bool,
            LeafKind::U8 => Type::U8,
            LeafKind::U16 => Type::U16,
            LeafKind::U32 => Type::U32,
            LeafKind::U64 => Type::U64,
            LeafKind::S8 => Type::S8,
            LeafKind::S16 => Type::S16,
            LeafKind::S32 => Type::S32,
            LeafKind::S64 => Type::S64,
            LeafKind::F32 => Type::F32,
            LeafKind::F64 => Type::F64,
            LeafKind::Char => Type::Char,
            LeafKind::String => Type::String,
            LeafKind::Custom(kind) => Type::Custom(kind.clone()),
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Metaclass
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    Repeated,
}

/// What a metaclass describes once wrappers are removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Structure {
    Leaf(LeafKind),
    /// Member metaclasses in declared order.
    Record(Vec<Metaclass>),
}

/// Canonical, immutable description of a structural type or member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metaclass {
    name: String,
    element: Type,
    cardinality: Cardinality,
    optional: bool,
    format: Format,
    shape: Structure,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<String>,
}

impl Metaclass {
    pub(crate) fn from_parts(
        name: String,
        element: Type,
        cardinality: Cardinality,
        optional: bool,
        format: Format,
        shape: Structure,
    ) -> Self {
        Self {
            name,
            element,
            cardinality,
            optional,
            format,
            shape,
            skipped: Vec::new(),
        }
    }

    /// A single, required leaf.
    pub fn leaf(name: impl Into<String>, kind: LeafKind) -> Self {
        Self {
            name: name.into(),
            element: kind.to_type(),
            cardinality: Cardinality::Single,
            optional: false,
            format: Format::default(),
            shape: Structure::Leaf(kind),
            skipped: Vec::new(),
        }
    }

    /// A single, required record of the named type.
    pub fn record(
        name: impl Into<String>,
        type_name: impl Into<String>,
        members: Vec<Metaclass>,
    ) -> Self {
        Self {
            name: name.into(),
            element: Type::named(type_name),
            cardinality: Cardinality::Single,
            optional: false,
            format: Format::default(),
            shape: Structure::Record(members),
            skipped: Vec::new(),
        }
    }

    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Record fields that exist on the type but stay out of the metaclass.
    pub fn with_skipped(mut self, skipped: Vec<String>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The per-item type.
    pub fn element_type(&self) -> &Type {
        &self.element
    }

    /// The full member type, wrappers included.
    pub fn declared(&self) -> Type {
        let mut ty = self.element.clone();
        if self.is_repeated() {
            ty = Type::list(ty);
        }
        if self.optional {
            ty = Type::option(ty);
        }
        ty
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn shape(&self) -> &Structure {
        &self.shape
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_record(&self) -> bool {
        matches!(self.shape, Structure::Record(_))
    }

    pub fn leaf_kind(&self) -> Option<&LeafKind> {
        match &self.shape {
            Structure::Leaf(kind) => Some(kind),
            Structure::Record(_) => None,
        }
    }

    /// Member metaclasses; empty for a leaf.
    pub fn members(&self) -> &[Metaclass] {
        match &self.shape {
            Structure::Record(members) => members,
            Structure::Leaf(_) => &[],
        }
    }

    pub fn member(&self, name: &str) -> Option<&Metaclass> {
        self.members().iter().find(|m| m.name == name)
    }

    /// Names of fields left out by a skip strategy.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s == name)
    }

    /// The single, required view of one item of a repeated member.
    pub fn element(&self) -> Metaclass {
        Metaclass {
            cardinality: Cardinality::Single,
            optional: false,
            format: Format {
                max_occurs: None,
                ..self.format
            },
            ..self.clone()
        }
    }

    /// The same member without the optional wrapper.
    pub fn required(&self) -> Metaclass {
        Metaclass {
            optional: false,
            ..self.clone()
        }
    }

    /// Structural hash of the whole tree.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = MetaHasher::new()
            .string(&self.name)
            .string(&self.element.to_string())
            .tag(match self.cardinality {
                Cardinality::Single => TAG_SINGLE,
                Cardinality::Repeated => TAG_REPEATED,
            })
            .tag(self.optional as u8)
            .format(&self.format);

        hasher = match &self.shape {
            Structure::Leaf(kind) => hasher.tag(TAG_LEAF).string(kind.name()),
            Structure::Record(members) => {
                let mut hasher = hasher.tag(TAG_RECORD).count(members.len());
                for member in members {
                    hasher = hasher.child(&member.fingerprint());
                }
                hasher = hasher.count(self.skipped.len());
                for name in &self.skipped {
                    hasher = hasher.string(name);
                }
                hasher
            }
        };

        hasher.finish()
    }

    /// Indented dump of the tree, one member per line.
    pub fn to_tree(&self) -> String {
        let mut out = String::new();
        self.write_tree(0, &mut out);
        out
    }

    fn write_tree(&self, depth: usize, out: &mut String) {
        use std::fmt::Write;

        let _ = write!(out, "{:indent$}{}", "", self, indent = depth * 2);
        if let Some(size) = self.format.size {
            let _ = write!(out, " size={size}");
        }
        if let Some(max_occurs) = self.format.max_occurs {
            let _ = write!(out, " max_occurs={max_occurs}");
        }
        match self.format.align {
            Some(Align::Left) => out.push_str(" align=left"),
            Some(Align::Right) => out.push_str(" align=right"),
            None => {}
        }
        out.push('\n');

        for member in self.members() {
            member.write_tree(depth + 1, out);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for Metaclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.declared())
    }
}

// ============================================================================
// Fingerprints
// ============================================================================

const TAG_SINGLE: u8 = 0x01;
const TAG_REPEATED: u8 = 0x02;
const TAG_LEAF: u8 = 0x10;
const TAG_RECORD: u8 = 0x11;

/// SHA-256 over a metaclass tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 8 hex characters.
    pub fn to_short_hex(&self) -> String {
        self.0.iter().take(4).map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_short_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

struct MetaHasher {
    hasher: Sha256,
}

impl MetaHasher {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn tag(mut self, tag: u8) -> Self {
        self.hasher.update([tag]);
        self
    }

    fn string(mut self, s: &str) -> Self {
        self.hasher.update((s.len() as u32).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    fn count(mut self, n: usize) -> Self {
        self.hasher.update((n as u32).to_le_bytes());
        self
    }

    fn optional(self, value: Option<u32>) -> Self {
        match value {
            Some(n) => self.tag(1).count(n as usize),
            None => self.tag(0),
        }
    }

    fn format(self, format: &Format) -> Self {
        let align = match format.align {
            None => 0,
            Some(Align::Left) => 1,
            Some(Align::Right) => 2,
        };
        self.optional(format.size)
            .optional(format.max_occurs)
            .tag(align)
    }

    fn child(mut self, fingerprint: &Fingerprint) -> Self {
        self.hasher.update(fingerprint.as_bytes());
        self
    }

    fn finish(self) -> Fingerprint {
        let result = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Fingerprint(bytes)
    }
}
