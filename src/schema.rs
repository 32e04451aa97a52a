//! Target-shape descriptors.
//!
//! A [`Schema`] is a closed sum over the shapes we can ask a generator for.
//! Records and aliases are the only named nodes and the only nodes that may
//! take part in a cycle; they are shared (`Arc`) and populated exactly once
//! through a `OnceCell`, so a reference created while the node is still being
//! resolved binds to the same node that is eventually completed.
//!
//! After resolution a graph is never mutated again.
pub mod canonical;
pub mod walk;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use ordered_float::OrderedFloat;
use serde_json::Value;

use crate::scope::Scope;

// ————————————————————————————————————————————————————————————————————————————
// LEAVES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Str,
    Int,
    Float,
    Bool,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

/// One allowed value of a `Literal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
}

impl Scalar {
    pub fn to_wire(&self) -> Value {
        match self {
            Scalar::Str(s) => Value::from(s.clone()),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => Value::from(f.0),
            Scalar::Bool(b) => Value::from(*b),
        }
    }

    /// Exact equality against a wire scalar. `Int(1)` matches `1` but not
    /// `1.0`; a `Float` literal compares numerically with any number.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Scalar::Str(a), Value::String(b)) => a == b,
            (Scalar::Bool(a), Value::Bool(b)) => a == b,
            (Scalar::Int(a), Value::Number(n)) => n.as_i64() == Some(*a),
            (Scalar::Float(a), Value::Number(n)) => n.as_f64() == Some(a.0),
            _ => false,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NAMED NODES
// ————————————————————————————————————————————————————————————————————————————

/// Identity of a named declaration: its name and the scope it was declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclKey {
    pub name: String,
    pub scope: Scope,
}

impl DeclKey {
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        Self { name: name.into(), scope }
    }
}

impl fmt::Display for DeclKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_root() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.scope, self.name)
        }
    }
}

/// Where a named declaration came from, for cache invalidation and for
/// showing the generator the declarations it is expected to fill in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub origin: Option<PathBuf>,
    pub source: Option<String>,
}

pub struct RecordDef {
    key: DeclKey,
    provenance: Provenance,
    fields: OnceCell<IndexMap<String, Schema>>,
}

impl RecordDef {
    /// Register a node before its fields are known.
    pub fn placeholder(key: DeclKey, provenance: Provenance) -> Arc<Self> {
        Arc::new(Self { key, provenance, fields: OnceCell::new() })
    }

    /// Populate the fields. Returns `false` if the record was already complete.
    pub fn complete(&self, fields: IndexMap<String, Schema>) -> bool {
        self.fields.set(fields).is_ok()
    }

    pub fn is_complete(&self) -> bool {
        self.fields.get().is_some()
    }

    pub fn key(&self) -> &DeclKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Declared fields in declaration order (empty while still a placeholder).
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.fields
            .get()
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn field(&self, name: &str) -> Option<&Schema> {
        self.fields.get().and_then(|m| m.get(name))
    }

    pub fn field_count(&self) -> usize {
        self.fields.get().map_or(0, IndexMap::len)
    }
}

impl fmt::Debug for RecordDef {
    // field schemas may point back at this record; print names only
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDef")
            .field("key", &self.key)
            .field("fields", &self.fields().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

pub struct AliasDef {
    key: DeclKey,
    provenance: Provenance,
    target: OnceCell<Schema>,
}

impl AliasDef {
    pub fn placeholder(key: DeclKey, provenance: Provenance) -> Arc<Self> {
        Arc::new(Self { key, provenance, target: OnceCell::new() })
    }

    pub fn complete(&self, target: Schema) -> bool {
        self.target.set(target).is_ok()
    }

    pub fn key(&self) -> &DeclKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// `None` only while the alias is still being resolved.
    pub fn target(&self) -> Option<&Schema> {
        self.target.get()
    }
}

impl fmt::Debug for AliasDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasDef").field("key", &self.key).finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub enum Schema {
    Primitive(Primitive),
    List(Box<Schema>),
    Tuple(Vec<Schema>),
    /// Keys are always strings; only the value schema is stored.
    Dict(Box<Schema>),
    Record(Arc<RecordDef>),
    /// Ordered branches with pairwise distinct branch tags.
    Union(Vec<Schema>),
    Literal(Vec<Scalar>),
    Optional(Box<Schema>),
    Alias(Arc<AliasDef>),
    Any,
}

impl Schema {
    pub const STR: Schema = Schema::Primitive(Primitive::Str);
    pub const INT: Schema = Schema::Primitive(Primitive::Int);
    pub const FLOAT: Schema = Schema::Primitive(Primitive::Float);
    pub const BOOL: Schema = Schema::Primitive(Primitive::Bool);

    pub fn list(item: Schema) -> Self {
        Self::List(Box::new(item))
    }

    pub fn dict(value: Schema) -> Self {
        Self::Dict(Box::new(value))
    }

    pub fn optional(inner: Schema) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// Build an already-complete record, for schemas assembled by hand.
    pub fn record<I, S>(name: &str, scope: Scope, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Schema)>,
        S: Into<String>,
    {
        let def = RecordDef::placeholder(DeclKey::new(name, scope), Provenance::default());
        def.complete(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        Self::Record(def)
    }

    /// Build an already-complete alias.
    pub fn alias(name: &str, scope: Scope, target: Schema) -> Self {
        let def = AliasDef::placeholder(DeclKey::new(name, scope), Provenance::default());
        def.complete(target);
        Self::Alias(def)
    }

    /// Follow alias indirections to the first non-alias node. An alias that
    /// is still a placeholder stops the walk.
    ///
    /// Terminates on resolved graphs: an alias cycle that never passes
    /// through a container is rejected during resolution.
    pub fn resolved(&self) -> &Schema {
        let mut current = self;
        while let Schema::Alias(def) = current {
            match def.target() {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.resolved(), Schema::Optional(_))
    }

    /// Canonical text used for diagnostics and as the union branch tag.
    pub fn branch_tag(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Schema::Primitive(a), Schema::Primitive(b)) => a == b,
            (Schema::List(a), Schema::List(b)) => a == b,
            (Schema::Tuple(a), Schema::Tuple(b)) => a == b,
            (Schema::Dict(a), Schema::Dict(b)) => a == b,
            // named nodes compare by identity so cyclic graphs compare in finite time
            (Schema::Record(a), Schema::Record(b)) => a.key == b.key,
            (Schema::Union(a), Schema::Union(b)) => a == b,
            (Schema::Literal(a), Schema::Literal(b)) => a == b,
            (Schema::Optional(a), Schema::Optional(b)) => a == b,
            (Schema::Alias(a), Schema::Alias(b)) => a.key == b.key,
            (Schema::Any, Schema::Any) => true,
            _ => false,
        }
    }
}
