//! Lexical scopes and the declaration lookup capability.
//!
//! The engine never reads program text. A front end supplies a [`Lookup`]
//! that answers "what is declared under this exact name in this exact
//! scope"; walking outward through enclosing scopes is the resolver's job.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::{DeclKey, Provenance};
use crate::syntax::TypeExpr;

// ————————————————————————————————————————————————————————————————————————————
// SCOPE
// ————————————————————————————————————————————————————————————————————————————

/// A dotted scope path, outermost first: `module.Record.operation.block`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(text: &str) -> Self {
        Self(
            text.split('.')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn join(&self, other: &Scope) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Innermost segment name, e.g. the operation or record this scope is the body of.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// This scope followed by every enclosing scope, ending at the root.
    pub fn chain(&self) -> impl Iterator<Item = Scope> + '_ {
        (0..=self.0.len()).rev().map(|n| Self(self.0[..n].to_vec()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({self})")
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.to_string()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// A record type with ordered, annotated fields.
    Record {
        fields: Vec<(String, TypeExpr)>,
        provenance: Provenance,
    },
    /// `Name = <annotation>` at some scope.
    Alias {
        target: TypeExpr,
        provenance: Provenance,
    },
    /// An annotated variable, e.g. `x: List[int]` or `self.items: Dict[str, Item]`.
    Variable { annotation: TypeExpr },
    /// An operation, with its declared return annotation if any.
    Operation { returns: Option<TypeExpr> },
}

impl Declaration {
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeExpr)>,
        S: Into<String>,
    {
        Self::Record {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            provenance: Provenance::default(),
        }
    }

    pub fn alias(target: TypeExpr) -> Self {
        Self::Alias { target, provenance: Provenance::default() }
    }

    pub fn variable(annotation: TypeExpr) -> Self {
        Self::Variable { annotation }
    }

    pub fn operation(returns: Option<TypeExpr>) -> Self {
        Self::Operation { returns }
    }

    pub fn with_provenance(mut self, value: Provenance) -> Self {
        match &mut self {
            Self::Record { provenance, .. } | Self::Alias { provenance, .. } => *provenance = value,
            Self::Variable { .. } | Self::Operation { .. } => {}
        }
        self
    }

    pub fn is_type(&self) -> bool {
        matches!(self, Self::Record { .. } | Self::Alias { .. })
    }
}

/// `lookup(name, scope) -> Option<Declaration>` over program text.
pub trait Lookup {
    fn lookup(&self, name: &str, scope: &Scope) -> Option<Declaration>;
}

impl<L: Lookup + ?Sized> Lookup for &L {
    fn lookup(&self, name: &str, scope: &Scope) -> Option<Declaration> {
        (**self).lookup(name, scope)
    }
}

impl<L: Lookup + ?Sized> Lookup for Arc<L> {
    fn lookup(&self, name: &str, scope: &Scope) -> Option<Declaration> {
        (**self).lookup(name, scope)
    }
}

/// In-memory [`Lookup`] keyed by exact `(name, scope)`.
#[derive(Debug, Clone, Default)]
pub struct DeclarationTable {
    entries: HashMap<DeclKey, Declaration>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, scope: &str, name: &str, declaration: Declaration) -> &mut Self {
        self.insert(DeclKey::new(name, Scope::parse(scope)), declaration);
        self
    }

    /// Returns the declaration previously registered under `key`, if any.
    pub fn insert(&mut self, key: DeclKey, declaration: Declaration) -> Option<Declaration> {
        self.entries.insert(key, declaration)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Lookup for DeclarationTable {
    fn lookup(&self, name: &str, scope: &Scope) -> Option<Declaration> {
        self.entries.get(&DeclKey::new(name, scope.clone())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chain_walks_outward_to_root() {
        let chain = Scope::parse("shop.Cart.total")
            .chain()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        assert_eq!(chain, vec!["shop.Cart.total", "shop.Cart", "shop", ""]);
    }

    #[test]
    fn parse_ignores_empty_segments() {
        assert_eq!(Scope::parse(" a..b. "), Scope::root().child("a").child("b"));
        assert!(Scope::parse("").is_root());
        assert_eq!(Scope::parse("a.b").parent(), Some(Scope::parse("a")));
        assert_eq!(Scope::root().parent(), None);
    }

    #[test]
    fn table_lookup_is_exact() {
        let mut table = DeclarationTable::new();
        table.declare("shop", "Price", Declaration::alias(TypeExpr::name("float")));
        assert!(table.lookup("Price", &Scope::parse("shop")).is_some());
        assert!(table.lookup("Price", &Scope::parse("shop.Cart")).is_none());
        assert_eq!(table.len(), 1);
    }
}
