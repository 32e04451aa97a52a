//! Declaration program files.
//!
//! A small JSON front end standing in for real program text, so the engine
//! can be driven from the command line and from tests:
//!
//! ```json
//! {
//!   "declarations": [
//!     { "kind": "record", "scope": "shop", "name": "Item",
//!       "fields": { "sku": "str", "price": "Price" } },
//!     { "kind": "alias", "scope": "shop", "name": "Price", "target": "float" },
//!     { "kind": "variable", "scope": "shop.main", "name": "items", "annotation": "List[Item]" },
//!     { "kind": "operation", "scope": "shop", "name": "pick", "returns": "Item" }
//!   ]
//! }
//! ```
//!
//! Records and aliases without an explicit `origin` are attributed to the
//! program file itself, so editing it invalidates cached artifacts.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::path_de::{self, PathError};
use crate::schema::{DeclKey, Provenance};
use crate::scope::{Declaration, DeclarationTable, Scope};
use crate::syntax::TypeExpr;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid program {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: PathError,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Program {
    #[serde(default)]
    pub declarations: Vec<DeclarationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeclarationSpec {
    Record {
        #[serde(default)]
        scope: Scope,
        name: String,
        fields: IndexMap<String, TypeExpr>,
        #[serde(default)]
        origin: Option<PathBuf>,
        #[serde(default)]
        source: Option<String>,
    },
    Alias {
        #[serde(default)]
        scope: Scope,
        name: String,
        target: TypeExpr,
        #[serde(default)]
        origin: Option<PathBuf>,
        #[serde(default)]
        source: Option<String>,
    },
    Variable {
        #[serde(default)]
        scope: Scope,
        name: String,
        annotation: TypeExpr,
    },
    Operation {
        #[serde(default)]
        scope: Scope,
        name: String,
        #[serde(default)]
        returns: Option<TypeExpr>,
    },
}

impl Program {
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ProgramError> {
        path_de::from_str_with_path(text).map_err(|source| ProgramError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ProgramError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProgramError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Build a lookup table; `default_origin` is recorded for named types
    /// that don't carry their own.
    pub fn to_table(&self, default_origin: Option<&Path>) -> DeclarationTable {
        let provenance = |origin: &Option<PathBuf>, source: &Option<String>| Provenance {
            origin: origin.clone().or_else(|| default_origin.map(Path::to_path_buf)),
            source: source.clone(),
        };

        let mut table = DeclarationTable::new();
        for spec in &self.declarations {
            let (scope, name, declaration) = match spec {
                DeclarationSpec::Record { scope, name, fields, origin, source } => (
                    scope,
                    name,
                    Declaration::record(fields.iter().map(|(k, v)| (k.clone(), v.clone())))
                        .with_provenance(provenance(origin, source)),
                ),
                DeclarationSpec::Alias { scope, name, target, origin, source } => (
                    scope,
                    name,
                    Declaration::alias(target.clone()).with_provenance(provenance(origin, source)),
                ),
                DeclarationSpec::Variable { scope, name, annotation } => {
                    (scope, name, Declaration::variable(annotation.clone()))
                }
                DeclarationSpec::Operation { scope, name, returns } => {
                    (scope, name, Declaration::operation(returns.clone()))
                }
            };
            if table.insert(DeclKey::new(name.as_str(), scope.clone()), declaration).is_some() {
                warn!(%name, %scope, "duplicate declaration; the later one wins");
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Lookup;
    use pretty_assertions::assert_eq;

    const SHOP: &str = r#"{
        "declarations": [
            { "kind": "record", "scope": "shop", "name": "Item",
              "fields": { "sku": "str", "price": "Price" },
              "source": "class Item:\n    sku: str\n    price: Price" },
            { "kind": "alias", "scope": "shop", "name": "Price", "target": "float", "origin": "shop/types.py" },
            { "kind": "variable", "scope": "shop.main", "name": "items", "annotation": "List[Item]" },
            { "kind": "operation", "scope": "shop", "name": "pick" }
        ]
    }"#;

    #[test]
    fn program_builds_a_table() {
        let program = Program::parse(SHOP, Path::new("shop.json")).unwrap();
        let table = program.to_table(Some(Path::new("shop.json")));
        assert_eq!(table.len(), 4);

        let Some(Declaration::Record { fields, provenance }) = table.lookup("Item", &Scope::parse("shop")) else {
            panic!("Item should be a record");
        };
        assert_eq!(fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["sku", "price"]);
        assert_eq!(provenance.origin, Some(PathBuf::from("shop.json")));

        let Some(Declaration::Alias { provenance, .. }) = table.lookup("Price", &Scope::parse("shop")) else {
            panic!("Price should be an alias");
        };
        assert_eq!(provenance.origin, Some(PathBuf::from("shop/types.py")));
        assert_eq!(table.lookup("pick", &Scope::parse("shop")), Some(Declaration::operation(None)));
    }

    #[test]
    fn bad_annotation_names_its_location() {
        let text = r#"{ "declarations": [
            { "kind": "variable", "name": "x", "annotation": "int" },
            { "kind": "variable", "name": "y", "annotation": "List[int" }
        ] }"#;
        let err = Program::parse(text, Path::new("p.json")).unwrap_err();
        let ProgramError::Parse { source, .. } = &err else { panic!("{err}") };
        assert!(source.path.starts_with("declarations[1]"), "{}", source.path);
    }
}
