//! Call-site identity and the syntactic locus of an invocation.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scope::Scope;
use crate::syntax::{SyntaxError, TypeExpr};

const SEP_ESCAPE: &str = "__SEP__";
pub const CACHE_EXTENSION: &str = "cache";

/// `(artifact path, line, operation name)`. Evaluating the same site against
/// changed source is a different identity only through the cache's content
/// hashes, never through mutation of an existing schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteIdentity {
    pub path: PathBuf,
    pub line: u32,
    pub operation: String,
}

impl CallSiteIdentity {
    pub fn new(path: impl Into<PathBuf>, line: u32, operation: impl Into<String>) -> Self {
        Self { path: path.into(), line, operation: operation.into() }
    }

    /// `a/b.ext` line 42 `opName` → `a__SEP__b.ext#42#opName.cache`
    pub fn to_cache_filename(&self) -> String {
        let path = self.path.to_string_lossy().replace(['/', '\\'], SEP_ESCAPE);
        format!("{path}#{}#{}.{CACHE_EXTENSION}", self.line, self.operation)
    }

    pub fn from_cache_filename(filename: &str) -> Option<Self> {
        let stem = filename.strip_suffix(&format!(".{CACHE_EXTENSION}"))?;
        let mut parts = stem.rsplitn(3, '#');
        let operation = parts.next()?;
        let line = parts.next()?.parse().ok()?;
        let path = parts.next()?.replace(SEP_ESCAPE, "/");
        if path.is_empty() || operation.is_empty() {
            return None;
        }
        Some(Self::new(path, line, operation))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for CallSiteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallSiteParseError {
    #[error("call site `{0}` must look like `path:line:operation`")]
    Identity(String),
    #[error("unknown locus `{0}` (expected condition, while, return, assign:NAME, destructure:N or explicit:TYPE)")]
    Locus(String),
    #[error(transparent)]
    Annotation(#[from] SyntaxError),
}

impl FromStr for CallSiteIdentity {
    type Err = CallSiteParseError;

    // split from the right; the path may itself contain ':'
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || CallSiteParseError::Identity(s.to_string());
        let mut parts = s.rsplitn(3, ':');
        let operation = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        let line = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(err)?;
        Ok(Self::new(path, line, operation))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// LOCUS
// ————————————————————————————————————————————————————————————————————————————

/// Where in the surrounding code the invocation sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locus {
    /// `if <invocation>:`, always a bool.
    Condition,
    /// `while <invocation>:`, always a bool.
    While,
    /// `return <invocation>`: the enclosing operation's declared return.
    Return,
    /// `x = <invocation>` or `self.x = <invocation>`: the target's declaration.
    Assign { target: String },
    /// `a, b, c = <invocation>`: one untyped slot per name.
    Destructure { arity: usize },
    /// An explicit schema argument; bypasses all search.
    Explicit(TypeExpr),
}

impl FromStr for Locus {
    type Err = CallSiteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, rest) = match s.split_once(':') {
            Some((h, r)) => (h.trim(), Some(r.trim())),
            None => (s, None),
        };
        match (head, rest) {
            ("condition" | "if", None) => Ok(Locus::Condition),
            ("while", None) => Ok(Locus::While),
            ("return", None) => Ok(Locus::Return),
            ("assign", Some(target)) if !target.is_empty() => {
                Ok(Locus::Assign { target: target.to_string() })
            }
            ("destructure", Some(n)) => n
                .parse()
                .map(|arity| Locus::Destructure { arity })
                .map_err(|_| CallSiteParseError::Locus(s.to_string())),
            ("explicit", Some(ty)) => Ok(Locus::Explicit(TypeExpr::parse(ty)?)),
            _ => Err(CallSiteParseError::Locus(s.to_string())),
        }
    }
}

/// Everything the resolver needs to know about one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub identity: CallSiteIdentity,
    /// Innermost lexical scope containing the invocation.
    pub scope: Scope,
    pub locus: Locus,
}

impl CallSite {
    pub fn new(identity: CallSiteIdentity, scope: Scope, locus: Locus) -> Self {
        Self { identity, scope, locus }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cache_filename_round_trips() {
        let id = CallSiteIdentity::new("a/b.ext", 42, "opName");
        assert_eq!(id.to_cache_filename(), "a__SEP__b.ext#42#opName.cache");
        assert_eq!(CallSiteIdentity::from_cache_filename("a__SEP__b.ext#42#opName.cache"), Some(id));
        assert_eq!(CallSiteIdentity::from_cache_filename("a__SEP__b.ext#x#op.cache"), None);
        assert_eq!(CallSiteIdentity::from_cache_filename("notes.txt"), None);
    }

    #[test]
    fn identity_parses_from_the_right() {
        let id: CallSiteIdentity = "C:/work/app.py:17:reason".parse().unwrap();
        assert_eq!(id, CallSiteIdentity::new("C:/work/app.py", 17, "reason"));
        assert!("app.py:reason".parse::<CallSiteIdentity>().is_err());
    }

    #[test]
    fn locus_text() {
        assert_eq!("if".parse::<Locus>().unwrap(), Locus::Condition);
        assert_eq!(
            "assign: self.items".parse::<Locus>().unwrap(),
            Locus::Assign { target: "self.items".into() }
        );
        assert_eq!("destructure:3".parse::<Locus>().unwrap(), Locus::Destructure { arity: 3 });
        assert_eq!(
            "explicit:List[int]".parse::<Locus>().unwrap(),
            Locus::Explicit(TypeExpr::generic("List", vec![TypeExpr::name("int")]))
        );
        assert!("assign".parse::<Locus>().is_err());
        assert!("explicit:List[".parse::<Locus>().is_err());
    }
}
