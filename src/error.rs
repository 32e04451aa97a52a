//! Error taxonomy.
//!
//! Resolution errors are fatal to one call-site build. Conversion errors are
//! recoverable upstream: their `Display` text is written to be replayed to the
//! generator verbatim as corrective feedback.
use std::path::PathBuf;

use thiserror::Error;

use crate::scope::Scope;

// ————————————————————————————————————————————————————————————————————————————
// RESOLUTION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// No declaration reachable from `scope` matches `name`.
    #[error("cannot resolve `{name}` from scope `{scope}`")]
    Unresolved { name: String, scope: Scope },

    /// The annotation is well-formed text but describes a shape we don't support.
    #[error("unsupported annotation `{annotation}`: {reason}")]
    UnsupportedSyntax { annotation: String, reason: String },
}

impl ResolveError {
    pub(crate) fn unresolved(name: impl Into<String>, scope: &Scope) -> Self {
        Self::Unresolved { name: name.into(), scope: scope.clone() }
    }

    pub(crate) fn unsupported(annotation: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnsupportedSyntax {
            annotation: annotation.to_string(),
            reason: reason.into(),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MATERIALIZATION
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("{path} expected to be {expected}, but got {found}")]
    KindMismatch { path: String, expected: String, found: String },

    #[error("{path} expected to have {expected} items, but got {found} items")]
    Arity { path: String, expected: usize, found: usize },

    #[error("{path} expected to have field `{field}`, but it's missing")]
    MissingField { path: String, field: String },

    #[error("{path} expected to be one of {allowed}, but got {found}")]
    LiteralMismatch { path: String, allowed: String, found: String },

    /// Untagged union payload matched zero or several branches.
    #[error("{path} is ambiguous for {union}: {detail}")]
    AmbiguousUnion { path: String, union: String, detail: String },

    /// Tagged envelope named a branch that is not a member of the union.
    #[error("{path} has invalid branch tag `{tag}`, expected one of {expected}")]
    UnknownBranch { path: String, tag: String, expected: String },
}

impl ConversionError {
    /// The locator of the offending value (`root.items[2].name`).
    pub fn path(&self) -> &str {
        match self {
            Self::KindMismatch { path, .. }
            | Self::Arity { path, .. }
            | Self::MissingField { path, .. }
            | Self::LiteralMismatch { path, .. }
            | Self::AmbiguousUnion { path, .. }
            | Self::UnknownBranch { path, .. } => path,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// WIRE TEXT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error)]
pub enum WireError {
    /// Raw generator text could not be parsed even after repair. Carries the
    /// error of the first, unrepaired parse.
    #[error("malformed wire value: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

// ————————————————————————————————————————————————————————————————————————————
// CACHE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid cache pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
