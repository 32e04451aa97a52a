//! Engine configuration.
//!
//! Precedence, highest first: explicit values (CLI flags), environment
//! (`JSON_SHAPE_CACHE_DIR`, `JSON_SHAPE_STRICT`), built-in defaults.
use std::path::{Path, PathBuf};

use crate::materialize::Mode;

pub const CACHE_DIR_ENV: &str = "JSON_SHAPE_CACHE_DIR";
pub const STRICT_ENV: &str = "JSON_SHAPE_STRICT";
const DEFAULT_CACHE_SUBDIR: &str = ".json-shape/caches";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one `*.cache` file per call-site identity.
    pub root: PathBuf,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `explicit` > `$JSON_SHAPE_CACHE_DIR` > `$HOME/.json-shape/caches` > `./.json-shape/caches`
    pub fn resolve(explicit: Option<&Path>) -> Self {
        Self::resolve_with(explicit, |key| std::env::var_os(key).map(PathBuf::from))
    }

    fn resolve_with(explicit: Option<&Path>, env: impl Fn(&str) -> Option<PathBuf>) -> Self {
        if let Some(root) = explicit {
            return Self::new(root);
        }
        if let Some(root) = env(CACHE_DIR_ENV).filter(|p| !p.as_os_str().is_empty()) {
            return Self::new(root);
        }
        match env("HOME").filter(|p| !p.as_os_str().is_empty()) {
            Some(home) => Self::new(home.join(DEFAULT_CACHE_SUBDIR)),
            None => Self::new(PathBuf::from(".").join(DEFAULT_CACHE_SUBDIR)),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::resolve(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: Mode,
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Environment-derived configuration; `strict` and `cache_dir` override it.
    pub fn resolve(strict: Option<bool>, cache_dir: Option<&Path>) -> Self {
        let strict = strict.unwrap_or_else(|| std::env::var(STRICT_ENV).is_ok_and(|v| is_truthy(&v)));
        Self {
            mode: if strict { Mode::Strict } else { Mode::Lenient },
            cache: CacheConfig::resolve(cache_dir),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::resolve(None, None)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cache_root_precedence() {
        let env = |key: &str| match key {
            CACHE_DIR_ENV => Some(PathBuf::from("/tmp/env-cache")),
            "HOME" => Some(PathBuf::from("/home/u")),
            _ => None,
        };
        assert_eq!(CacheConfig::resolve_with(Some(Path::new("/x")), env).root, PathBuf::from("/x"));
        assert_eq!(CacheConfig::resolve_with(None, env).root, PathBuf::from("/tmp/env-cache"));

        let home_only = |key: &str| (key == "HOME").then(|| PathBuf::from("/home/u"));
        assert_eq!(
            CacheConfig::resolve_with(None, home_only).root,
            PathBuf::from("/home/u/.json-shape/caches")
        );
        assert_eq!(
            CacheConfig::resolve_with(None, |_| None).root,
            PathBuf::from("./.json-shape/caches")
        );
    }

    #[test]
    fn explicit_mode_wins() {
        assert_eq!(EngineConfig::resolve(Some(true), Some(Path::new("/c"))).mode, Mode::Strict);
        assert_eq!(EngineConfig::resolve(Some(false), None).mode, Mode::Lenient);
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("0"));
    }
}
