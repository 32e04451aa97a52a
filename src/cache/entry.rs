//! On-disk cache entry format.
//!
//! ```text
//! <dependency-path>:<sha256-hex>
//! ...
//! ---
//! <artifact text>
//! ```
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::CacheError;

const SEPARATOR: &str = "---";

/// A compiled artifact and the content hashes it was compiled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub dependencies: BTreeMap<PathBuf, String>,
    pub artifact: String,
}

impl CacheEntry {
    pub fn new(artifact: impl Into<String>, dependencies: BTreeMap<PathBuf, String>) -> Self {
        Self { dependencies, artifact: artifact.into() }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.artifact.len() + 96 * self.dependencies.len() + 4);
        for (path, hash) in &self.dependencies {
            let _ = writeln!(out, "{}:{hash}", path.display());
        }
        out.push_str(SEPARATOR);
        out.push('\n');
        out.push_str(&self.artifact);
        out
    }

    /// Parse the text of the cache file at `origin` (used in errors only).
    pub fn parse(text: &str, origin: &Path) -> Result<Self, CacheError> {
        let corrupt = |reason: String| CacheError::Corrupt { path: origin.to_path_buf(), reason };

        let mut dependencies = BTreeMap::new();
        let mut rest = text;
        loop {
            let (line, tail) = match rest.split_once('\n') {
                Some((line, tail)) => (line.trim_end_matches('\r'), tail),
                None => (rest.trim_end_matches('\r'), ""),
            };
            if line == SEPARATOR {
                return Ok(Self { dependencies, artifact: tail.to_string() });
            }
            if rest.is_empty() {
                return Err(corrupt(format!("missing `{SEPARATOR}` separator")));
            }
            // the path may itself contain ':'; the hash never does
            let Some((path, hash)) = line.rsplit_once(':') else {
                return Err(corrupt(format!("dependency line without a hash: {line:?}")));
            };
            if path.is_empty() || !is_sha256_hex(hash) {
                return Err(corrupt(format!("malformed dependency line: {line:?}")));
            }
            dependencies.insert(PathBuf::from(path), hash.to_string());
            rest = tail;
        }
    }
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hash(c: char) -> String {
        std::iter::repeat_n(c, 64).collect()
    }

    #[test]
    fn render_then_parse() {
        let mut deps = BTreeMap::new();
        deps.insert(PathBuf::from("C:/work/app.py"), hash('a'));
        deps.insert(PathBuf::from("models/point.py"), hash('b'));
        let entry = CacheEntry::new("{\n  \"type\": \"string\"\n}\n---\nnot a separator", deps);

        let text = entry.render();
        assert!(text.starts_with(&format!("C:/work/app.py:{}\nmodels/point.py:{}\n---\n", hash('a'), hash('b'))));
        assert_eq!(CacheEntry::parse(&text, Path::new("x.cache")).unwrap(), entry);
    }

    #[test]
    fn no_dependencies() {
        let entry = CacheEntry::parse("---\nartifact", Path::new("x.cache")).unwrap();
        assert!(entry.dependencies.is_empty());
        assert_eq!(entry.artifact, "artifact");
    }

    #[test]
    fn corrupt_files_are_reported() {
        for text in ["", "a.py:abc\n---\n", "a.py\n---\n", format!("a.py:{}\n", hash('c')).as_str()] {
            let err = CacheEntry::parse(text, Path::new("x.cache")).unwrap_err();
            assert!(matches!(err, CacheError::Corrupt { .. }), "{text:?}: {err}");
        }
    }
}
