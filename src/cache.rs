//! Compilation cache.
//!
//! One file per call-site identity under the cache root, holding the
//! compiled artifact and the SHA-256 of every file it was compiled from.
//! An entry is valid exactly as long as all of those hashes still match;
//! there is no time-based expiry.
//!
//! Writes go to a temporary sibling and are renamed into place, so readers
//! never observe a partial file and the last concurrent writer wins.
pub mod entry;

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::call_site::{CACHE_EXTENSION, CallSiteIdentity};
use crate::config::CacheConfig;
use crate::error::CacheError;

pub use entry::CacheEntry;

/// What a compile step hands back to [`CompilationCache::get_or_compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub artifact: String,
    /// Files whose content the artifact was derived from.
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct CompilationCache {
    root: PathBuf,
    index: Mutex<HashMap<CallSiteIdentity, CacheEntry>>,
    in_flight: Mutex<HashMap<CallSiteIdentity, Arc<Mutex<()>>>>,
}

impl CompilationCache {
    /// Open (creating if needed) the cache directory and load its entries.
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let root = config.root.clone();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;

        let cache = Self {
            root,
            index: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        };
        let loaded = cache.load_all()?;
        info!(root = %cache.root.display(), entries = loaded, "opened compilation cache");
        Ok(cache)
    }

    fn load_all(&self) -> Result<usize, CacheError> {
        let pattern = self.root.join(format!("*.{CACHE_EXTENSION}"));
        let mut index = self.index.lock();
        for path in glob::glob(&pattern.to_string_lossy())?.flatten() {
            let Some(identity) = identity_of(&path) else {
                debug!(path = %path.display(), "skipping file with unrecognized name");
                continue;
            };
            match read_entry(&path) {
                Ok(Some(entry)) => {
                    index.insert(identity, entry);
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "ignoring unreadable cache file"),
            }
        }
        Ok(index.len())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, identity: &CallSiteIdentity) -> PathBuf {
        self.root.join(identity.to_cache_filename())
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached artifact, if every recorded dependency hash still matches
    /// the file on disk. Any mismatch, missing file or corrupt entry is a miss.
    pub fn get(&self, identity: &CallSiteIdentity) -> Option<String> {
        let indexed = self.index.lock().get(identity).cloned();
        let entry = match indexed {
            Some(entry) => entry,
            // another process may have written it since we opened
            None => match read_entry(&self.path_for(identity)) {
                Ok(Some(entry)) => {
                    self.index.lock().insert(identity.clone(), entry.clone());
                    entry
                }
                Ok(None) => {
                    info!(%identity, "cache miss: no entry");
                    return None;
                }
                Err(err) => {
                    warn!(%identity, %err, "cache miss: corrupt entry");
                    return None;
                }
            },
        };

        for (path, recorded) in &entry.dependencies {
            match hash_file(path) {
                Ok(current) if current == *recorded => {}
                Ok(_) => {
                    info!(%identity, dependency = %path.display(), "cache miss: dependency changed");
                    return None;
                }
                Err(err) => {
                    info!(%identity, %err, "cache miss: dependency unreadable");
                    return None;
                }
            }
        }
        info!(%identity, "cache hit");
        Some(entry.artifact)
    }

    /// Persist an artifact atomically and record it in the index.
    pub fn put(
        &self,
        identity: &CallSiteIdentity,
        artifact: &str,
        dependencies: BTreeMap<PathBuf, String>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(artifact, dependencies);
        let path = self.path_for(identity);
        write_atomic(&path, entry.render().as_bytes())?;
        info!(%identity, dependencies = entry.dependencies.len(), "cache saved");
        self.index.lock().insert(identity.clone(), entry);
        Ok(())
    }

    /// Return the valid cached artifact or compile, hash and store a fresh one.
    ///
    /// At most one compilation per identity runs at a time; callers arriving
    /// meanwhile wait for it and then read its result.
    pub fn get_or_compile<F, E>(&self, identity: &CallSiteIdentity, compile: F) -> Result<String, E>
    where
        F: FnOnce() -> Result<Compiled, E>,
        E: From<CacheError>,
    {
        let lock = self.in_flight.lock().entry(identity.clone()).or_default().clone();
        let outcome = {
            let _guard = lock.lock();
            self.compile_locked(identity, compile)
        };

        // last one out drops the identity lock; the map holds one reference, we hold the other.
        // our reference is released under the map lock so the next caller out sees the true count
        let mut in_flight = self.in_flight.lock();
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(identity);
        }
        drop(lock);
        drop(in_flight);
        outcome
    }

    fn compile_locked<F, E>(&self, identity: &CallSiteIdentity, compile: F) -> Result<String, E>
    where
        F: FnOnce() -> Result<Compiled, E>,
        E: From<CacheError>,
    {
        if let Some(artifact) = self.get(identity) {
            return Ok(artifact);
        }
        let Compiled { artifact, dependencies } = compile()?;
        let hashes = hash_dependencies(dependencies)?;
        self.put(identity, &artifact, hashes)?;
        Ok(artifact)
    }

    /// Drop one entry. Returns whether anything was removed.
    pub fn invalidate(&self, identity: &CallSiteIdentity) -> Result<bool, CacheError> {
        let in_index = self.index.lock().remove(identity).is_some();
        let path = self.path_for(identity);
        let on_disk = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(CacheError::io(path, e)),
        };
        Ok(in_index || on_disk)
    }

    /// Remove every cache file under the root. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let pattern = self.root.join(format!("*.{CACHE_EXTENSION}"));
        let mut removed = 0;
        for path in glob::glob(&pattern.to_string_lossy())?.flatten() {
            fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }
        self.index.lock().clear();
        info!(removed, "cache cleared");
        Ok(removed)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// HASHING
// ————————————————————————————————————————————————————————————————————————————

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_file(path: &Path) -> Result<String, CacheError> {
    let bytes = fs::read(path).map_err(|e| CacheError::io(path, e))?;
    Ok(content_hash(&bytes))
}

/// Hash every dependency in parallel.
pub fn hash_dependencies<I>(paths: I) -> Result<BTreeMap<PathBuf, String>, CacheError>
where
    I: IntoIterator<Item = PathBuf>,
{
    let paths = paths.into_iter().collect::<Vec<_>>();
    paths
        .into_par_iter()
        .map(|path| hash_file(&path).map(|hash| (path, hash)))
        .collect::<Result<Vec<_>, _>>()
        .map(|pairs| pairs.into_iter().collect())
}

// ————————————————————————————————————————————————————————————————————————————
// FILES
// ————————————————————————————————————————————————————————————————————————————

fn identity_of(path: &Path) -> Option<CallSiteIdentity> {
    CallSiteIdentity::from_cache_filename(path.file_name()?.to_str()?)
}

/// `Ok(None)` when the file does not exist.
fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    CacheEntry::parse(&text, path).map(Some)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = tmp_write_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(CacheError::io(&tmp, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::io(path, e)
    })
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}
