//! On-disk cache of extracted packages.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<backend>/<name>/<version-or-latest>/   extracted tree + .yoink-complete
//! <root>/locks/<backend>/<name>/<version>.lock   per-key advisory locks
//! ```
//!
//! A directory only counts as cached once the completion marker exists;
//! anything else is a leftover from an interrupted fetch and is replaced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;
use yoink_domain::{CacheKey, PackageSpec};

use crate::backend::PackageBackend;
use crate::config::CacheConfig;
use crate::error::YoinkError;
use crate::process::Invoker;

mod lock;

use lock::KeyLock;

pub const COMPLETE_MARKER: &str = ".yoink-complete";
const LOCKS_DIR: &str = "locks";

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub directory: PathBuf,
    pub fetched_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    lock_timeout: Duration,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_root(config.root.clone(), config.lock_timeout)
    }

    pub fn with_root(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(LOCKS_DIR)
            .join(key.backend().dir_name())
            .join(key.name())
            .join(format!("{}.lock", key.version_segment()))
    }

    /// The complete entry for `key`, if one exists.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let directory = self.entry_dir(key);
        if !is_complete(&directory) {
            return None;
        }
        let fetched_at = fs::read_to_string(directory.join(COMPLETE_MARKER))
            .ok()
            .and_then(|text| OffsetDateTime::parse(text.trim(), &Rfc3339).ok());
        Some(CacheEntry {
            key: key.clone(),
            directory,
            fetched_at,
        })
    }

    /// Returns the extraction directory for `spec`, fetching it first when it
    /// is not cached yet.
    ///
    /// At most one process fetches a given key at a time; the others wait on
    /// the key's lock and then find the finished entry.
    ///
    /// # Errors
    /// Propagates the adapter's error after removing the partial directory,
    /// or [`YoinkError::CacheLockTimeout`] when the lock stays contended.
    pub fn get_or_fetch(
        &self,
        spec: &PackageSpec,
        adapter: &dyn PackageBackend,
        invoker: &Invoker,
    ) -> Result<PathBuf, YoinkError> {
        let key = CacheKey::new(adapter.backend(), spec);
        let directory = self.entry_dir(&key);
        if is_complete(&directory) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(directory);
        }

        // Refuse unsupported pins before anything touches the disk.
        adapter.pin_argument(spec)?;

        let _lock = KeyLock::acquire(&self.lock_path(&key), self.lock_timeout, &key.to_string())?;
        if is_complete(&directory) {
            tracing::debug!(key = %key, "fetched by another process while waiting");
            return Ok(directory);
        }

        if fs::symlink_metadata(&directory).is_ok() {
            tracing::debug!(dir = %directory.display(), "removing incomplete cache entry");
            fs::remove_dir_all(&directory).map_err(|err| {
                YoinkError::cache_io(format!("failed to remove {}", directory.display()), err)
            })?;
        }
        fs::create_dir_all(&directory).map_err(|err| {
            YoinkError::cache_io(format!("failed to create {}", directory.display()), err)
        })?;

        let fetched = adapter
            .fetch(spec, &directory, invoker)
            .and_then(|()| write_marker(&directory));
        if let Err(err) = fetched {
            if let Err(cleanup) = fs::remove_dir_all(&directory) {
                tracing::debug!(
                    dir = %directory.display(),
                    error = %cleanup,
                    "failed to clean up after fetch failure"
                );
            }
            return Err(err);
        }
        Ok(directory)
    }

    /// Deletes every cached entry and lock, leaving an empty root behind.
    ///
    /// # Errors
    /// Returns [`YoinkError::CachePurge`] when the root cannot be removed or
    /// recreated.
    pub fn purge(&self) -> Result<usize, YoinkError> {
        let purge_error = |source: io::Error| YoinkError::CachePurge {
            path: self.root.clone(),
            source,
        };
        let removed = self.count_entries();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(purge_error(err)),
        }
        fs::create_dir_all(&self.root).map_err(purge_error)?;
        tracing::debug!(root = %self.root.display(), removed, "purged cache");
        Ok(removed)
    }

    fn count_entries(&self) -> usize {
        let locks = self.root.join(LOCKS_DIR);
        WalkDir::new(&self.root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir() && !entry.path().starts_with(&locks))
            .count()
    }
}

fn is_complete(directory: &Path) -> bool {
    directory.join(COMPLETE_MARKER).is_file()
}

fn write_marker(directory: &Path) -> Result<(), YoinkError> {
    let stamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let marker = directory.join(COMPLETE_MARKER);
    fs::write(&marker, stamp)
        .map_err(|err| YoinkError::cache_io(format!("failed to write {}", marker.display()), err))
}
