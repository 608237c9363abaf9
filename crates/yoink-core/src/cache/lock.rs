use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::error::YoinkError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock on one cache key, released on drop.
#[derive(Debug)]
pub(crate) struct KeyLock {
    _file: File,
    path: PathBuf,
}

impl KeyLock {
    pub(crate) fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                _file: file,
                path: path.to_path_buf(),
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Polls for the lock until `timeout` has passed.
    pub(crate) fn acquire(path: &Path, timeout: Duration, key: &str) -> Result<Self, YoinkError> {
        let started = Instant::now();
        let mut announced = false;
        loop {
            let attempt = Self::try_acquire(path).map_err(|err| {
                YoinkError::cache_io(format!("failed to lock {}", path.display()), err)
            })?;
            if let Some(lock) = attempt {
                tracing::trace!(lock = %lock.path.display(), "acquired cache lock");
                return Ok(lock);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(YoinkError::CacheLockTimeout {
                    key: key.to_string(),
                    waited,
                });
            }
            if !announced {
                tracing::info!("waiting for another yoink to finish fetching {key}");
                announced = true;
            }
            thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(waited)));
        }
    }
}
