use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CACHE_DIR_ENV: &str = "YOINK_CACHE_DIR";
pub const VERBOSE_ENV: &str = "YOINK_VERBOSE";
pub const LOCK_TIMEOUT_ENV: &str = "YOINK_LOCK_TIMEOUT";

const DEFAULT_CACHE_ROOT: &str = "/tmp/yoink";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(
            self.vars.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug)]
pub struct Config {
    pub(crate) cache: CacheConfig,
    pub(crate) verbose: bool,
}

impl Config {
    /// # Errors
    /// Returns an error if the cache root cannot be made absolute.
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let root = match snapshot.var(CACHE_DIR_ENV).map(str::trim) {
            Some(value) if !value.is_empty() => absolutize(PathBuf::from(value))?,
            _ => PathBuf::from(DEFAULT_CACHE_ROOT),
        };
        let lock_timeout = snapshot
            .var(LOCK_TIMEOUT_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map_or(DEFAULT_LOCK_TIMEOUT, Duration::from_secs);
        Ok(Self {
            cache: CacheConfig {
                root,
                lock_timeout,
            },
            verbose: snapshot.flag_is_enabled(VERBOSE_ENV),
        })
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Whether `YOINK_VERBOSE` asked for backend output to be echoed.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub lock_timeout: Duration,
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = env::current_dir().context("unable to determine the current directory")?;
    Ok(join_relative(&cwd, &path))
}

fn join_relative(base: &Path, path: &Path) -> PathBuf {
    base.join(path.strip_prefix(".").unwrap_or(path))
}
