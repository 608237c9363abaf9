use std::sync::OnceLock;

use anyhow::Result;
use yoink_domain::Backend;

use crate::backend;
use crate::cache::CacheStore;
use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::error::YoinkError;

/// Everything a command needs, assembled once in `main` and passed down by
/// reference.
pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    env: EnvSnapshot,
    config: Config,
    backend: OnceLock<Backend>,
}

impl<'a> CommandContext<'a> {
    /// Creates a new command context from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn new(global: &'a GlobalOptions) -> Result<Self> {
        Self::with_env(global, EnvSnapshot::capture())
    }

    /// # Errors
    /// Returns an error if the configuration cannot be prepared.
    pub fn with_env(global: &'a GlobalOptions, env: EnvSnapshot) -> Result<Self> {
        let config = Config::from_snapshot(&env)?;
        Ok(Self {
            global,
            env,
            config,
            backend: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The environment captured when the context was built.
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    /// Verbose mode: backend subprocess output is echoed and kept verbatim in
    /// error reports.
    pub fn verbose(&self) -> bool {
        self.global.verbose > 0 || self.global.trace || self.config.verbose()
    }

    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(self.config.cache())
    }

    /// The package manager for this invocation, probed on first use against
    /// the `PATH` captured when the context was built.
    ///
    /// # Errors
    /// Returns [`YoinkError::NoSupportedBackend`] when no manager is found.
    pub fn backend(&self) -> Result<Backend, YoinkError> {
        if let Some(backend) = self.backend.get() {
            return Ok(*backend);
        }
        let detected = match self.env.var("PATH") {
            Some(path) => backend::detect_in(path)?,
            None => backend::detect()?,
        };
        let _ = self.backend.set(detected);
        Ok(detected)
    }
}
