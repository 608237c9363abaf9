use std::io;
use std::path::PathBuf;
use std::time::Duration;

use yoink_domain::{Backend, SpecError};

/// Exit code reported for every failure that happens before the target
/// binary starts.
pub const PRE_EXEC_FAILURE_CODE: i32 = 127;

/// Everything that can end an invocation before (or while) the target runs.
///
/// None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum YoinkError {
    #[error("no supported package manager (apt-get, dnf, pacman) found on PATH")]
    NoSupportedBackend,

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    #[error("package `{name}` was not found by {backend}")]
    PackageNotFound {
        name: String,
        backend: Backend,
        diagnostics: String,
    },

    #[error("version `{version}` of `{name}` is not available from {backend}")]
    VersionNotAvailable {
        name: String,
        version: String,
        backend: Backend,
        diagnostics: String,
    },

    #[error("{backend}: {message}")]
    BackendExecution {
        backend: Backend,
        message: String,
        diagnostics: String,
    },

    #[error("no executable named `{name}` found in {}", dir.display())]
    ExecutableNotFound { name: String, dir: PathBuf },

    #[error(
        "timed out after {}s waiting for another yoink to finish fetching {key}",
        waited.as_secs()
    )]
    CacheLockTimeout { key: String, waited: Duration },

    #[error("failed to purge cache at {}: {source}", path.display())]
    CachePurge {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    CacheIo {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to execute {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl YoinkError {
    pub(crate) fn backend(backend: Backend, message: impl Into<String>) -> Self {
        Self::BackendExecution {
            backend,
            message: message.into(),
            diagnostics: String::new(),
        }
    }

    pub(crate) fn cache_io(context: impl Into<String>, source: io::Error) -> Self {
        Self::CacheIo {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable identifier, used in JSON output and tests.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoSupportedBackend => "no_supported_backend",
            Self::InvalidSpec(_) => "invalid_spec",
            Self::PackageNotFound { .. } => "package_not_found",
            Self::VersionNotAvailable { .. } => "version_not_available",
            Self::BackendExecution { .. } => "backend_execution",
            Self::ExecutableNotFound { .. } => "executable_not_found",
            Self::CacheLockTimeout { .. } => "cache_lock_timeout",
            Self::CachePurge { .. } => "cache_purge",
            Self::CacheIo { .. } => "cache_io",
            Self::Launch { .. } => "launch_failed",
        }
    }

    /// Raw output captured from the package manager, if any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::PackageNotFound { diagnostics, .. }
            | Self::VersionNotAvailable { diagnostics, .. }
            | Self::BackendExecution { diagnostics, .. } => {
                Some(diagnostics.as_str()).filter(|text| !text.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Problems the user can fix by changing the invocation, as opposed to
    /// environment or backend failures.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec(_)
                | Self::PackageNotFound { .. }
                | Self::VersionNotAvailable { .. }
                | Self::ExecutableNotFound { .. }
                | Self::NoSupportedBackend
        )
    }

    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NoSupportedBackend => {
                Some("yoink needs apt-get, dnf or pacman on PATH".to_string())
            }
            Self::InvalidSpec(_) => Some("use `name` or `name@version`, e.g. `htop@3.3.0`".to_string()),
            Self::PackageNotFound { backend, .. } => Some(format!(
                "check the package name, or refresh the {backend} package index"
            )),
            Self::VersionNotAvailable { name, .. } => {
                Some(format!("run `yoink {name}` to use the version the index currently offers"))
            }
            Self::ExecutableNotFound { .. } => Some(
                "the package may ship its command under a different name than the package"
                    .to_string(),
            ),
            Self::CacheLockTimeout { .. } => Some(
                "raise YOINK_LOCK_TIMEOUT or check for a stuck yoink process".to_string(),
            ),
            Self::BackendExecution { .. } => {
                Some("run with --verbose for full backend output".to_string())
            }
            Self::CachePurge { .. } | Self::CacheIo { .. } => {
                Some("set YOINK_CACHE_DIR to a writable location".to_string())
            }
            Self::Launch { .. } => None,
        }
    }
}
