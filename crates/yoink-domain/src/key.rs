use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Backend, PackageSpec};

/// Version segment used for unpinned specs.
pub const LATEST: &str = "latest";

/// Normalized `(backend, name, version-or-latest)` identity of one extraction
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    backend: Backend,
    name: String,
    version: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(backend: Backend, spec: &PackageSpec) -> Self {
        let version = spec
            .version()
            .map_or_else(|| LATEST.to_string(), sanitize_version);
        Self {
            backend,
            name: spec.name().to_string(),
            version,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sanitized version segment (`latest` when unpinned).
    pub fn version_segment(&self) -> &str {
        &self.version
    }

    /// `<backend>/<name>/<version-or-latest>`, relative to the cache root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.backend.dir_name())
            .join(&self.name)
            .join(&self.version)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.backend, self.name, self.version)
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9.+~_-]`.
///
/// The mapping is injective, so two different versions can never land in the
/// same directory. A pinned version spelled exactly `latest` cannot reach
/// this function because the parser folds it into the unpinned spec.
#[must_use]
pub fn sanitize_version(version: &str) -> String {
    let mut out = String::with_capacity(version.len());
    for byte in version.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'+' | b'~' | b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    if out == "." || out == ".." {
        return out.replace('.', "%2E");
    }
    out
}
