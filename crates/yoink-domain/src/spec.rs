//! Parsing of `name[@version]` tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Version keyword that means "whatever the index resolves as newest".
const LATEST_KEYWORD: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package spec `{token}`: {reason}")]
pub struct SpecError {
    pub token: String,
    pub reason: String,
}

impl SpecError {
    fn new(token: &str, reason: impl Into<String>) -> Self {
        Self {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// A package name plus an optional exact version pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageSpec {
    name: String,
    version: Option<String>,
}

impl PackageSpec {
    /// Parses a raw CLI token.
    ///
    /// The token is split on the last `@` that is not escaped with a backslash.
    /// Names may not contain `@` at all, so `a@b@1.0` and `a\@b` are rejected.
    /// `name@latest` is the same spec as a bare `name`.
    pub fn parse(token: &str) -> Result<Self, SpecError> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SpecError::new(token, "package name is empty"));
        }
        let (name, version) = match split_last_unescaped_at(trimmed) {
            Some((name, version)) => (name, Some(version)),
            None => (trimmed, None),
        };
        validate_name(token, name)?;
        let version = match version {
            Some(raw) => {
                validate_version(token, raw)?;
                if raw.eq_ignore_ascii_case(LATEST_KEYWORD) {
                    None
                } else {
                    Some(raw.to_string())
                }
            }
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.version.is_some()
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for PackageSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_last_unescaped_at(token: &str) -> Option<(&str, &str)> {
    let bytes = token.as_bytes();
    token
        .char_indices()
        .rev()
        .find(|(idx, ch)| *ch == '@' && (*idx == 0 || bytes[idx - 1] != b'\\'))
        .map(|(idx, _)| (&token[..idx], &token[idx + 1..]))
}

fn validate_name(token: &str, name: &str) -> Result<(), SpecError> {
    if name.is_empty() {
        return Err(SpecError::new(token, "package name is empty"));
    }
    if name.contains('@') {
        return Err(SpecError::new(
            token,
            "package names containing `@` are not supported",
        ));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(SpecError::new(
            token,
            "package name must start with a letter or digit",
        ));
    }
    if let Some(bad) = name.chars().find(|ch| !is_name_char(*ch)) {
        return Err(SpecError::new(
            token,
            format!("package name contains unsupported character `{bad}`"),
        ));
    }
    Ok(())
}

fn validate_version(token: &str, version: &str) -> Result<(), SpecError> {
    if version.is_empty() {
        return Err(SpecError::new(token, "version after `@` is empty"));
    }
    if let Some(bad) = version.chars().find(|ch| !is_version_char(*ch)) {
        return Err(SpecError::new(
            token,
            format!("version contains unsupported character `{bad}`"),
        ));
    }
    Ok(())
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '+' | '.' | '_' | '-')
}

fn is_version_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '+' | '~' | ':' | '_' | '-')
}
