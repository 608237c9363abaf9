//! Native package manager adapters.
//!
//! Each backend knows how to turn a [`PackageSpec`] into a downloaded archive
//! and how to unpack that archive into a directory, using only the
//! download-only primitives of the host manager. Nothing here installs
//! anything or needs root.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use yoink_domain::{Backend, PackageSpec};

use crate::error::YoinkError;
use crate::process::{run_command, Invoker, RunOutput};

mod apt;
mod dnf;
mod pacman;

pub use apt::Apt;
pub use dnf::Dnf;
pub use pacman::Pacman;

/// Where packages conventionally put their commands, in lookup order.
pub const DEFAULT_BIN_DIRS: &[&str] = &[
    "bin",
    "usr/bin",
    "sbin",
    "usr/sbin",
    "usr/local/bin",
    "usr/local/sbin",
];

const STAGING_PREFIX: &str = ".yoink-download-";

/// Outcome of a backend download step.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub archive: PathBuf,
    pub success: bool,
    /// Everything the backend printed, kept verbatim for error reports.
    pub diagnostics: String,
}

impl FetchResult {
    pub fn downloaded(archive: PathBuf, diagnostics: String) -> Self {
        Self {
            archive,
            success: true,
            diagnostics,
        }
    }

    pub fn failed(diagnostics: String) -> Self {
        Self {
            archive: PathBuf::new(),
            success: false,
            diagnostics,
        }
    }
}

pub trait PackageBackend: Send + Sync {
    fn backend(&self) -> Backend;

    fn bin_dirs(&self) -> &'static [&'static str] {
        DEFAULT_BIN_DIRS
    }

    /// The package argument handed to the manager, e.g. `htop=3.3.0-4`.
    ///
    /// # Errors
    /// Fails when the manager cannot fetch the requested version.
    fn pin_argument(&self, spec: &PackageSpec) -> Result<String, YoinkError>;

    /// Downloads the archive for `pin` into `staging`.
    ///
    /// A manager that ran but refused the request yields a result with
    /// `success == false`; `Err` is reserved for failures to run it at all.
    ///
    /// # Errors
    /// Fails when the manager cannot be started or its archive cannot be
    /// located or saved.
    fn download(
        &self,
        spec: &PackageSpec,
        pin: &str,
        staging: &Path,
        invoker: &Invoker,
    ) -> Result<FetchResult, YoinkError>;

    /// Maps a failed download to the error the user should see.
    fn classify_failure(
        &self,
        spec: &PackageSpec,
        result: &FetchResult,
        invoker: &Invoker,
    ) -> YoinkError;

    /// Unpacks `archive` into `dest` without running any package scripts.
    ///
    /// # Errors
    /// Fails when the extractor cannot run or exits non-zero.
    fn extract(&self, archive: &Path, dest: &Path, invoker: &Invoker) -> Result<(), YoinkError>;

    /// Downloads and unpacks `spec` into `dest`.
    ///
    /// The archive is staged in a hidden directory inside `dest` and removed
    /// once extraction is done, so nothing is written outside `dest`.
    ///
    /// # Errors
    /// Propagates the classified download failure or the extraction error.
    fn fetch(&self, spec: &PackageSpec, dest: &Path, invoker: &Invoker) -> Result<(), YoinkError> {
        let pin = self.pin_argument(spec)?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(dest)
            .map_err(|err| {
                YoinkError::cache_io(
                    format!("creating staging directory in {}", dest.display()),
                    err,
                )
            })?;

        let result = self.download(spec, &pin, staging.path(), invoker)?;
        if !result.success {
            return Err(self.classify_failure(spec, &result, invoker));
        }
        tracing::debug!(archive = %result.archive.display(), "downloaded archive");

        self.extract(&result.archive, dest, invoker)?;
        staging.close().map_err(|err| {
            YoinkError::cache_io(format!("removing staging directory in {}", dest.display()), err)
        })
    }

    /// Files and symlinks sitting directly in one of [`Self::bin_dirs`],
    /// relative to `dest` and sorted.
    fn list_entry_candidates(&self, dest: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for dir in self.bin_dirs() {
            let Ok(entries) = fs::read_dir(dest.join(dir)) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_file() || file_type.is_symlink() {
                    candidates.push(Path::new(dir).join(entry.file_name()));
                }
            }
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }
}

/// Probes `PATH` for a supported package manager.
///
/// # Errors
/// Returns [`YoinkError::NoSupportedBackend`] when none is installed.
pub fn detect() -> Result<Backend, YoinkError> {
    let path = env::var_os("PATH").unwrap_or_default();
    detect_in(path)
}

/// Probes an explicit search path, in [`Backend::DETECTION_ORDER`].
///
/// A manager only counts when `<manager> --version` also succeeds.
///
/// # Errors
/// Returns [`YoinkError::NoSupportedBackend`] when none is found.
pub fn detect_in(path: impl AsRef<OsStr>) -> Result<Backend, YoinkError> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let found = Backend::DETECTION_ORDER.into_iter().find(|backend| {
        which::which_in(backend.probe_binary(), Some(path.as_ref()), &cwd)
            .is_ok_and(|program| responds_to_version(*backend, &program))
    });
    match found {
        Some(backend) => {
            tracing::debug!(backend = %backend, "detected package manager");
            Ok(backend)
        }
        None => Err(YoinkError::NoSupportedBackend),
    }
}

fn responds_to_version(backend: Backend, program: &Path) -> bool {
    let args = vec!["--version".to_string()];
    match run_command(&program.display().to_string(), &args, &[], Path::new("/")) {
        Ok(output) if output.success() => true,
        Ok(output) => {
            tracing::debug!(
                backend = %backend,
                code = output.code,
                "skipping package manager that fails --version"
            );
            false
        }
        Err(err) => {
            tracing::debug!(backend = %backend, error = %err, "skipping unusable package manager");
            false
        }
    }
}

pub fn adapter_for(backend: Backend) -> Box<dyn PackageBackend> {
    match backend {
        Backend::Apt => Box::new(Apt),
        Backend::Dnf => Box::new(Dnf),
        Backend::Pacman => Box::new(Pacman),
    }
}

pub(crate) fn spawn_failure(backend: Backend, program: &str, err: &anyhow::Error) -> YoinkError {
    YoinkError::BackendExecution {
        backend,
        message: format!("failed to run {program}"),
        diagnostics: format!("{err:#}"),
    }
}

/// Runs an extractor and turns a non-zero exit into a backend error.
pub(crate) fn check_extraction(
    backend: Backend,
    program: &str,
    output: anyhow::Result<RunOutput>,
) -> Result<(), YoinkError> {
    let output = output.map_err(|err| spawn_failure(backend, program, &err))?;
    if output.success() {
        return Ok(());
    }
    Err(YoinkError::BackendExecution {
        backend,
        message: format!("{program} exited with status {}", output.code),
        diagnostics: output.combined(),
    })
}

/// Finds the downloaded archive in `staging`.
///
/// Prefers `<prefix><digit>...` (the package itself), then any name starting
/// with `prefix`, then any archive at all.
pub(crate) fn find_archive(
    backend: Backend,
    staging: &Path,
    prefix: &str,
    is_archive: impl Fn(&str) -> bool,
) -> Result<Option<PathBuf>, YoinkError> {
    let entries = fs::read_dir(staging).map_err(|err| {
        YoinkError::cache_io(format!("listing {}", staging.display()), err)
    })?;
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_archive(name))
        .collect();
    names.sort();
    tracing::trace!(backend = %backend, ?names, "archives in staging");

    let versioned = names.iter().find(|name| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|first| first.is_ascii_digit())
    });
    let chosen = versioned
        .or_else(|| names.iter().find(|name| name.starts_with(prefix)))
        .or_else(|| names.first());
    Ok(chosen.map(|name| staging.join(name)))
}

pub(crate) fn missing_archive(backend: Backend, staging: &Path, diagnostics: String) -> YoinkError {
    YoinkError::BackendExecution {
        backend,
        message: format!(
            "download reported success but no archive appeared in {}",
            staging.display()
        ),
        diagnostics,
    }
}

/// `epoch:` prefixes must be numeric in both dpkg and rpm versions.
pub(crate) fn epoch_is_valid(version: &str) -> bool {
    match version.split_once(':') {
        Some((epoch, rest)) => {
            !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) && !rest.is_empty()
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn fake_tool(dir: &Path, name: &str) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    #[serial]
    fn detection_follows_fixed_order() {
        let temp = tempdir().unwrap();
        fake_tool(temp.path(), "pacman");
        fake_tool(temp.path(), "dnf");
        assert_eq!(detect_in(temp.path()).unwrap(), Backend::Dnf);

        fake_tool(temp.path(), "apt-get");
        assert_eq!(detect_in(temp.path()).unwrap(), Backend::Apt);
    }

    #[test]
    #[serial]
    fn broken_manager_is_skipped() {
        let temp = tempdir().unwrap();
        let apt_get = temp.path().join("apt-get");
        fs::write(&apt_get, "#!/bin/sh\necho 'apt-get: broken' >&2\nexit 1\n").unwrap();
        fs::set_permissions(&apt_get, fs::Permissions::from_mode(0o755)).unwrap();
        fake_tool(temp.path(), "pacman");
        assert_eq!(detect_in(temp.path()).unwrap(), Backend::Pacman);

        fs::remove_file(temp.path().join("pacman")).unwrap();
        let err = detect_in(temp.path()).unwrap_err();
        assert!(matches!(err, YoinkError::NoSupportedBackend));
    }

    #[test]
    fn detection_fails_without_managers() {
        let temp = tempdir().unwrap();
        let err = detect_in(temp.path()).unwrap_err();
        assert!(matches!(err, YoinkError::NoSupportedBackend));
    }

    #[test]
    fn archive_lookup_prefers_the_named_package() {
        let temp = tempdir().unwrap();
        for name in ["htop-doc_3.3.0_all.deb", "htop_3.3.0-4_amd64.deb", "notes.txt"] {
            fs::write(temp.path().join(name), b"").unwrap();
        }
        let found = find_archive(Backend::Apt, temp.path(), "htop_", |n| n.ends_with(".deb"))
            .unwrap()
            .unwrap();
        assert_eq!(found, temp.path().join("htop_3.3.0-4_amd64.deb"));

        let found = find_archive(Backend::Apt, temp.path(), "other_", |n| n.ends_with(".deb"))
            .unwrap()
            .unwrap();
        assert_eq!(found, temp.path().join("htop-doc_3.3.0_all.deb"));

        let none = find_archive(Backend::Apt, temp.path(), "x_", |n| n.ends_with(".rpm")).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn entry_candidates_list_bin_dirs_only() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("usr/bin")).unwrap();
        fs::create_dir_all(root.join("usr/games")).unwrap();
        fs::create_dir_all(root.join("usr/share/doc")).unwrap();
        fs::write(root.join("usr/bin/cowsay"), b"").unwrap();
        fs::write(root.join("usr/games/cowsay"), b"").unwrap();
        fs::write(root.join("usr/share/doc/README"), b"").unwrap();
        std::os::unix::fs::symlink("cowsay", root.join("usr/bin/cowthink")).unwrap();

        let apt = Apt.list_entry_candidates(root);
        assert_eq!(
            apt,
            vec![
                PathBuf::from("usr/bin/cowsay"),
                PathBuf::from("usr/bin/cowthink"),
                PathBuf::from("usr/games/cowsay"),
            ]
        );
        let dnf = Dnf.list_entry_candidates(root);
        assert_eq!(dnf.len(), 2);
    }

    #[test]
    fn epochs_must_be_numeric() {
        assert!(epoch_is_valid("1:2.0-1"));
        assert!(epoch_is_valid("2.0-1"));
        assert!(!epoch_is_valid("x:2.0"));
        assert!(!epoch_is_valid(":2.0"));
        assert!(!epoch_is_valid("1:"));
    }
}
