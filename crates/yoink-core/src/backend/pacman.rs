use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use yoink_domain::{Backend, PackageSpec};

use super::{check_extraction, find_archive, spawn_failure, FetchResult, PackageBackend};
use crate::error::YoinkError;
use crate::process::Invoker;

const USER_AGENT: &str = concat!("yoink/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Package metadata members that are not part of the installed tree.
const METADATA_MEMBERS: &[&str] = &[".PKGINFO", ".MTREE", ".BUILDINFO", ".INSTALL"];

/// Arch family: `pacman -Sddp` prints the mirror URL, which is fetched
/// directly, then unpacked with `tar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pacman;

impl PackageBackend for Pacman {
    fn backend(&self) -> Backend {
        Backend::Pacman
    }

    fn pin_argument(&self, spec: &PackageSpec) -> Result<String, YoinkError> {
        match spec.version() {
            None => Ok(spec.name().to_string()),
            Some(version) => Err(YoinkError::backend(
                Backend::Pacman,
                format!(
                    "pacman cannot download an exact version (requested {}@{version}); \
                     run `yoink {}` for the repository version",
                    spec.name(),
                    spec.name()
                ),
            )),
        }
    }

    fn download(
        &self,
        spec: &PackageSpec,
        pin: &str,
        staging: &Path,
        invoker: &Invoker,
    ) -> Result<FetchResult, YoinkError> {
        let args = vec![
            "-Sddp".to_string(),
            "--noconfirm".to_string(),
            pin.to_string(),
        ];
        let output = invoker
            .run("pacman", &args, staging)
            .map_err(|err| spawn_failure(Backend::Pacman, "pacman", &err))?;
        if !output.success() {
            return Ok(FetchResult::failed(output.combined()));
        }
        let url = package_url(&output.stdout).ok_or_else(|| YoinkError::BackendExecution {
            backend: Backend::Pacman,
            message: format!("pacman printed no download URL for {spec}"),
            diagnostics: output.combined(),
        })?;
        tracing::debug!(%url, "resolved package URL");

        let file_name = archive_file_name(url).ok_or_else(|| {
            YoinkError::backend(Backend::Pacman, format!("cannot name the archive at {url}"))
        })?;
        let target = staging.join(file_name);
        match url.strip_prefix("file://") {
            Some(local) => copy_local(Path::new(local), &target)?,
            None => download_remote(url, &target)?,
        }

        let prefix = format!("{}-", spec.name());
        let archive = find_archive(Backend::Pacman, staging, &prefix, |name| {
            name.contains(".pkg.tar")
        })?
        .unwrap_or(target);
        Ok(FetchResult::downloaded(archive, output.combined()))
    }

    fn classify_failure(
        &self,
        spec: &PackageSpec,
        result: &FetchResult,
        _invoker: &Invoker,
    ) -> YoinkError {
        classify(spec, &result.diagnostics)
    }

    fn extract(&self, archive: &Path, dest: &Path, invoker: &Invoker) -> Result<(), YoinkError> {
        let mut args = vec![
            "-xf".to_string(),
            archive.display().to_string(),
            "-C".to_string(),
            dest.display().to_string(),
        ];
        args.extend(METADATA_MEMBERS.iter().map(|member| format!("--exclude={member}")));
        check_extraction(Backend::Pacman, "tar", invoker.run("tar", &args, dest))
    }
}

/// `-p` prints one URL per target; with `-dd` only the package itself.
fn package_url(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.contains("://"))
}

fn archive_file_name(url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(PathBuf::from(name))
}

fn copy_local(source: &Path, target: &Path) -> Result<(), YoinkError> {
    fs::copy(source, target).map_err(|err| YoinkError::BackendExecution {
        backend: Backend::Pacman,
        message: format!("failed to copy {}", source.display()),
        diagnostics: err.to_string(),
    })?;
    Ok(())
}

fn download_remote(url: &str, target: &Path) -> Result<(), YoinkError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|err| transfer_failure(url, &err))?;
    let mut response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|err| transfer_failure(url, &err))?;
    let mut file = File::create(target).map_err(|err| {
        YoinkError::cache_io(format!("creating {}", target.display()), err)
    })?;
    response.copy_to(&mut file).map_err(|err| transfer_failure(url, &err))?;
    Ok(())
}

fn transfer_failure(url: &str, err: &reqwest::Error) -> YoinkError {
    YoinkError::BackendExecution {
        backend: Backend::Pacman,
        message: format!("failed to download {url}"),
        diagnostics: err.to_string(),
    }
}

fn classify(spec: &PackageSpec, diagnostics: &str) -> YoinkError {
    // error: target not found: nope
    if diagnostics.contains("target not found") {
        return YoinkError::PackageNotFound {
            name: spec.name().to_string(),
            backend: Backend::Pacman,
            diagnostics: diagnostics.to_string(),
        };
    }
    YoinkError::BackendExecution {
        backend: Backend::Pacman,
        message: format!("pacman -Sddp {spec} failed"),
        diagnostics: diagnostics.to_string(),
    }
}
