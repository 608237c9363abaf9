use std::path::Path;

use yoink_domain::{Backend, PackageSpec};

use super::{
    check_extraction, epoch_is_valid, find_archive, missing_archive, spawn_failure, FetchResult,
    PackageBackend,
};
use crate::error::YoinkError;
use crate::process::Invoker;

const BIN_DIRS: &[&str] = &[
    "bin",
    "usr/bin",
    "sbin",
    "usr/sbin",
    "usr/local/bin",
    "usr/local/sbin",
    "usr/games",
    "usr/local/games",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "Unable to locate package",
    "Couldn't find any package",
    "has no installation candidate",
    "has no candidate",
    "No packages found",
];

/// Debian family: `apt-get download` + `dpkg-deb -x`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Apt;

impl PackageBackend for Apt {
    fn backend(&self) -> Backend {
        Backend::Apt
    }

    fn bin_dirs(&self) -> &'static [&'static str] {
        BIN_DIRS
    }

    fn pin_argument(&self, spec: &PackageSpec) -> Result<String, YoinkError> {
        match spec.version() {
            None => Ok(spec.name().to_string()),
            Some(version) => {
                if version.contains('_') || !epoch_is_valid(version) {
                    return Err(YoinkError::backend(
                        Backend::Apt,
                        format!("`{version}` is not a valid Debian version"),
                    ));
                }
                Ok(format!("{}={version}", spec.name()))
            }
        }
    }

    fn download(
        &self,
        spec: &PackageSpec,
        pin: &str,
        staging: &Path,
        invoker: &Invoker,
    ) -> Result<FetchResult, YoinkError> {
        let args = vec!["download".to_string(), pin.to_string()];
        let output = invoker
            .run("apt-get", &args, staging)
            .map_err(|err| spawn_failure(Backend::Apt, "apt-get", &err))?;
        if !output.success() {
            return Ok(FetchResult::failed(output.combined()));
        }
        let prefix = format!("{}_", spec.name());
        let archive = find_archive(Backend::Apt, staging, &prefix, |name| name.ends_with(".deb"))?
            .ok_or_else(|| missing_archive(Backend::Apt, staging, output.combined()))?;
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
        let args = vec![
            "-x".to_string(),
            archive.display().to_string(),
            dest.display().to_string(),
        ];
        check_extraction(Backend::Apt, "dpkg-deb", invoker.run("dpkg-deb", &args, dest))
    }
}

fn classify(spec: &PackageSpec, diagnostics: &str) -> YoinkError {
    if let Some(version) = spec.version() {
        // E: Version '9.9' for 'htop' was not found
        if diagnostics.contains("Version '") && diagnostics.contains("was not found") {
            return YoinkError::VersionNotAvailable {
                name: spec.name().to_string(),
                version: version.to_string(),
                backend: Backend::Apt,
                diagnostics: diagnostics.to_string(),
            };
        }
    }
    if NOT_FOUND_MARKERS
        .iter()
        .any(|marker| diagnostics.contains(marker))
    {
        return YoinkError::PackageNotFound {
            name: spec.name().to_string(),
            backend: Backend::Apt,
            diagnostics: diagnostics.to_string(),
        };
    }
    YoinkError::BackendExecution {
        backend: Backend::Apt,
        message: format!("apt-get download {spec} failed"),
        diagnostics: diagnostics.to_string(),
    }
}
