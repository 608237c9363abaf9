use std::path::Path;

use yoink_domain::{Backend, PackageSpec};

use super::{
    check_extraction, epoch_is_valid, find_archive, missing_archive, spawn_failure, FetchResult,
    PackageBackend,
};
use crate::error::YoinkError;
use crate::process::Invoker;

const NO_MATCH_MARKERS: &[&str] = &[
    "No match for argument",
    "No package matches",
    "No packages found",
];

/// Fedora family: `dnf download` + `rpm2cpio | cpio`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dnf;

impl PackageBackend for Dnf {
    fn backend(&self) -> Backend {
        Backend::Dnf
    }

    fn pin_argument(&self, spec: &PackageSpec) -> Result<String, YoinkError> {
        match spec.version() {
            None => Ok(spec.name().to_string()),
            Some(version) => {
                if !epoch_is_valid(version) {
                    return Err(YoinkError::backend(
                        Backend::Dnf,
                        format!("`{version}` has a non-numeric epoch"),
                    ));
                }
                Ok(format!("{}-{version}", spec.name()))
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
        let args = vec![
            "download".to_string(),
            "--quiet".to_string(),
            "--setopt=install_weak_deps=False".to_string(),
            format!("--destdir={}", staging.display()),
            pin.to_string(),
        ];
        let output = invoker
            .run("dnf", &args, staging)
            .map_err(|err| spawn_failure(Backend::Dnf, "dnf", &err))?;
        if !output.success() {
            return Ok(FetchResult::failed(output.combined()));
        }
        let prefix = format!("{}-", spec.name());
        let archive = find_archive(Backend::Dnf, staging, &prefix, |name| {
            name.ends_with(".rpm") && !name.ends_with(".src.rpm")
        })?
        .ok_or_else(|| missing_archive(Backend::Dnf, staging, output.combined()))?;
        Ok(FetchResult::downloaded(archive, output.combined()))
    }

    fn classify_failure(
        &self,
        spec: &PackageSpec,
        result: &FetchResult,
        invoker: &Invoker,
    ) -> YoinkError {
        classify(spec, &result.diagnostics, || name_is_known(spec, invoker))
    }

    fn extract(&self, archive: &Path, dest: &Path, invoker: &Invoker) -> Result<(), YoinkError> {
        let rpm2cpio_args = vec![archive.display().to_string()];
        let cpio_args = vec![
            "-idmu".to_string(),
            "--quiet".to_string(),
            "--no-absolute-filenames".to_string(),
        ];
        let output = invoker.run_pipeline(
            ("rpm2cpio", rpm2cpio_args.as_slice()),
            ("cpio", cpio_args.as_slice()),
            dest,
        );
        check_extraction(Backend::Dnf, "rpm2cpio | cpio", output)
    }
}

/// dnf says "no match" for both unknown names and unknown versions; a pinned
/// miss is only a missing version when the bare name still resolves.
fn name_is_known(spec: &PackageSpec, invoker: &Invoker) -> bool {
    let args = vec![
        "repoquery".to_string(),
        "--quiet".to_string(),
        spec.name().to_string(),
    ];
    match invoker.run("dnf", &args, Path::new("/")) {
        Ok(output) => output.success() && !output.stdout.trim().is_empty(),
        Err(err) => {
            tracing::debug!(error = %err, "dnf repoquery failed");
            false
        }
    }
}

fn classify(spec: &PackageSpec, diagnostics: &str, name_is_known: impl FnOnce() -> bool) -> YoinkError {
    let no_match = NO_MATCH_MARKERS
        .iter()
        .any(|marker| diagnostics.contains(marker))
        || diagnostics
            .lines()
            .any(|line| line.contains("No package") && line.contains("available"));
    if !no_match {
        return YoinkError::BackendExecution {
            backend: Backend::Dnf,
            message: format!("dnf download {spec} failed"),
            diagnostics: diagnostics.to_string(),
        };
    }
    match spec.version() {
        Some(version) if name_is_known() => YoinkError::VersionNotAvailable {
            name: spec.name().to_string(),
            version: version.to_string(),
            backend: Backend::Dnf,
            diagnostics: diagnostics.to_string(),
        },
        _ => YoinkError::PackageNotFound {
            name: spec.name().to_string(),
            backend: Backend::Dnf,
            diagnostics: diagnostics.to_string(),
        },
    }
}
