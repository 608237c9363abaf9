use std::env;
use std::path::{Path, PathBuf};

use crate::config::EnvSnapshot;
use crate::error::YoinkError;
use crate::process::run_command_passthrough;

const LIB_DIRS: &[&str] = &[
    "lib",
    "lib64",
    "usr/lib",
    "usr/lib64",
    "lib/x86_64-linux-gnu",
    "lib/aarch64-linux-gnu",
    "lib/arm-linux-gnueabihf",
    "usr/lib/x86_64-linux-gnu",
    "usr/lib/aarch64-linux-gnu",
    "usr/lib/arm-linux-gnueabihf",
];

/// `PATH` and `LD_LIBRARY_PATH` for a child running out of `dir`: the tree's
/// existing bin and lib directories go first, followed by the values in
/// `inherited`.
pub fn runtime_env(dir: &Path, bin_dirs: &[&str], inherited: &EnvSnapshot) -> Vec<(String, String)> {
    let mut envs = Vec::new();
    if let Some(path) = prepend_existing(dir, bin_dirs, inherited.var("PATH")) {
        envs.push(("PATH".to_string(), path));
    }
    if let Some(libs) = prepend_existing(dir, LIB_DIRS, inherited.var("LD_LIBRARY_PATH")) {
        envs.push(("LD_LIBRARY_PATH".to_string(), libs));
    }
    envs
}

fn prepend_existing(dir: &Path, relative: &[&str], inherited: Option<&str>) -> Option<String> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for candidate in relative.iter().map(|rel| dir.join(rel)) {
        if candidate.is_dir() && !entries.contains(&candidate) {
            entries.push(candidate);
        }
    }
    if entries.is_empty() {
        return None;
    }
    if let Some(inherited) = inherited.filter(|value| !value.is_empty()) {
        for existing in env::split_paths(&inherited) {
            if !entries.contains(&existing) {
                entries.push(existing);
            }
        }
    }
    let joined = env::join_paths(entries).ok()?;
    Some(joined.to_string_lossy().into_owned())
}

/// Runs `executable` with inherited stdio from the caller's working
/// directory and returns its exit code (`128 + signal` when killed).
///
/// # Errors
/// Returns [`YoinkError::Launch`] when the process cannot be started.
pub fn run_executable(
    executable: &Path,
    args: &[String],
    envs: &[(String, String)],
) -> Result<i32, YoinkError> {
    let launch_error = |source| YoinkError::Launch {
        path: executable.to_path_buf(),
        source,
    };
    let cwd = env::current_dir().map_err(launch_error)?;
    tracing::debug!(exe = %executable.display(), ?args, "executing");
    let code = run_command_passthrough(executable, args, envs, &cwd).map_err(launch_error)?;
    tracing::debug!(code, "child exited");
    Ok(code)
}
