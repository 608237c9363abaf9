use std::io;

use serde_json::json;
use yoink_domain::{CacheKey, PackageSpec};

use crate::backend::{self, PackageBackend};
use crate::config::context::CommandContext;
use crate::error::YoinkError;
use crate::outcome::ExecutionOutcome;
use crate::process::Invoker;
use crate::progress::ProgressReporter;
use crate::resolve::resolve_executable;
use crate::runner::{run_executable, runtime_env};

#[derive(Debug, Clone)]
pub struct RunRequest {
    /// `name` or `name@version`.
    pub spec: String,
    /// Arguments handed to the target unchanged.
    pub args: Vec<String>,
}

/// Fetches (or reuses) the package behind `request.spec` and runs its command.
///
/// The outcome carries the child's exit code; every failure before the child
/// starts is reported with the reserved pre-execution code instead.
pub fn run_package(ctx: &CommandContext, request: &RunRequest) -> ExecutionOutcome {
    match run_package_inner(ctx, request) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(reason = err.reason(), "run failed: {err}");
            ExecutionOutcome::from_error(&err, ctx.verbose())
        }
    }
}

fn run_package_inner(
    ctx: &CommandContext,
    request: &RunRequest,
) -> Result<ExecutionOutcome, YoinkError> {
    let spec = PackageSpec::parse(&request.spec)?;
    let backend = ctx.backend()?;
    let adapter = backend::adapter_for(backend);
    let store = ctx.cache_store();
    let key = CacheKey::new(backend, &spec);

    let directory = match store.entry(&key) {
        Some(entry) => {
            tracing::info!("Using cached {spec}");
            if let Some(at) = entry.fetched_at {
                tracing::debug!(key = %key, "entry fetched at {at}");
            }
            entry.directory
        }
        None => fetch(ctx, &spec, adapter.as_ref())?,
    };

    if ctx.verbose() {
        let candidates = adapter.list_entry_candidates(&directory);
        tracing::debug!(
            "{} entry candidate(s): {}",
            candidates.len(),
            candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let resolved = resolve_executable(&directory, spec.name(), adapter.bin_dirs())?;
    if !resolved.is_executable {
        return Err(YoinkError::Launch {
            path: resolved.path,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "file is not executable"),
        });
    }

    let envs = runtime_env(&directory, adapter.bin_dirs(), ctx.env());
    let code = run_executable(&resolved.path, &request.args, &envs)?;
    Ok(ExecutionOutcome::success(
        format!("{spec} exited with status {code}"),
        json!({
            "exit_code": code,
            "passthrough": true,
            "spec": spec.to_string(),
            "backend": backend.dir_name(),
            "executable": resolved.path.display().to_string(),
            "cache_dir": directory.display().to_string(),
        }),
    ))
}

fn fetch(
    ctx: &CommandContext,
    spec: &PackageSpec,
    adapter: &dyn PackageBackend,
) -> Result<std::path::PathBuf, YoinkError> {
    let announce = !ctx.global.quiet && !ctx.global.json;
    let spinner = announce.then(|| ProgressReporter::spinner(format!("Casting for {spec}")));
    let invoker = Invoker::new(ctx.verbose());
    let directory = ctx.cache_store().get_or_fetch(spec, adapter, &invoker)?;
    let caught = format!("Caught {spec} from {}!", adapter.backend().display_name());
    tracing::debug!(dir = %directory.display(), "{caught}");
    if let Some(spinner) = spinner {
        spinner.finish(caught);
    }
    Ok(directory)
}

/// Empties the cache root.
pub fn purge_cache(ctx: &CommandContext) -> ExecutionOutcome {
    let store = ctx.cache_store();
    let root = store.root().display().to_string();
    match store.purge() {
        Ok(removed) => ExecutionOutcome::success(
            format!("removed {removed} cached package(s) from {root}"),
            json!({
                "removed": removed,
                "cache_root": root,
            }),
        ),
        Err(err) => ExecutionOutcome::from_error(&err, ctx.verbose()),
    }
}
