#![deny(clippy::all)]

mod api;
pub mod backend;
pub mod cache;
pub mod config;
mod error;
mod outcome;
pub mod process;
mod progress;
pub mod resolve;
pub mod runner;

pub use crate::api::{purge_cache, run_package, RunRequest};
pub use crate::backend::{adapter_for, detect, detect_in, FetchResult, PackageBackend};
pub use crate::cache::{CacheEntry, CacheStore};
pub use crate::config::context::CommandContext;
pub use crate::config::{CacheConfig, Config, EnvSnapshot, GlobalOptions};
pub use crate::error::{YoinkError, PRE_EXEC_FAILURE_CODE};
pub use crate::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::process::{Invoker, RunOutput};
pub use crate::progress::PROGRESS_ENV;
pub use crate::resolve::{resolve_executable, ResolvedExecutable};
