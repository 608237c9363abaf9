#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod backend;
pub mod key;
pub mod spec;

pub use backend::Backend;
pub use key::{sanitize_version, CacheKey, LATEST};
pub use spec::{PackageSpec, SpecError};
