//! Per-run filesystem isolation.
//!
//! A sandbox is a throwaway directory holding a selected copy of the
//! artifact's working set. The worker materializes it, changes into it for
//! the run, and tears it down on every in-process exit path; orphans left by
//! forced termination are removed by the supervisor-side sweep.

pub mod config;
pub mod dir;
pub mod fetch;

pub use config::{DownloadSpec, SandboxConfig, DEFAULT_FILE_LIMIT};
pub use dir::SandboxDir;
pub use fetch::{Fetcher, HttpFetcher};
