//! Harness configuration and the crate-wide error type.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the harness itself (as opposed to check outcomes,
/// which are reported through `CheckResult`).
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),
}

impl From<nix::errno::Errno> for HarnessError {
    fn from(err: nix::errno::Errno) -> Self {
        HarnessError::Process(err.to_string())
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Channel(err.to_string())
    }
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Runtime tunables for a supervised run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Supervisor poll cadence while the worker is alive
    pub poll_interval: Duration,
    /// Budget applied to checks that do not declare their own
    pub default_timeout: Duration,
    /// Per-stream cap on captured worker output (bytes)
    pub transcript_limit: usize,
    /// Root under which per-run sandbox directories are created
    pub workspace_root: PathBuf,
    /// Age after which an orphaned run directory is swept
    pub sweep_max_age: Duration,
    /// Program to re-exec for the worker role; defaults to the current
    /// executable
    pub worker_program: Option<PathBuf>,
}

impl HarnessConfig {
    /// Workspace root scoped by effective UID.
    /// Prevents root and non-root runs from colliding on a shared `/tmp` path.
    pub fn workspace_root_dir() -> PathBuf {
        let euid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("gradebox-uid-{}", euid))
    }

    /// Validate tunables before a run.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(HarnessError::Config(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.poll_interval > Duration::from_secs(1) {
            return Err(HarnessError::Config(format!(
                "poll interval {:?} is too coarse to enforce budgets",
                self.poll_interval
            )));
        }
        if self.default_timeout.is_zero() {
            return Err(HarnessError::Config(
                "default check timeout must be non-zero".to_string(),
            ));
        }
        if self.transcript_limit == 0 {
            return Err(HarnessError::Config(
                "transcript limit must be non-zero".to_string(),
            ));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(HarnessError::Config(
                "workspace root must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            default_timeout: Duration::from_secs(10),
            transcript_limit: 256 * 1024, // 256KB per stream
            workspace_root: Self::workspace_root_dir(),
            sweep_max_age: Duration::from_secs(24 * 3600),
            worker_program: None,
        }
    }
}
