//! Resolution of deferred sandbox downloads.

use std::fs;
use std::path::Path;

use crate::config::{HarnessError, Result};

/// Seam for fetching a download source into the sandbox. Production uses
/// [`HttpFetcher`]; tests substitute a recording stub.
pub trait Fetcher: Send {
    fn fetch(&mut self, source: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP(S) fetcher.
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&mut self, source: &str, dest: &Path) -> Result<()> {
        let response = reqwest::blocking::get(source)
            .and_then(|r| r.error_for_status())
            .map_err(|e| HarnessError::Sandbox(format!("download of '{source}' failed: {e}")))?;
        let body = response
            .bytes()
            .map_err(|e| HarnessError::Sandbox(format!("download of '{source}' failed: {e}")))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &body).map_err(|e| {
            HarnessError::Sandbox(format!("cannot write download to {}: {e}", dest.display()))
        })?;
        Ok(())
    }
}
