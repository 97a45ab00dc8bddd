//! The materialized sandbox directory.
//!
//! Each run gets its own directory under the workspace root, named by the
//! run id. `sync` applies the current [`SandboxConfig`] incrementally:
//! newly included files are copied in, newly excluded ones deleted, queued
//! downloads fetched at most once per distinct source. Files a check writes
//! itself are never touched by sync.
//!
//! Teardown runs on Drop: the previous working directory is restored and
//! the tree deleted. A forcibly killed worker cannot run Drop, so the
//! supervisor-side [`sweep`](SandboxDir::sweep) removes orphaned run
//! directories by age.

use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{HarnessError, Result};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::fetch::Fetcher;

pub struct SandboxDir {
    run_id: String,
    source_root: PathBuf,
    run_dir: PathBuf,
    /// Working directory to restore on teardown; set by `enter`
    prev_cwd: Option<PathBuf>,
    /// Files sync has placed, relative to the run directory
    present: BTreeSet<PathBuf>,
    /// Download destinations, exempt from the removal pass
    fetched_dests: BTreeSet<PathBuf>,
    /// Sources already resolved; each fetches at most once
    fetched_sources: HashSet<String>,
    fetcher: Box<dyn Fetcher>,
}

impl SandboxDir {
    /// Create the run directory and populate it from `config`.
    pub fn materialize(
        config: &SandboxConfig,
        source_root: &Path,
        workspace_root: &Path,
        run_id: &str,
        fetcher: Box<dyn Fetcher>,
    ) -> Result<Self> {
        let run_dir = workspace_root.join(run_id);
        fs::create_dir_all(&run_dir).map_err(|e| {
            HarnessError::Sandbox(format!(
                "cannot create run directory {}: {e}",
                run_dir.display()
            ))
        })?;
        let mut sandbox = SandboxDir {
            run_id: run_id.to_string(),
            source_root: source_root.to_path_buf(),
            run_dir,
            prev_cwd: None,
            present: BTreeSet::new(),
            fetched_dests: BTreeSet::new(),
            fetched_sources: HashSet::new(),
            fetcher,
        };
        sandbox.sync(config)?;
        Ok(sandbox)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.run_dir
    }

    /// Bring the directory in line with `config`. Idempotent; files written
    /// into the sandbox by checks are left alone.
    pub fn sync(&mut self, config: &SandboxConfig) -> Result<()> {
        let wanted: BTreeSet<PathBuf> = config.included().iter().cloned().collect();

        let stale: Vec<PathBuf> = self
            .present
            .iter()
            .filter(|path| !wanted.contains(*path) && !self.fetched_dests.contains(*path))
            .cloned()
            .collect();
        for path in stale {
            let dest = self.run_dir.join(&path);
            match fs::remove_file(&dest) {
                Ok(()) => debug!("sandbox: removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(HarnessError::Sandbox(format!(
                        "cannot remove {}: {e}",
                        dest.display()
                    )))
                }
            }
            self.present.remove(&path);
        }

        let to_copy: Vec<PathBuf> = wanted.difference(&self.present).cloned().collect();
        for path in &to_copy {
            let origin = self.source_root.join(path);
            let dest = self.run_dir.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&origin, &dest).map_err(|e| {
                HarnessError::Sandbox(format!(
                    "cannot copy {} into sandbox: {e}",
                    origin.display()
                ))
            })?;
            self.present.insert(path.clone());
        }

        for download in config.downloads() {
            if self.fetched_sources.contains(&download.source) {
                continue;
            }
            let dest = self.run_dir.join(&download.dest);
            self.fetcher.fetch(&download.source, &dest)?;
            self.fetched_sources.insert(download.source.clone());
            self.fetched_dests.insert(download.dest.clone());
            self.present.insert(download.dest.clone());
        }

        Ok(())
    }

    /// Change into the sandbox, remembering where we came from.
    pub fn enter(&mut self) -> Result<()> {
        let prev = std::env::current_dir().map_err(|e| {
            HarnessError::Sandbox(format!("cannot record working directory: {e}"))
        })?;
        std::env::set_current_dir(&self.run_dir).map_err(|e| {
            HarnessError::Sandbox(format!(
                "cannot enter sandbox {}: {e}",
                self.run_dir.display()
            ))
        })?;
        self.prev_cwd = Some(prev);
        Ok(())
    }

    /// Restore the working directory and delete the tree. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(prev) = self.prev_cwd.take() {
            if let Err(e) = std::env::set_current_dir(&prev) {
                warn!(
                    "failed to restore working directory {}: {e}",
                    prev.display()
                );
            }
        }
        if self.run_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.run_dir) {
                warn!(
                    "failed to remove run directory {}: {e}",
                    self.run_dir.display()
                );
            }
        }
    }

    /// Remove run directories under `workspace_root` older than `max_age`.
    /// Returns how many were removed.
    pub fn sweep(workspace_root: &Path, max_age: Duration) -> Result<usize> {
        if !workspace_root.exists() {
            return Ok(0);
        }
        let now = std::time::SystemTime::now();
        let mut removed = 0;
        for entry in fs::read_dir(workspace_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age >= max_age => {
                    let path = entry.path();
                    match fs::remove_dir_all(&path) {
                        Ok(()) => {
                            debug!("swept stale run directory {}", path.display());
                            removed += 1;
                        }
                        Err(e) => warn!("failed to sweep {}: {e}", path.display()),
                    }
                }
                _ => {}
            }
        }
        Ok(removed)
    }
}

impl Drop for SandboxDir {
    fn drop(&mut self) {
        self.teardown();
    }
}
