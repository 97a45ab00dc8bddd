//! The handle threaded into verify callables.
//!
//! A check adjusts its own description or budget through this handle, never
//! through shared state; every change goes out as a fresh [`Signal`] so the
//! supervising process can keep its monitoring window honest. The handle
//! also exposes the sandbox operations a check may use to narrow or widen
//! its filesystem view mid-run.

use anyhow::anyhow;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::core::types::Signal;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::dir::SandboxDir;

/// Where context-originated signals go. The worker backs this with its
/// message channel; unit tests record into a Vec.
pub trait SignalSink {
    fn emit(&mut self, signal: Signal);
}

/// Shared sandbox state a context operates on.
#[derive(Clone)]
pub struct SandboxHandle {
    pub config: Rc<RefCell<SandboxConfig>>,
    pub dir: Rc<RefCell<SandboxDir>>,
    pub source_root: PathBuf,
}

pub struct CheckContext {
    description: String,
    timeout: Duration,
    artifact: PathBuf,
    sink: Rc<RefCell<dyn SignalSink>>,
    sandbox: Option<SandboxHandle>,
}

impl CheckContext {
    pub fn new(
        description: impl Into<String>,
        timeout: Duration,
        artifact: impl Into<PathBuf>,
        sink: Rc<RefCell<dyn SignalSink>>,
    ) -> Self {
        CheckContext {
            description: description.into(),
            timeout,
            artifact: artifact.into(),
            sink,
            sandbox: None,
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxHandle) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Replace the check's description. The running budget window is left
    /// untouched.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.sink
            .borrow_mut()
            .emit(Signal::description_update(&self.description));
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace the check's budget. The new budget is enforced from the
    /// moment of the change, not from check start.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.sink.borrow_mut().emit(Signal::timeout_update(timeout));
    }

    /// The artifact under check, as given to the run.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// File name of the artifact; inside the sandbox the artifact sits in
    /// the current directory under this name.
    pub fn artifact_name(&self) -> &str {
        self.artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Widen the sandbox with files matching `patterns`.
    pub fn include(&mut self, patterns: &[&str]) -> anyhow::Result<()> {
        let handle = self.sandbox()?;
        handle
            .config
            .borrow_mut()
            .include(&handle.source_root, patterns)?;
        handle.dir.borrow_mut().sync(&handle.config.borrow())?;
        Ok(())
    }

    /// Narrow the sandbox by removing files matching `patterns`.
    pub fn exclude(&mut self, patterns: &[&str]) -> anyhow::Result<()> {
        let handle = self.sandbox()?;
        handle
            .config
            .borrow_mut()
            .exclude(&handle.source_root, patterns)?;
        handle.dir.borrow_mut().sync(&handle.config.borrow())?;
        Ok(())
    }

    /// Restrict the sandbox to exactly the files matching `patterns`.
    pub fn only(&mut self, patterns: &[&str]) -> anyhow::Result<()> {
        let handle = self.sandbox()?;
        handle
            .config
            .borrow_mut()
            .only(&handle.source_root, patterns)?;
        handle.dir.borrow_mut().sync(&handle.config.borrow())?;
        Ok(())
    }

    /// Declare files mandatory. Errors naming every path this call found
    /// missing; all of them are also recorded in the sandbox config so a
    /// setup-time caller can surface the full list.
    pub fn require(&mut self, paths: &[&str]) -> anyhow::Result<()> {
        let handle = self.sandbox()?;
        let missing = handle.config.borrow_mut().require(&handle.source_root, paths);
        handle.dir.borrow_mut().sync(&handle.config.borrow())?;
        if missing.is_empty() {
            Ok(())
        } else {
            let names: Vec<String> = missing
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            Err(anyhow!("required files missing: {}", names.join(", ")))
        }
    }

    /// Queue a download of `source` into `dest` and synchronize; each
    /// distinct source is fetched at most once per run.
    pub fn download(&mut self, dest: &str, source: &str) -> anyhow::Result<()> {
        let handle = self.sandbox()?;
        handle.config.borrow_mut().download(dest, source);
        handle.dir.borrow_mut().sync(&handle.config.borrow())?;
        Ok(())
    }

    fn sandbox(&self) -> anyhow::Result<&SandboxHandle> {
        self.sandbox
            .as_ref()
            .ok_or_else(|| anyhow!("no sandbox attached to this run"))
    }
}
