//! Check suites and the process-global suite registry.
//!
//! The worker role runs in a re-executed copy of the host binary, so suites
//! must be resolvable by name in both processes. The embedding binary
//! registers its suites once at startup; the registry is the only
//! process-global state in the crate.

use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::check::types::{Check, CheckId};
use crate::core::context::CheckContext;

/// Signature of a suite-level before/after hook.
pub type HookFn = dyn Fn(&mut CheckContext) -> anyhow::Result<()> + Send + Sync;

/// An ordered collection of checks plus optional setup/teardown hooks.
pub struct CheckSuite {
    name: String,
    checks: Vec<Check>,
    before: Option<Arc<HookFn>>,
    after: Option<Arc<HookFn>>,
}

impl CheckSuite {
    pub fn new(name: impl Into<String>) -> Self {
        CheckSuite {
            name: name.into(),
            checks: Vec::new(),
            before: None,
            after: None,
        }
    }

    /// Append a check; declaration order breaks priority ties.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Setup hook run once before the first check. Failure aborts the run
    /// before any check executes.
    pub fn before(
        mut self,
        hook: impl Fn(&mut CheckContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Teardown hook run once after the last check. Failure is reported but
    /// never discards check results.
    pub fn after(
        mut self,
        hook: impl Fn(&mut CheckContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn find(&self, id: &CheckId) -> Option<&Check> {
        self.checks.iter().find(|c| &c.id == id)
    }

    /// Number of declared checks.
    pub fn declared(&self) -> usize {
        self.checks.len()
    }

    pub fn before_hook(&self) -> Option<Arc<HookFn>> {
        self.before.clone()
    }

    pub fn after_hook(&self) -> Option<Arc<HookFn>> {
        self.after.clone()
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<CheckSuite>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<CheckSuite>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a suite under its name. Re-registering replaces the previous
/// suite and logs a warning.
pub fn register(suite: CheckSuite) {
    let name = suite.name().to_string();
    let mut suites = registry().lock().unwrap();
    if suites.insert(name.clone(), Arc::new(suite)).is_some() {
        warn!("suite '{}' registered twice, replacing", name);
    }
}

/// Look up a registered suite by name.
pub fn resolve(name: &str) -> Option<Arc<CheckSuite>> {
    registry().lock().unwrap().get(name).cloned()
}

/// Names of all registered suites, sorted.
pub fn registered_names() -> Vec<String> {
    let mut names: Vec<String> = registry().lock().unwrap().keys().cloned().collect();
    names.sort();
    names
}
