//! Check definitions and per-check outcome records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::context::CheckContext;

/// Stable identity of a check within a suite.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckId(String);

impl CheckId {
    pub fn new(id: impl Into<String>) -> Self {
        CheckId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckId {
    fn from(s: &str) -> Self {
        CheckId(s.to_string())
    }
}

/// Outcome returned by a verify callable that ran to completion.
#[derive(Clone, Debug)]
pub struct Verdict {
    pub passed: bool,
    pub info: String,
}

impl Verdict {
    pub fn pass() -> Self {
        Verdict {
            passed: true,
            info: String::new(),
        }
    }

    pub fn pass_with(info: impl Into<String>) -> Self {
        Verdict {
            passed: true,
            info: info.into(),
        }
    }

    pub fn fail(info: impl Into<String>) -> Self {
        Verdict {
            passed: false,
            info: info.into(),
        }
    }
}

/// A declared verification failure, distinct from an unexpected error.
///
/// Verify callables raise this (via `anyhow`) when an asserted property of
/// the artifact does not hold. Any other error escaping a callable is
/// reported as a verification error instead.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct AssertionError(pub String);

impl AssertionError {
    pub fn new(message: impl Into<String>) -> Self {
        AssertionError(message.into())
    }
}

/// Condition a gated check requires of its preconditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateCondition {
    /// Run only if every precondition passed
    Passed,
    /// Run only if every precondition failed
    Failed,
}

/// Gating rule attached to a check.
#[derive(Clone, Debug)]
pub struct Gate {
    pub condition: GateCondition,
    pub preconditions: Vec<CheckId>,
}

/// Signature of a verify callable.
pub type VerifyFn = dyn Fn(&mut CheckContext) -> anyhow::Result<Verdict> + Send + Sync;

/// A single declared check.
///
/// Identity, ordering and gating are fixed when the suite is built;
/// `description` and `timeout` may be adjusted mid-run through the
/// [`CheckContext`] handed to the verify callable.
#[derive(Clone)]
pub struct Check {
    pub id: CheckId,
    /// Scheduling weight; lower runs earlier, ties break on declaration order
    pub priority: i32,
    /// Wall-clock budget enforced by the supervising process; `None` means
    /// the harness default applies
    pub timeout: Option<Duration>,
    pub description: String,
    /// Checks that must execute before this one
    pub dependencies: Vec<CheckId>,
    pub gate: Option<Gate>,
    /// Hidden checks are omitted from the report when their gate is unmet
    pub hidden: bool,
    pub verify: Arc<VerifyFn>,
}

impl Check {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        verify: impl Fn(&mut CheckContext) -> anyhow::Result<Verdict> + Send + Sync + 'static,
    ) -> Self {
        Check {
            id: CheckId::new(id),
            priority: 0,
            timeout: None,
            description: description.into(),
            dependencies: Vec::new(),
            gate: None,
            hidden: false,
            verify: Arc::new(verify),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record checks that must have executed before this one.
    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.dependencies
            .extend(ids.iter().map(|id| CheckId::new(*id)));
        self
    }

    /// Run only when every listed check passed. The preconditions are also
    /// scheduling dependencies.
    pub fn runs_if_passed(self, ids: &[&str]) -> Self {
        self.gated(GateCondition::Passed, ids)
    }

    /// Run only when every listed check failed. The preconditions are also
    /// scheduling dependencies.
    pub fn runs_if_failed(self, ids: &[&str]) -> Self {
        self.gated(GateCondition::Failed, ids)
    }

    fn gated(mut self, condition: GateCondition, ids: &[&str]) -> Self {
        let preconditions: Vec<CheckId> = ids.iter().map(|id| CheckId::new(*id)).collect();
        for id in &preconditions {
            if !self.dependencies.contains(id) {
                self.dependencies.push(id.clone());
            }
        }
        self.gate = Some(Gate {
            condition,
            preconditions,
        });
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("description", &self.description)
            .field("dependencies", &self.dependencies)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Closed taxonomy of abnormal check outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A verification explicitly failed via [`AssertionError`]
    AssertionFailure,
    /// A verify callable raised an unexpected error
    VerificationError,
    /// The run setup is invalid (cycle, unknown id, missing required files)
    ConfigurationError,
    /// The check exceeded its wall-clock budget and was killed
    Timeout,
    /// The harness itself failed (worker died, channel broke)
    SupervisorError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AssertionFailure => "assertion_failure",
            ErrorKind::VerificationError => "verification_error",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::SupervisorError => "supervisor_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome record for one check.
///
/// `passed` is tri-state: `Some(true)` passed, `Some(false)` failed or
/// errored, `None` unknown (the gating condition was unmet).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: CheckId,
    pub passed: Option<bool>,
    pub description: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CheckResult {
    pub fn passed(check: CheckId, description: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            check,
            passed: Some(true),
            description: description.into(),
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn failed(check: CheckId, description: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            check,
            passed: Some(false),
            description: description.into(),
            message: message.into(),
            error_kind: None,
        }
    }

    /// Unknown outcome: the check was reached but its gate was unmet.
    pub fn unknown(check: CheckId, description: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            check,
            passed: None,
            description: description.into(),
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn error(
        check: CheckId,
        description: impl Into<String>,
        message: impl Into<String>,
        kind: ErrorKind,
    ) -> Self {
        CheckResult {
            check,
            passed: Some(false),
            description: description.into(),
            message: message.into(),
            error_kind: Some(kind),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_kind.is_some()
    }
}
