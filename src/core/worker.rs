//! The worker role: one process, one run.
//!
//! The supervising process re-executes this binary with the hidden worker
//! flags, pipes a [`WorkerSpec`] over stdin, and reads Signals and Results
//! back over the inherited channel fd. The worker resolves the suite from
//! the process-global registry, enters the sandbox, and walks the scheduled
//! checks strictly in order. A failing check never takes the worker down;
//! configuration problems abort before any check executes.

use log::{debug, error};
use std::cell::RefCell;
use std::io::Read;
use std::os::unix::io::RawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::check::cache::RunCache;
use crate::check::scheduler::execution_order;
use crate::check::suite::{self, HookFn};
use crate::check::types::{
    AssertionError, Check, CheckId, CheckResult, ErrorKind, GateCondition, Verdict,
};
use crate::core::channel::MessageWriter;
use crate::core::context::{CheckContext, SandboxHandle, SignalSink};
use crate::core::types::{RunSummary, Signal, WorkerSpec};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::dir::SandboxDir;
use crate::sandbox::fetch::HttpFetcher;

/// Message reported for a visible check whose gate was unmet.
pub const GATE_UNMET_MESSAGE: &str = "not checked: its preconditions were not met";

impl SignalSink for MessageWriter {
    fn emit(&mut self, signal: Signal) {
        if let Err(e) = self.signal(signal) {
            error!("failed to emit signal: {e}");
        }
    }
}

/// Worker-role entry point. Reads the spec from stdin, runs the suite, and
/// returns the process exit code.
pub fn run_worker(channel_fd: RawFd) -> i32 {
    let writer = Rc::new(RefCell::new(MessageWriter::from_raw_fd(channel_fd)));

    let mut spec_json = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut spec_json) {
        fatal(&writer, "worker startup", format!("cannot read worker spec: {e}"), 0);
        return 1;
    }
    let spec: WorkerSpec = match serde_json::from_str(&spec_json) {
        Ok(spec) => spec,
        Err(e) => {
            fatal(&writer, "worker startup", format!("malformed worker spec: {e}"), 0);
            return 1;
        }
    };

    debug!("worker {} starting for suite '{}'", spec.run_id, spec.suite);
    execute(&spec, &writer)
}

fn fatal(writer: &Rc<RefCell<MessageWriter>>, description: &str, message: String, declared: usize) {
    let mut writer = writer.borrow_mut();
    let _ = writer.result(CheckResult::error(
        CheckId::new("configuration"),
        description,
        message,
        ErrorKind::ConfigurationError,
    ));
    let _ = writer.done(RunSummary {
        declared,
        ..Default::default()
    });
}

fn execute(spec: &WorkerSpec, writer: &Rc<RefCell<MessageWriter>>) -> i32 {
    let suite = match suite::resolve(&spec.suite) {
        Some(suite) => suite,
        None => {
            fatal(writer, "suite resolution", format!("unknown suite '{}'", spec.suite), 0);
            return 1;
        }
    };
    let declared = suite.declared();

    let order = match execution_order(suite.checks()) {
        Ok(order) => order,
        Err(e) => {
            fatal(writer, "check scheduling", e.to_string(), declared);
            return 1;
        }
    };

    let artifact = match std::fs::canonicalize(&spec.artifact) {
        Ok(path) => path,
        Err(e) => {
            fatal(
                writer,
                "artifact resolution",
                format!("cannot resolve artifact {}: {e}", spec.artifact.display()),
                declared,
            );
            return 1;
        }
    };
    let source_root = match artifact.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if writer.borrow_mut().signal(Signal::declared(declared)).is_err() {
        // supervisor is gone; nothing useful left to do
        return 1;
    }

    let config = match SandboxConfig::snapshot(&source_root) {
        Ok(config) => Rc::new(RefCell::new(config)),
        Err(e) => {
            fatal(writer, "sandbox setup", e.to_string(), declared);
            return 1;
        }
    };
    let dir = match SandboxDir::materialize(
        &config.borrow(),
        &source_root,
        &spec.workspace_root,
        &spec.run_id,
        Box::new(HttpFetcher),
    ) {
        Ok(dir) => Rc::new(RefCell::new(dir)),
        Err(e) => {
            fatal(writer, "sandbox setup", e.to_string(), declared);
            return 1;
        }
    };
    if let Err(e) = dir.borrow_mut().enter() {
        fatal(writer, "sandbox setup", e.to_string(), declared);
        return 1;
    }
    let sandbox = SandboxHandle {
        config: config.clone(),
        dir: dir.clone(),
        source_root,
    };
    let sink: Rc<RefCell<dyn SignalSink>> = writer.clone();

    // setup hook: failure skips every check
    if let Some(hook) = suite.before_hook() {
        if let Err(result) = run_hook(&hook, "suite setup", spec, &artifact, &sink, &sandbox) {
            let mut writer = writer.borrow_mut();
            let _ = writer.result(result);
            let _ = writer.done(RunSummary {
                declared,
                ..Default::default()
            });
            return 1;
        }
    }

    let mut cache = RunCache::new();
    cache.clear();
    let mut tally = RunSummary {
        declared,
        ..Default::default()
    };

    for id in &order {
        let check = match suite.find(id) {
            Some(check) => check,
            None => continue, // order only ever names suite checks
        };
        if cache.contains(id) {
            continue;
        }
        run_check(check, spec, &artifact, writer, &sink, &sandbox, &mut cache, &mut tally);
    }

    // teardown hook: failure is reported, results are kept
    if let Some(hook) = suite.after_hook() {
        if let Err(result) = run_hook(&hook, "suite teardown", spec, &artifact, &sink, &sandbox) {
            let _ = writer.borrow_mut().result(result);
        }
    }

    cache.clear();
    let _ = writer.borrow_mut().done(tally);

    // restore cwd and delete the run directory before exiting
    dir.borrow_mut().teardown();
    0
}

fn run_hook(
    hook: &Arc<HookFn>,
    description: &str,
    spec: &WorkerSpec,
    artifact: &Path,
    sink: &Rc<RefCell<dyn SignalSink>>,
    sandbox: &SandboxHandle,
) -> std::result::Result<(), CheckResult> {
    let mut ctx = CheckContext::new(
        description,
        spec.default_timeout(),
        artifact.to_path_buf(),
        sink.clone(),
    )
    .with_sandbox(sandbox.clone());

    // only paths this hook itself finds missing are fatal; a check-local
    // require failure earlier in the run was already reported on that check
    let already_missing = sandbox.config.borrow().missing_required().len();

    let outcome = catch_unwind(AssertUnwindSafe(|| hook(&mut ctx)));

    let missing: Vec<String> = sandbox
        .config
        .borrow()
        .missing_required()
        .iter()
        .skip(already_missing)
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if !missing.is_empty() {
        return Err(CheckResult::error(
            CheckId::new("configuration"),
            description,
            format!("required files missing: {}", missing.join(", ")),
            ErrorKind::ConfigurationError,
        ));
    }

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CheckResult::error(
            CheckId::new("configuration"),
            description,
            format!("{description} failed: {e:#}"),
            ErrorKind::VerificationError,
        )),
        Err(payload) => Err(CheckResult::error(
            CheckId::new("configuration"),
            description,
            format!("{description} panicked: {}", panic_message(&*payload)),
            ErrorKind::VerificationError,
        )),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_check(
    check: &Check,
    spec: &WorkerSpec,
    artifact: &Path,
    writer: &Rc<RefCell<MessageWriter>>,
    sink: &Rc<RefCell<dyn SignalSink>>,
    sandbox: &SandboxHandle,
    cache: &mut RunCache,
    tally: &mut RunSummary,
) {
    if let Some(gate) = &check.gate {
        let met = gate.preconditions.iter().all(|pre| {
            let wanted = match gate.condition {
                GateCondition::Passed => Some(true),
                GateCondition::Failed => Some(false),
            };
            cache.get(pre).map(|r| r.passed == wanted).unwrap_or(false)
        });
        if !met {
            let result = CheckResult::unknown(check.id.clone(), &check.description, GATE_UNMET_MESSAGE);
            cache.put(check.id.clone(), result.clone());
            if !check.hidden {
                let _ = writer.borrow_mut().result(result);
            }
            return;
        }
    }

    let timeout = check.timeout.unwrap_or_else(|| spec.default_timeout());
    let _ = writer
        .borrow_mut()
        .signal(Signal::announce(&check.description, timeout));

    let mut ctx = CheckContext::new(
        &check.description,
        timeout,
        artifact.to_path_buf(),
        sink.clone(),
    )
    .with_sandbox(sandbox.clone());

    let verify = check.verify.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| verify(&mut ctx)));
    tally.executed += 1;

    let description = ctx.description().to_string();
    let result = classify_outcome(check.id.clone(), description, outcome);
    match result.passed {
        Some(true) => tally.passed += 1,
        _ => tally.failed += 1,
    }

    cache.put(check.id.clone(), result.clone());
    let _ = writer.borrow_mut().result(result);
}

/// Map the raw outcome of a verify invocation onto a result record.
fn classify_outcome(
    id: CheckId,
    description: String,
    outcome: std::thread::Result<anyhow::Result<Verdict>>,
) -> CheckResult {
    match outcome {
        Ok(Ok(verdict)) => {
            if verdict.passed {
                CheckResult::passed(id, description, verdict.info)
            } else {
                CheckResult::failed(id, description, verdict.info)
            }
        }
        Ok(Err(e)) => match e.downcast::<AssertionError>() {
            Ok(assertion) => CheckResult::error(
                id,
                description,
                assertion.0,
                ErrorKind::AssertionFailure,
            ),
            Err(e) => CheckResult::error(
                id,
                description,
                format!("{e:#}"),
                ErrorKind::VerificationError,
            ),
        },
        Err(payload) => CheckResult::error(
            id,
            description,
            format!("check panicked: {}", panic_message(&*payload)),
            ErrorKind::VerificationError,
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn id() -> CheckId {
        CheckId::new("splits")
    }

    #[test]
    fn test_passing_verdict_classifies_as_passed() {
        let result = classify_outcome(id(), "splits words".into(), Ok(Ok(Verdict::pass_with("ok"))));
        assert_eq!(result.passed, Some(true));
        assert_eq!(result.message, "ok");
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn test_failing_verdict_is_a_plain_failure() {
        let result = classify_outcome(id(), "splits words".into(), Ok(Ok(Verdict::fail("wrong count"))));
        assert_eq!(result.passed, Some(false));
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn test_assertion_error_downcasts_to_assertion_failure() {
        let err = anyhow::Error::new(AssertionError::new("expected 3 words"));
        let result = classify_outcome(id(), "splits words".into(), Ok(Err(err)));
        assert_eq!(result.error_kind, Some(ErrorKind::AssertionFailure));
        assert_eq!(result.message, "expected 3 words");
        assert_eq!(result.passed, Some(false));
    }

    #[test]
    fn test_unexpected_error_is_a_verification_error() {
        let result = classify_outcome(id(), "splits words".into(), Ok(Err(anyhow!("io exploded"))));
        assert_eq!(result.error_kind, Some(ErrorKind::VerificationError));
        assert!(result.message.contains("io exploded"));
    }

    #[test]
    fn test_panic_is_a_verification_error() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds".to_string());
        let result = classify_outcome(id(), "splits words".into(), Err(payload));
        assert_eq!(result.error_kind, Some(ErrorKind::VerificationError));
        assert!(result.message.contains("index out of bounds"));
    }
}
