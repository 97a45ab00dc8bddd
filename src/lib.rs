//! gradebox: a check-execution harness for grading small programs.
//!
//! A run takes a named suite of checks and an artifact, executes the checks
//! in dependency order inside an isolated worker process and sandbox
//! directory, enforces a wall-clock budget per check from the outside, and
//! returns a structured [`RunReport`].
//!
//! # Architecture
//!
//! ## Check model ([`check`])
//! - [`check::types`]: checks, gates, verdicts and per-check results
//! - [`check::suite`]: suites, hooks and the process-global registry
//! - [`check::scheduler`]: dependency-ordered scheduling with cycle detection
//! - [`check::cache`]: per-run execute-once memoization
//!
//! ## Execution core ([`core`])
//! - [`core::monitor`]: spawn, poll, budget enforcement, forced kill
//! - [`core::worker`]: the re-exec'd process that runs the checks
//! - [`core::channel`]: line-framed JSON worker→supervisor messages
//! - [`core::context`]: the handle verify callables adjust themselves through
//! - [`core::output`]: bounded capture of worker stdout/stderr
//!
//! ## Sandbox ([`sandbox`])
//! - [`sandbox::config`]: include/exclude/only/require/download bookkeeping
//! - [`sandbox::dir`]: materialization, incremental sync, teardown, sweep
//! - [`sandbox::fetch`]: deferred downloads, once per distinct source
//!
//! # Design principles
//!
//! 1. **Isolation from outside** - the worker is a separate OS process so a
//!    hung check can always be killed
//! 2. **Budgets are supervisor truth** - the worker announces, the monitor
//!    enforces
//! 3. **Check failures are data** - only configuration and infrastructure
//!    problems abort a run
//! 4. **Partial results survive** - timeouts and crashes return what ran

pub mod check;
pub mod cli;
pub mod config;
pub mod core;
pub mod report;
pub mod sandbox;
pub mod testing;

pub use check::suite::{register, resolve, CheckSuite};
pub use check::types::{
    AssertionError, Check, CheckId, CheckResult, ErrorKind, Gate, GateCondition, Verdict,
};
pub use config::{HarnessConfig, HarnessError, Result};
pub use core::monitor::{run_checks, run_supervised};
pub use core::types::WorkerSpec;
pub use report::RunReport;
