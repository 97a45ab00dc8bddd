//! The built-in self-check suites.
//!
//! Each suite exercises one harness property end to end: ordering and
//! execute-once, budget enforcement, mid-run budget extension, gating,
//! sandbox isolation, missing required files, and a worker crash. Checks
//! that need to prove something to the outside write to the marker file
//! named by `GRADEBOX_MARKER`, one line per event, so a test on the
//! supervisor side can read back what happened inside the sandbox.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::check::suite::{self, CheckSuite};
use crate::check::types::{Check, Verdict};

/// Env var naming the marker file self-check suites append to.
pub const MARKER_ENV: &str = "GRADEBOX_MARKER";

/// Register every built-in suite, once.
pub fn register_builtin() {
    for build in [
        basics,
        budget,
        budget_extension,
        gating,
        sandbox_write,
        sandbox_exclude,
        require_midrun,
        missing_required,
        crash,
    ] {
        let built = build();
        if suite::resolve(built.name()).is_none() {
            suite::register(built);
        }
    }
}

fn mark(event: &str) {
    if let Ok(path) = std::env::var(MARKER_ENV) {
        let opened = OpenOptions::new().create(true).append(true).open(path);
        if let Ok(mut file) = opened {
            let _ = writeln!(file, "{event}");
        }
    }
}

/// Priorities, dependencies and execute-once: `b` and `c` both depend on
/// `a`; the marker file must show `a` exactly once, first.
fn basics() -> CheckSuite {
    CheckSuite::new("selftest-basics")
        .check(
            Check::new("a", "the artifact is present", |ctx| {
                mark("a");
                if Path::new(ctx.artifact_name()).is_file() {
                    Ok(Verdict::pass())
                } else {
                    Ok(Verdict::fail("artifact missing from the sandbox"))
                }
            })
            .priority(0),
        )
        .check(
            Check::new("b", "b runs after a", |ctx| {
                mark("b");
                ctx.set_description("b ran against the artifact");
                Ok(Verdict::pass())
            })
            .priority(1)
            .depends_on(&["a"]),
        )
        .check(
            Check::new("c", "c runs after a", |_ctx| {
                mark("c");
                Ok(Verdict::pass())
            })
            .priority(2)
            .depends_on(&["a"]),
        )
}

/// One check that blocks far past its one-second budget.
fn budget() -> CheckSuite {
    CheckSuite::new("selftest-budget").check(
        Check::new("sleepy", "finishes within one second", |_ctx| {
            thread::sleep(Duration::from_secs(5));
            Ok(Verdict::pass())
        })
        .timeout(Duration::from_secs(1)),
    )
}

/// A check that outlives its original budget by granting itself more time
/// mid-run; the extension counts from the moment of the change.
fn budget_extension() -> CheckSuite {
    CheckSuite::new("selftest-budget-extension").check(
        Check::new("extender", "takes longer than first planned", |ctx| {
            thread::sleep(Duration::from_millis(700));
            ctx.set_timeout(Duration::from_secs(3));
            thread::sleep(Duration::from_millis(1_200));
            Ok(Verdict::pass())
        })
        .timeout(Duration::from_secs(1)),
    )
}

/// Gating in all three shapes: met gate runs, unmet visible gate reports
/// unknown, unmet hidden gate disappears.
fn gating() -> CheckSuite {
    CheckSuite::new("selftest-gating")
        .check(Check::new("failing", "this check always fails", |_ctx| {
            Ok(Verdict::fail("deliberate failure"))
        }))
        .check(Check::new("passing", "this check always passes", |_ctx| {
            Ok(Verdict::pass())
        }))
        .check(
            Check::new("recovers", "runs because the failure happened", |_ctx| {
                mark("recovers");
                Ok(Verdict::pass())
            })
            .runs_if_failed(&["failing"]),
        )
        .check(
            Check::new("needs-failure", "would only run if passing failed", |_ctx| {
                mark("needs-failure");
                Ok(Verdict::pass())
            })
            .runs_if_failed(&["passing"]),
        )
        .check(
            Check::new("hidden-needs-failure", "hidden and never run", |_ctx| {
                mark("hidden-needs-failure");
                Ok(Verdict::pass())
            })
            .runs_if_failed(&["passing"])
            .hidden(),
        )
}

/// Writes stay inside the sandbox; the caller's directory is untouched.
fn sandbox_write() -> CheckSuite {
    CheckSuite::new("selftest-sandbox-write").check(Check::new(
        "writes",
        "can write scratch files",
        |_ctx| {
            std::fs::write("scratch.txt", "scratch")?;
            if Path::new("scratch.txt").is_file() {
                Ok(Verdict::pass())
            } else {
                Ok(Verdict::fail("scratch file did not appear"))
            }
        },
    ))
}

/// A file excluded at setup is invisible to the checks.
fn sandbox_exclude() -> CheckSuite {
    CheckSuite::new("selftest-sandbox-exclude")
        .before(|ctx| ctx.exclude(&["secret.txt"]))
        .check(Check::new(
            "no-secret",
            "the secret file is not visible",
            |_ctx| {
                if Path::new("secret.txt").exists() {
                    Ok(Verdict::fail("secret.txt leaked into the sandbox"))
                } else {
                    Ok(Verdict::pass())
                }
            },
        ))
}

/// A check that requires an absent file mid-run. The failure stays on that
/// check; later checks and the teardown hook are unaffected.
fn require_midrun() -> CheckSuite {
    CheckSuite::new("selftest-require-midrun")
        .after(|_ctx| Ok(()))
        .check(Check::new("needs-ghost", "needs a file that is absent", |ctx| {
            ctx.require(&["ghost.txt"])?;
            Ok(Verdict::pass())
        }))
        .check(Check::new("still-runs", "runs despite the earlier failure", |_ctx| {
            Ok(Verdict::pass())
        }))
}

/// Both missing required files must be named before any check runs.
fn missing_required() -> CheckSuite {
    CheckSuite::new("selftest-missing-required")
        .before(|ctx| ctx.require(&["required-one.txt", "required-two.txt"]))
        .check(Check::new("never-runs", "never reached", |_ctx| {
            mark("never-runs");
            Ok(Verdict::pass())
        }))
}

/// The worker dies without a final report.
fn crash() -> CheckSuite {
    CheckSuite::new("selftest-crash").check(Check::new(
        "crashes",
        "takes the worker down",
        |_ctx| std::process::exit(86),
    ))
}
