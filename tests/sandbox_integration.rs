//! Sandbox isolation through the real process boundary, plus the lifecycle
//! pieces that only make sense against a live filesystem.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use gradebox::sandbox::{SandboxConfig, SandboxDir};
use gradebox::{run_supervised, HarnessConfig, RunReport, WorkerSpec};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gradebox"))
}

fn config(workspace: &Path) -> HarnessConfig {
    HarnessConfig {
        worker_program: Some(binary()),
        workspace_root: workspace.to_path_buf(),
        ..Default::default()
    }
}

fn run(suite: &str, artifact: &Path, workspace: &Path) -> RunReport {
    let config = config(workspace);
    let spec = WorkerSpec::from_config(suite, artifact, &config);
    run_supervised(spec, &config).unwrap()
}

// tests that read or move the process working directory must not overlap
static CWD_LOCK: Mutex<()> = Mutex::new(());

fn cwd_guard() -> MutexGuard<'static, ()> {
    CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct NoFetch;

impl gradebox::sandbox::Fetcher for NoFetch {
    fn fetch(&mut self, _source: &str, _dest: &Path) -> gradebox::Result<()> {
        panic!("no downloads expected in this test");
    }
}

#[test]
fn test_check_writes_do_not_escape_the_sandbox() {
    let _guard = cwd_guard();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("program.txt"), "print('hello')\n").unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let caller_cwd = std::env::current_dir().unwrap();

    let report = run(
        "selftest-sandbox-write",
        &dir.path().join("program.txt"),
        workspace.path(),
    );

    assert!(report.succeeded(), "{}", report.render_plain());
    // the scratch file the check created stayed in the sandbox
    assert!(!dir.path().join("scratch.txt").exists());
    // the caller's working directory never moved
    assert_eq!(std::env::current_dir().unwrap(), caller_cwd);
    // normal completion tears the run directory down
    let leftovers: Vec<_> = fs::read_dir(workspace.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "leftover run dirs: {leftovers:?}");
}

#[test]
fn test_excluded_file_is_invisible_to_checks() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("program.txt"), "print('hello')\n").unwrap();
    fs::write(dir.path().join("secret.txt"), "answer key").unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let report = run(
        "selftest-sandbox-exclude",
        &dir.path().join("program.txt"),
        workspace.path(),
    );

    assert!(report.succeeded(), "{}", report.render_plain());
    // excluding never deletes from the caller's directory
    assert!(dir.path().join("secret.txt").is_file());
}

#[test]
fn test_forced_kill_leaves_an_orphan_that_sweep_removes() {
    let _guard = cwd_guard();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("program.txt"), "print('hello')\n").unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let caller_cwd = std::env::current_dir().unwrap();

    let harness_config = config(workspace.path());
    let spec = WorkerSpec::from_config(
        "selftest-budget",
        &dir.path().join("program.txt"),
        &harness_config,
    );
    let run_id = spec.run_id.clone();
    let report = run_supervised(spec, &harness_config).unwrap();
    assert!(report.cut_short());

    // SIGKILL gave the worker no chance to tear down; the supervisor's own
    // directory is untouched and the orphan is left for the sweep
    assert_eq!(std::env::current_dir().unwrap(), caller_cwd);
    assert!(workspace.path().join(&run_id).is_dir());

    let removed = SandboxDir::sweep(workspace.path(), Duration::ZERO).unwrap();
    assert_eq!(removed, 1);
    assert!(!workspace.path().join(&run_id).exists());
}

#[test]
fn test_enter_restores_the_working_directory_on_drop() {
    let _guard = cwd_guard();
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("a.txt"), "a").unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let before = std::env::current_dir().unwrap();

    let sandbox_config = SandboxConfig::snapshot(source.path()).unwrap();
    let mut sandbox = SandboxDir::materialize(
        &sandbox_config,
        source.path(),
        workspace.path(),
        "cwd-restore",
        Box::new(NoFetch),
    )
    .unwrap();
    let run_dir = sandbox.path().to_path_buf();

    sandbox.enter().unwrap();
    assert_eq!(
        std::env::current_dir().unwrap().canonicalize().unwrap(),
        run_dir.canonicalize().unwrap()
    );

    drop(sandbox);
    assert_eq!(std::env::current_dir().unwrap(), before);
    assert!(!run_dir.exists());
}
