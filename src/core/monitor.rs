//! The supervising side of a run.
//!
//! Spawns the worker as its own process group, drains its message channel on
//! a fixed cadence, and enforces the budget the worker last announced. A
//! budget overrun is answered with SIGTERM, a short grace, then SIGKILL to
//! the whole group; the report then carries a synthesized timeout result. A
//! worker that dies without a final summary yields a supervisor-error
//! report, never a silent empty one.

use log::{debug, info, warn};
use nix::unistd::Pid;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::check::types::{CheckId, CheckResult, ErrorKind};
use crate::config::{HarnessConfig, HarnessError, Result};
use crate::core::channel::{create_pipe, MessageReceiver};
use crate::core::output::StreamCapture;
use crate::core::types::{KillReport, RunSummary, Signal, WorkerMessage, WorkerSpec};
use crate::report::RunReport;

/// Run a registered suite against an artifact with default settings.
pub fn run_checks(suite: &str, artifact: &Path) -> Result<RunReport> {
    let config = HarnessConfig::default();
    let spec = WorkerSpec::from_config(suite, artifact, &config);
    run_supervised(spec, &config)
}

/// Monitoring state fed by drained signals. Kept free of process handles so
/// the arming rules are testable with plain instants.
struct MonitorState {
    description: String,
    timeout: Duration,
    armed: bool,
    window_start: Instant,
    declared: Option<usize>,
}

impl MonitorState {
    /// The window starts armed: a worker that hangs before its first
    /// announcement is still bounded by the default budget.
    fn new(default_timeout: Duration, now: Instant) -> Self {
        MonitorState {
            description: "suite setup".to_string(),
            timeout: default_timeout,
            armed: true,
            window_start: now,
            declared: None,
        }
    }

    fn apply_signal(&mut self, signal: &Signal, now: Instant) {
        if let Some(description) = &signal.description {
            self.description = description.clone();
        }
        if let Some(timeout_ms) = signal.timeout_ms {
            self.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(total) = signal.total_checks {
            self.declared = Some(total);
        }
        if signal.reset_timer {
            self.armed = true;
            self.window_start = now;
        }
    }

    /// A result ends the current window; the next announcement rearms.
    fn disarm(&mut self) {
        self.armed = false;
    }

    fn expired(&self, now: Instant) -> bool {
        self.armed && now.saturating_duration_since(self.window_start) > self.timeout
    }
}

/// Run the worker described by `spec` to completion and assemble its report.
/// Always returns: normal completion, budget overrun and worker death all
/// produce a report.
pub fn run_supervised(spec: WorkerSpec, config: &HarnessConfig) -> Result<RunReport> {
    config.validate()?;
    std::fs::create_dir_all(&config.workspace_root)?;

    let program = match &config.worker_program {
        Some(program) => program.clone(),
        None => std::env::current_exe()
            .map_err(|e| HarnessError::Process(format!("cannot locate own executable: {e}")))?,
    };

    let (read_fd, write_fd) = create_pipe()?;

    let spawned = Command::new(&program)
        .arg("--internal-role")
        .arg("worker")
        .arg("--channel-fd")
        .arg(write_fd.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let _ = nix::unistd::close(read_fd);
            let _ = nix::unistd::close(write_fd);
            return Err(HarnessError::Process(format!(
                "failed to spawn worker {}: {e}",
                program.display()
            )));
        }
    };
    // the worker owns its copy of the write end; ours must go so the reader
    // sees EOF once the worker is gone
    let _ = nix::unistd::close(write_fd);

    debug!("spawned worker pid {} for run {}", child.id(), spec.run_id);

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(&spec)?;
        // a worker that died already will surface through the exit path
        let _ = stdin.write_all(&payload);
    }

    let stdout_capture = StreamCapture::spawn(
        child.stdout.take().expect("stdout was piped"),
        config.transcript_limit,
    );
    let stderr_capture = StreamCapture::spawn(
        child.stderr.take().expect("stderr was piped"),
        config.transcript_limit,
    );
    let mut receiver = MessageReceiver::spawn(read_fd);

    let started = Instant::now();
    let mut state = MonitorState::new(config.default_timeout, started);
    let mut results: Vec<CheckResult> = Vec::new();
    let mut summary: Option<RunSummary> = None;
    let mut notes: Vec<String> = Vec::new();
    let mut kill_report: Option<KillReport> = None;
    let mut timed_out = false;
    let mut exit_status = None;

    loop {
        while let Some(message) = receiver.try_recv() {
            apply_message(message, &mut state, &mut results, &mut summary);
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                exit_status = Some(status);
                for message in receiver.finish() {
                    apply_message(message, &mut state, &mut results, &mut summary);
                }
                break;
            }
            Ok(None) => {
                let now = Instant::now();
                if state.expired(now) {
                    timed_out = true;
                    let elapsed = now.saturating_duration_since(state.window_start);
                    info!(
                        "budget exhausted after {elapsed:?} during '{}', killing worker",
                        state.description
                    );
                    let report = terminate_worker_group(Pid::from_raw(child.id() as i32));
                    notes.extend(report.notes.iter().cloned());
                    kill_report = Some(report);
                    let _ = child.wait();
                    // keep whatever the worker managed to send first
                    for message in receiver.finish() {
                        apply_message(message, &mut state, &mut results, &mut summary);
                    }
                    results.push(CheckResult::error(
                        CheckId::new("timeout"),
                        state.description.clone(),
                        format!(
                            "timeout ({}) reached during: {}",
                            format_budget(state.timeout),
                            state.description
                        ),
                        ErrorKind::Timeout,
                    ));
                    break;
                }
                std::thread::sleep(config.poll_interval);
            }
            Err(e) => {
                return Err(HarnessError::Process(format!("wait on worker failed: {e}")))
            }
        }
    }

    let attempted = summary.map(|s| s.executed).unwrap_or_else(|| {
        results
            .iter()
            .filter(|r| r.passed.is_some() && r.error_kind != Some(ErrorKind::Timeout))
            .count()
    });

    if !timed_out && summary.is_none() {
        let status = exit_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        warn!("worker exited without a final report ({status})");
        results.push(CheckResult::error(
            CheckId::new("supervisor"),
            state.description.clone(),
            format!("worker exited without a final report ({status})"),
            ErrorKind::SupervisorError,
        ));
    }

    let declared = summary
        .map(|s| s.declared)
        .or(state.declared)
        .unwrap_or_else(|| results.len());
    let passed = results.iter().filter(|r| r.passed == Some(true)).count();
    let failed = results.iter().filter(|r| r.passed == Some(false)).count();

    let mut transcript = Vec::new();
    for (label, capture) in [("stdout", stdout_capture), ("stderr", stderr_capture)] {
        let captured = capture.finish();
        transcript.extend(captured.lines);
        if captured.truncated {
            transcript.push(format!("[{label} truncated]"));
        }
    }
    if timed_out {
        transcript.push(format!(
            "run cut short: {attempted} of {declared} checks ran"
        ));
    }
    if let Some(report) = &kill_report {
        debug!(
            "worker killed: term={} kill={} waited={}ms",
            report.term_sent, report.kill_sent, report.waited_ms
        );
    }
    transcript.extend(notes);

    Ok(RunReport {
        run_id: spec.run_id,
        declared,
        attempted,
        passed,
        failed,
        results,
        transcript,
        wall_time_ms: started.elapsed().as_millis() as u64,
    })
}

fn apply_message(
    message: WorkerMessage,
    state: &mut MonitorState,
    results: &mut Vec<CheckResult>,
    summary: &mut Option<RunSummary>,
) {
    match message {
        WorkerMessage::Signal(signal) => state.apply_signal(&signal, Instant::now()),
        WorkerMessage::Result(result) => {
            state.disarm();
            results.push(result);
        }
        WorkerMessage::Done(done) => *summary = Some(done),
    }
}

/// TERM the worker's process group, give it a short grace, then KILL.
fn terminate_worker_group(worker_pid: Pid) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();

    let term_rc = unsafe { libc::kill(-worker_pid.as_raw(), libc::SIGTERM) };
    if term_rc == 0 {
        report.term_sent = true;
    } else {
        let term_err = std::io::Error::last_os_error();
        let _ = unsafe { libc::kill(worker_pid.as_raw(), libc::SIGTERM) };
        report.term_sent = true;
        report.notes.push(format!(
            "could not SIGTERM the worker's process group ({term_err}); signaled the worker pid alone"
        ));
    }

    std::thread::sleep(Duration::from_millis(200));

    let kill_rc = unsafe { libc::kill(-worker_pid.as_raw(), libc::SIGKILL) };
    if kill_rc == 0 {
        report.kill_sent = true;
    } else {
        let kill_err = std::io::Error::last_os_error();
        let _ = unsafe { libc::kill(worker_pid.as_raw(), libc::SIGKILL) };
        report.kill_sent = true;
        report.notes.push(format!(
            "could not SIGKILL the worker's process group ({kill_err}); signaled the worker pid alone"
        ));
    }

    report.waited_ms = start.elapsed().as_millis() as u64;
    report
}

fn format_budget(budget: Duration) -> String {
    if budget.subsec_millis() == 0 {
        format!("{}s", budget.as_secs())
    } else {
        format!("{:.1}s", budget.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, offset_ms: u64) -> Instant {
        base + Duration::from_millis(offset_ms)
    }

    #[test]
    fn test_starts_armed_with_the_default_budget() {
        let base = Instant::now();
        let state = MonitorState::new(Duration::from_secs(2), base);
        assert!(!state.expired(at(base, 1_900)));
        assert!(state.expired(at(base, 2_100)));
    }

    #[test]
    fn test_announcement_arms_a_fresh_window() {
        let base = Instant::now();
        let mut state = MonitorState::new(Duration::from_secs(10), base);
        state.apply_signal(
            &Signal::announce("uses a loop", Duration::from_secs(1)),
            at(base, 500),
        );
        assert_eq!(state.description, "uses a loop");
        assert!(!state.expired(at(base, 1_400)));
        assert!(state.expired(at(base, 1_600)));
    }

    #[test]
    fn test_result_disarms_the_window() {
        let base = Instant::now();
        let mut state = MonitorState::new(Duration::from_secs(1), base);
        state.apply_signal(&Signal::announce("quick", Duration::from_secs(1)), base);
        state.disarm();
        assert!(!state.expired(at(base, 60_000)));
    }

    #[test]
    fn test_timeout_change_restarts_from_the_moment_of_change() {
        let base = Instant::now();
        let mut state = MonitorState::new(Duration::from_secs(10), base);
        state.apply_signal(&Signal::announce("slow", Duration::from_secs(1)), base);
        // 800ms in, the check grants itself three more seconds
        state.apply_signal(
            &Signal::timeout_update(Duration::from_secs(3)),
            at(base, 800),
        );
        // old budget would have tripped at 1s; new window runs to 3.8s
        assert!(!state.expired(at(base, 1_500)));
        assert!(!state.expired(at(base, 3_700)));
        assert!(state.expired(at(base, 3_900)));
    }

    #[test]
    fn test_description_change_keeps_the_running_window() {
        let base = Instant::now();
        let mut state = MonitorState::new(Duration::from_secs(10), base);
        state.apply_signal(&Signal::announce("first", Duration::from_secs(1)), base);
        state.apply_signal(&Signal::description_update("first, renamed"), at(base, 900));
        assert_eq!(state.description, "first, renamed");
        // window still counts from the announcement
        assert!(state.expired(at(base, 1_100)));
    }

    #[test]
    fn test_declared_count_is_recorded() {
        let base = Instant::now();
        let mut state = MonitorState::new(Duration::from_secs(1), base);
        state.apply_signal(&Signal::declared(7), base);
        assert_eq!(state.declared, Some(7));
        // the declared signal itself does not rearm
        state.disarm();
        state.apply_signal(&Signal::declared(7), at(base, 10));
        assert!(!state.expired(at(base, 60_000)));
    }

    #[test]
    fn test_budget_formatting() {
        assert_eq!(format_budget(Duration::from_secs(2)), "2s");
        assert_eq!(format_budget(Duration::from_millis(1_500)), "1.5s");
    }
}
