//! Wire types exchanged between the supervising process and the worker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::check::types::CheckResult;
use crate::config::HarnessConfig;

/// Supervisor->worker launch contract, serialized over the worker's stdin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub run_id: String,
    /// Name the suite was registered under
    pub suite: String,
    /// Artifact under check; paths in check code resolve relative to its
    /// parent directory
    pub artifact: PathBuf,
    pub default_timeout_ms: u64,
    /// Root under which the run's sandbox directory is created
    pub workspace_root: PathBuf,
}

impl WorkerSpec {
    pub fn from_config(suite: &str, artifact: &Path, config: &HarnessConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            suite: suite.to_string(),
            artifact: artifact.to_path_buf(),
            default_timeout_ms: config.default_timeout.as_millis() as u64,
            workspace_root: config.workspace_root.clone(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Transient worker->supervisor state update.
///
/// Signals are consumed on arrival and never stored in the report. A signal
/// with `reset_timer` arms the supervisor's budget window from the moment it
/// is drained; any check result arriving disarms it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Signal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub reset_timer: bool,
    /// Declared check count, sent once before the first check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_checks: Option<usize>,
}

impl Signal {
    /// Announce the next unit of work and arm its budget window.
    pub fn announce(description: &str, timeout: Duration) -> Self {
        Signal {
            description: Some(description.to_string()),
            timeout_ms: Some(timeout.as_millis() as u64),
            reset_timer: true,
            total_checks: None,
        }
    }

    /// Mid-check description change; leaves the running budget untouched.
    pub fn description_update(description: &str) -> Self {
        Signal {
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    /// Mid-check budget change; the new budget runs from the moment of the
    /// change.
    pub fn timeout_update(timeout: Duration) -> Self {
        Signal {
            timeout_ms: Some(timeout.as_millis() as u64),
            reset_timer: true,
            ..Default::default()
        }
    }

    /// One-time declared-count announcement.
    pub fn declared(total: usize) -> Self {
        Signal {
            total_checks: Some(total),
            ..Default::default()
        }
    }
}

/// Final tallies emitted by the worker as its last message.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Checks the suite declares
    pub declared: usize,
    /// Checks whose verify callable actually ran
    pub executed: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Everything the worker writes to its message channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Signal(Signal),
    Result(CheckResult),
    Done(RunSummary),
}

/// Signal escalation record for the forced-termination path.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::types::{CheckId, CheckResult};

    #[test]
    fn test_worker_message_tagging() {
        let msg = WorkerMessage::Signal(Signal::announce("splits words", Duration::from_secs(2)));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"signal\""));
        assert!(json.contains("\"reset_timer\":true"));

        let msg = WorkerMessage::Done(RunSummary {
            declared: 3,
            executed: 3,
            passed: 2,
            failed: 1,
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: WorkerMessage = serde_json::from_str(&json).unwrap();
        match back {
            WorkerMessage::Done(summary) => {
                assert_eq!(summary.declared, 3);
                assert_eq!(summary.passed, 2);
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[test]
    fn test_result_message_round_trips() {
        let result = CheckResult::failed(CheckId::new("prints"), "prints a greeting", "no output");
        let json = serde_json::to_string(&WorkerMessage::Result(result)).unwrap();
        let back: WorkerMessage = serde_json::from_str(&json).unwrap();
        match back {
            WorkerMessage::Result(r) => assert_eq!(r.passed, Some(false)),
            other => panic!("expected Result, got {:?}", other),
        }
    }

    #[test]
    fn test_signal_defaults_are_inert() {
        let signal = Signal::default();
        assert!(signal.description.is_none());
        assert!(signal.timeout_ms.is_none());
        assert!(!signal.reset_timer);
    }

    #[test]
    fn test_spec_carries_run_identity() {
        let config = HarnessConfig::default();
        let spec = WorkerSpec::from_config("greeting", Path::new("hello.py"), &config);
        assert!(!spec.run_id.is_empty());
        assert_eq!(spec.suite, "greeting");
        assert_eq!(spec.default_timeout(), config.default_timeout);
    }
}
