//! Line-framed JSON transport for worker messages.
//!
//! The worker inherits the write end of a pipe and emits one JSON-encoded
//! [`WorkerMessage`] per line. On the supervisor side a reader thread parses
//! lines as they arrive and forwards them over a crossbeam channel, so the
//! poll loop can drain without ever blocking. Message order within the pipe
//! is preserved end to end.

use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::os::fd::FromRawFd;
use std::os::unix::io::RawFd;
use std::thread;

use crate::check::types::CheckResult;
use crate::config::{HarnessError, Result};
use crate::core::types::{RunSummary, Signal, WorkerMessage};

/// Create the message pipe. Returns `(read_fd, write_fd)`; the write end is
/// inherited by the worker, the read end stays with the supervisor.
pub fn create_pipe() -> Result<(RawFd, RawFd)> {
    let (read_fd, write_fd) = nix::unistd::pipe()?;
    Ok((read_fd, write_fd))
}

/// Worker-side writer that owns the inherited channel fd.
pub struct MessageWriter {
    file: File,
}

impl MessageWriter {
    /// Take ownership of the inherited pipe fd. The fd must be open and not
    /// used anywhere else in the process afterwards.
    pub fn from_raw_fd(fd: RawFd) -> Self {
        let file = unsafe { File::from_raw_fd(fd) };
        MessageWriter { file }
    }

    pub fn send(&mut self, message: &WorkerMessage) -> Result<()> {
        let mut payload = serde_json::to_vec(message)
            .map_err(|e| HarnessError::Channel(format!("failed to encode message: {e}")))?;
        payload.push(b'\n');
        self.file.write_all(&payload)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn signal(&mut self, signal: Signal) -> Result<()> {
        self.send(&WorkerMessage::Signal(signal))
    }

    pub fn result(&mut self, result: CheckResult) -> Result<()> {
        self.send(&WorkerMessage::Result(result))
    }

    pub fn done(&mut self, summary: RunSummary) -> Result<()> {
        self.send(&WorkerMessage::Done(summary))
    }
}

/// Supervisor-side receiver backed by a reader thread.
pub struct MessageReceiver {
    receiver: Receiver<WorkerMessage>,
    reader: Option<thread::JoinHandle<()>>,
}

impl MessageReceiver {
    /// Spawn the reader thread over the pipe's read end. Takes ownership of
    /// the fd.
    pub fn spawn(fd: RawFd) -> Self {
        let (tx, rx) = unbounded();
        let reader = thread::spawn(move || {
            let file = unsafe { File::from_raw_fd(fd) };
            for line in BufReader::new(file).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerMessage>(&line) {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("discarding malformed channel line: {e}"),
                }
            }
            // EOF: the worker exited or closed its end
        });
        MessageReceiver {
            receiver: rx,
            reader: Some(reader),
        }
    }

    /// Non-blocking receive; `None` once the channel is empty or closed.
    pub fn try_recv(&self) -> Option<WorkerMessage> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the reader thread to hit EOF, then drain whatever is left.
    /// Call only after the worker can no longer write (exited or killed and
    /// the supervisor's copy of the write end is closed).
    pub fn finish(&mut self) -> Vec<WorkerMessage> {
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("channel reader thread panicked");
            }
        }
        let mut remaining = Vec::new();
        while let Some(message) = self.try_recv() {
            remaining.push(message);
        }
        remaining
    }
}
