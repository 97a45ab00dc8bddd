//! Bounded capture of worker stdout and stderr.
//!
//! Whatever a check prints belongs in the report transcript, not on the
//! supervisor's own streams. Each stream gets a collector thread with a byte
//! cap; past the cap lines are dropped but the stream is still drained so
//! the worker never blocks on a full pipe.

use log::warn;
use std::io::{BufRead, BufReader, Read};
use std::thread;

/// Lines collected from one stream.
#[derive(Clone, Debug, Default)]
pub struct CapturedStream {
    pub lines: Vec<String>,
    pub truncated: bool,
    pub bytes: usize,
}

/// Handle to a running collector thread.
pub struct StreamCapture {
    handle: thread::JoinHandle<CapturedStream>,
}

impl StreamCapture {
    pub fn spawn<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let handle = thread::spawn(move || {
            let mut captured = CapturedStream::default();
            for line in BufReader::new(stream).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                if captured.bytes + line.len() > limit {
                    captured.truncated = true;
                    // keep draining to EOF without storing
                    continue;
                }
                captured.bytes += line.len();
                captured.lines.push(line);
            }
            captured
        });
        StreamCapture { handle }
    }

    /// Join the collector. Call after the stream's writer is gone.
    pub fn finish(self) -> CapturedStream {
        match self.handle.join() {
            Ok(captured) => captured,
            Err(_) => {
                warn!("output collector thread panicked");
                CapturedStream {
                    truncated: true,
                    ..Default::default()
                }
            }
        }
    }
}
