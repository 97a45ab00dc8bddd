//! The execution core: supervisor and worker halves of a run.
//!
//! The monitor spawns the worker as a separate OS process and enforces
//! budgets from outside; the worker runs the scheduled checks inside the
//! sandbox and streams Signals and Results back over the channel.

pub mod channel;
pub mod context;
pub mod monitor;
pub mod output;
pub mod types;
pub mod worker;
