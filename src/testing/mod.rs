//! Executable self-checks.
//!
//! Small deterministic suites the binary registers at startup; the
//! integration tests drive the real two-process path through them.

pub mod suites;
