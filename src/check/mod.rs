//! Check model, suites, scheduling and per-run caching.
//!
//! A check is a named verification with a priority, a wall-clock budget,
//! dependencies and an optional gate. Suites collect checks plus setup and
//! teardown hooks; the scheduler expands them into a dependency-respecting
//! execution order; the cache guarantees each check runs at most once per
//! run.

pub mod cache;
pub mod scheduler;
pub mod suite;
pub mod types;
