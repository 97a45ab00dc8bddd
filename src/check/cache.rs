//! Per-run memoization of check results.
//!
//! A check reachable through several dependency chains executes once; later
//! reaches are served from here. The cache never outlives a run: the worker
//! clears it at run start and run end.

use std::collections::HashMap;

use crate::check::types::{CheckId, CheckResult};

#[derive(Default)]
pub struct RunCache {
    results: HashMap<CheckId, CheckResult>,
}

impl RunCache {
    pub fn new() -> Self {
        RunCache {
            results: HashMap::new(),
        }
    }

    pub fn get(&self, id: &CheckId) -> Option<&CheckResult> {
        self.results.get(id)
    }

    pub fn put(&mut self, id: CheckId, result: CheckResult) {
        self.results.insert(id, result);
    }

    pub fn contains(&self, id: &CheckId) -> bool {
        self.results.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
