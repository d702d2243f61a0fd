//! First/repeat access classification per backend.
//!
//! The tracker estimates cache behavior from access order alone: the first
//! time a route is observed for a backend it is miss-likely, every later
//! observation is hit-likely. If the backends ever expose real cache
//! telemetry, this estimator is the fallback, not ground truth.

use crate::config::BackendId;
use std::collections::HashSet;
use std::sync::Mutex;

/// Classification of one access to a route on one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Route observed for the first time this run: cache-miss-likely.
    First,
    /// Route observed again: cache-hit-likely.
    Repeat,
}

impl Access {
    pub fn label(self) -> &'static str {
        match self {
            Access::First => "miss",
            Access::Repeat => "hit",
        }
    }
}

/// Tracks which routes each backend has already served this run.
///
/// One set per backend, so the two hit/miss sequences are measured
/// independently even though both backends receive the identical routes.
pub struct AccessTracker {
    seen: [Mutex<HashSet<String>>; 2],
}

impl AccessTracker {
    pub fn new() -> Self {
        Self {
            seen: [Mutex::new(HashSet::new()), Mutex::new(HashSet::new())],
        }
    }

    /// Record an access and classify it.
    ///
    /// The check and the insert are a single `HashSet::insert` under the
    /// lock, so for a given backend and route exactly one caller observes
    /// [`Access::First`] across the whole run, no matter how many workers
    /// race on the same key.
    pub fn record_and_classify(&self, backend: BackendId, route_key: &str) -> Access {
        let mut seen = self.seen[backend.index()]
            .lock()
            .expect("access set lock poisoned");
        if seen.insert(route_key.to_string()) {
            Access::First
        } else {
            Access::Repeat
        }
    }

    /// Distinct routes observed so far for a backend.
    pub fn unique_routes(&self, backend: BackendId) -> usize {
        self.seen[backend.index()]
            .lock()
            .expect("access set lock poisoned")
            .len()
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new()
    }
}
