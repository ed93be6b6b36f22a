//! Live parameter store.
//!
//! Single writer (the protocol engine), any number of readers (the operator
//! CLI). Each update replaces one entry atomically under the write lock, so
//! a reader sees either the previous or the new value, never a torn one.
//! Lookups return `None` for never-seen names rather than any default.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::decode::ParamValue;

/// Last-known value for one parameter, with bookkeeping about when it was
/// decoded.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterEntry {
    pub value: ParamValue,
    pub updated_at: DateTime<Utc>,
    /// Monotonic update counter across the whole store.
    pub seq: u64,
}

#[derive(Default)]
struct Inner {
    params: HashMap<String, ParameterEntry>,
    seq: u64,
}

/// Cheaply clonable handle to the shared map.
#[derive(Clone, Default)]
pub struct ParameterStore {
    inner: Arc<RwLock<Inner>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value for `name`. Always succeeds.
    pub fn update(&self, name: &str, value: ParamValue) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.seq += 1;
        let entry = ParameterEntry {
            value,
            updated_at: Utc::now(),
            seq: guard.seq,
        };
        guard.params.insert(name.to_string(), entry);
    }

    /// Apply one frame's worth of decoded updates under a single lock
    /// acquisition. Duplicate names overwrite in order.
    pub fn apply(&self, updates: Vec<(&'static str, ParamValue)>) {
        if updates.is_empty() {
            return;
        }
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        for (name, value) in updates {
            guard.seq += 1;
            let entry = ParameterEntry {
                value,
                updated_at: now,
                seq: guard.seq,
            };
            guard.params.insert(name.to_string(), entry);
        }
    }

    /// Point lookup. `None` means the parameter has never been decoded.
    pub fn get(&self, name: &str) -> Option<ParameterEntry> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.params.get(name).cloned()
    }

    /// Consistent point-in-time copy of every known parameter.
    pub fn snapshot(&self) -> HashMap<String, ParameterEntry> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.params.clone()
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
