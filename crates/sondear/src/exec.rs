//! Per-context coverage holders.
//!
//! An `ExecDatum` is the unit of coverage for one class within one context;
//! an `ExecData` is a context's class-to-datum map. Application threads of
//! the same context share datums, so the map hands out cheap clones whose
//! probe arrays are `Arc`-shared.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::descriptor::{ClassId, SessionId, TestId};
use crate::probes::ProbeArray;

/// Coverage for one class within one recording context.
///
/// Cloning is cheap; the probe array is shared. After a context is released
/// for shipping, any straggler writer still inside an instrumented call
/// keeps its own `Arc` and cannot invalidate the structure.
#[derive(Debug, Clone)]
pub struct ExecDatum {
    /// Class identity
    pub class_id: ClassId,
    /// Fully qualified class name
    pub class_name: String,
    /// Shared probe flags
    pub probes: Arc<ProbeArray>,
    /// Session the coverage is attributed to
    pub session_id: SessionId,
    /// Test the coverage is attributed to
    pub test_id: TestId,
}

impl ExecDatum {
    /// Whether at least one probe has been executed.
    #[must_use]
    pub fn has_coverage(&self) -> bool {
        self.probes.has_coverage()
    }
}

/// A context's class-to-coverage map.
///
/// At most one writable `ExecData` exists per context key at any time; once
/// released into the pool it is treated as read-only by the recording side
/// and a fresh one may be created under the same key.
#[derive(Debug, Default)]
pub struct ExecData {
    entries: RwLock<HashMap<ClassId, ExecDatum>>,
}

impl ExecData {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the datum for `class_id`, creating it with `factory` on first
    /// touch. Concurrent callers for the same class receive the same datum;
    /// the read-lock fast path keeps the per-branch cost low.
    pub fn get_or_insert_with(
        &self,
        class_id: ClassId,
        factory: impl FnOnce() -> ExecDatum,
    ) -> ExecDatum {
        if let Some(datum) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class_id)
        {
            return datum.clone();
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(class_id)
            .or_insert_with(factory)
            .clone()
    }

    /// Look up a datum without creating it.
    #[must_use]
    pub fn get(&self, class_id: ClassId) -> Option<ExecDatum> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class_id)
            .cloned()
    }

    /// All datums with at least one executed probe.
    #[must_use]
    pub fn covered(&self) -> Vec<ExecDatum> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|datum| datum.has_coverage())
            .cloned()
            .collect()
    }

    /// All datums, covered or not.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ExecDatum> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of classes touched in this context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no class has been touched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
