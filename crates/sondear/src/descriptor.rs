//! Class and method descriptor registry.
//!
//! Populated once per class by the instrumentation collaborator, read on
//! every probe acquisition and at every send tick. Writes are
//! once-per-key, reads unbounded, so the maps sit behind a single
//! `RwLock` each and lookups clone small descriptor values out.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::warn;

use crate::throttle::LogThrottle;

/// Identity of an instrumented class: a content hash of the compiled unit.
pub type ClassId = u64;
/// Logical grouping of recorded executions, e.g. one test run.
pub type SessionId = String;
/// Identity of a single test within a session.
pub type TestId = String;

/// Probe metadata for one instrumented class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// Content-hash identity of the compiled unit
    pub id: ClassId,
    /// Fully qualified class name
    pub name: String,
    /// Number of probes instrumented into the class
    pub probe_count: usize,
}

/// Probe range of one method, used at send time to slice a class's flat
/// probe array into per-method coverage facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Owning class
    pub class_id: ClassId,
    /// Method signature as reported by the static analysis side
    pub signature: String,
    /// First probe index belonging to the method
    pub probe_range_start: usize,
    /// Number of probes in the method body
    pub probe_range_count: usize,
    /// Checksum of the method body, forwarded verbatim in facts
    pub checksum: String,
}

/// Immutable-after-insert registry of class and method descriptors.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    classes: RwLock<HashMap<ClassId, ClassDescriptor>>,
    methods: RwLock<HashMap<ClassId, Vec<MethodDescriptor>>>,
    unknown_log: LogThrottle,
}

impl DescriptorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class descriptor. Idempotent on the class id; in practice
    /// each id is written exactly once, at instrumentation time.
    pub fn register_class(&self, descriptor: ClassDescriptor) {
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.id, descriptor);
    }

    /// Register the method probe ranges for a class. Replaces any previous
    /// registration for the same class.
    pub fn register_methods(&self, class_id: ClassId, methods: Vec<MethodDescriptor>) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class_id, methods);
    }

    /// Look up a class descriptor.
    #[must_use]
    pub fn descriptor(&self, class_id: ClassId) -> Option<ClassDescriptor> {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class_id)
            .cloned()
    }

    /// Look up a class descriptor on the hot path, logging a throttled
    /// warning on a miss.
    ///
    /// A miss means instrumented code is running for a class that was never
    /// registered. That is a logic error on the instrumentation side, but
    /// crashing here would crash the monitored application, so the caller
    /// serves the stub array instead.
    pub(crate) fn descriptor_or_warn(
        &self,
        class_id: ClassId,
        presented_probe_count: usize,
        class_name: &str,
    ) -> Option<ClassDescriptor> {
        let found = self.descriptor(class_id);
        if found.is_none() && self.unknown_log.should_log() {
            warn!(
                class_id,
                class_name,
                presented_probe_count,
                occurrences = self.unknown_log.occurrences(),
                "probe array requested for unregistered class, serving stub"
            );
        }
        found
    }

    /// Method probe ranges for a class; empty if none were registered.
    #[must_use]
    pub fn methods(&self, class_id: ClassId) -> Vec<MethodDescriptor> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of registered classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
