//! Probe arrays: the shared-mutable hot path.
//!
//! A `ProbeArray` is a fixed-length vector of execution flags for one class.
//! All threads of a recording context write into the same array, and a bit
//! only ever transitions false to true, so concurrent writes are an
//! idempotent OR. Relaxed atomics make that benign race defined behavior;
//! cross-thread visibility for the shipping side is established by the data
//! pool's release/drain locking, not by the stores themselves.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Fixed-length vector of monotonic execution flags for one class.
///
/// Never resized after construction. `set` is the hot path invoked on every
/// instrumented branch and must not panic, block, or allocate.
pub struct ProbeArray {
    bits: Box<[AtomicBool]>,
}

impl ProbeArray {
    /// Create an array with `probe_count` flags, all unset.
    #[must_use]
    pub fn new(probe_count: usize) -> Self {
        let mut bits = Vec::with_capacity(probe_count);
        bits.resize_with(probe_count, AtomicBool::default);
        Self {
            bits: bits.into_boxed_slice(),
        }
    }

    /// Rebuild an array from a snapshot, used when publishing deltas.
    #[must_use]
    pub fn from_snapshot(snapshot: &[bool]) -> Self {
        let array = Self::new(snapshot.len());
        for (index, covered) in snapshot.iter().enumerate() {
            if *covered {
                array.bits[index].store(true, Ordering::Relaxed);
            }
        }
        array
    }

    /// The process-wide stub array served to unregistered classes.
    ///
    /// Zero-length, so every `set` is out of bounds and absorbed silently.
    /// Instrumented code always receives a usable reference, never an error.
    #[must_use]
    pub fn stub() -> Arc<Self> {
        static STUB: OnceLock<Arc<ProbeArray>> = OnceLock::new();
        Arc::clone(STUB.get_or_init(|| Arc::new(Self::new(0))))
    }

    /// Mark probe `index` as executed.
    ///
    /// Out-of-range indices are ignored. The load-before-store keeps
    /// already-set probes from generating cache coherence traffic on the
    /// hot path.
    #[inline]
    pub fn set(&self, index: usize) {
        if let Some(bit) = self.bits.get(index) {
            if !bit.load(Ordering::Relaxed) {
                bit.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Read probe `index`; out-of-range reads are false.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.bits
            .get(index)
            .is_some_and(|bit| bit.load(Ordering::Relaxed))
    }

    /// Number of probes in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True for the zero-length stub.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether at least one probe has been executed.
    ///
    /// All-false coverage is never shipped, so this is checked before any
    /// datum leaves the recording side.
    #[must_use]
    pub fn has_coverage(&self) -> bool {
        self.bits.iter().any(|bit| bit.load(Ordering::Relaxed))
    }

    /// Number of executed probes.
    #[must_use]
    pub fn covered_count(&self) -> usize {
        self.bits
            .iter()
            .filter(|bit| bit.load(Ordering::Relaxed))
            .count()
    }

    /// Copy the current flags into an owned snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<bool> {
        self.bits
            .iter()
            .map(|bit| bit.load(Ordering::Relaxed))
            .collect()
    }
}

impl fmt::Debug for ProbeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeArray")
            .field("len", &self.len())
            .field("covered", &self.covered_count())
            .finish()
    }
}
