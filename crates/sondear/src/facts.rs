//! Per-method coverage facts and paging.
//!
//! At send time a class's flat probe array is sliced into one fact per
//! method using the registered probe ranges. Methods with no covered probe
//! in their range are omitted; a class without registered method ranges
//! degrades to a single whole-class fact so its coverage is not lost.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::descriptor::MethodDescriptor;
use crate::exec::ExecDatum;

/// Signature used for the whole-class fallback fact.
const WHOLE_CLASS_SIGNATURE: &str = "*";

/// Coverage of one method within one recording context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCoverage {
    /// Fully qualified class name
    pub class_name: String,
    /// Method signature, or `*` for the whole-class fallback
    pub signature: String,
    /// Method body checksum as registered, empty for the fallback
    pub checksum: String,
    /// Session the coverage is attributed to
    pub session_id: String,
    /// Test the coverage is attributed to
    pub test_id: String,
    /// Probe flags for the method's range
    pub probes: Vec<bool>,
}

/// One transport page of coverage facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveragePage {
    /// Facts in this page
    pub facts: Vec<MethodCoverage>,
}

/// Slice a datum's probe array into per-method facts.
///
/// Only methods with at least one covered probe in their range produce a
/// fact. A method range that falls outside the array indicates descriptor
/// corruption; it is logged and skipped, never propagated.
#[must_use]
pub fn facts_for(datum: &ExecDatum, methods: &[MethodDescriptor]) -> Vec<MethodCoverage> {
    let snapshot = datum.probes.snapshot();
    if methods.is_empty() {
        if snapshot.iter().any(|covered| *covered) {
            return vec![MethodCoverage {
                class_name: datum.class_name.clone(),
                signature: WHOLE_CLASS_SIGNATURE.to_string(),
                checksum: String::new(),
                session_id: datum.session_id.clone(),
                test_id: datum.test_id.clone(),
                probes: snapshot,
            }];
        }
        return Vec::new();
    }

    let mut facts = Vec::new();
    for method in methods {
        let range = method.probe_range_start..method.probe_range_start + method.probe_range_count;
        let Some(slice) = snapshot.get(range) else {
            error!(
                class_id = datum.class_id,
                signature = %method.signature,
                probe_count = snapshot.len(),
                range_start = method.probe_range_start,
                range_count = method.probe_range_count,
                "method probe range outside class probe array, skipping"
            );
            continue;
        };
        if slice.iter().any(|covered| *covered) {
            facts.push(MethodCoverage {
                class_name: datum.class_name.clone(),
                signature: method.signature.clone(),
                checksum: method.checksum.clone(),
                session_id: datum.session_id.clone(),
                test_id: datum.test_id.clone(),
                probes: slice.to_vec(),
            });
        }
    }
    facts
}

/// Batch facts into pages of at most `page_size` facts each.
#[must_use]
pub fn paginate(facts: Vec<MethodCoverage>, page_size: usize) -> Vec<CoveragePage> {
    let size = page_size.max(1);
    facts
        .chunks(size)
        .map(|chunk| CoveragePage {
            facts: chunk.to_vec(),
        })
        .collect()
}
