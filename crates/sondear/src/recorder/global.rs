//! Ambient (global) coverage recording.
//!
//! The ambient context is perpetually writable and never released, so new
//! coverage cannot be detected by pool rotation. Instead each poll diffs
//! the live probe arrays against a last-sent snapshot and emits only the
//! delta, keeping already-reported bits out of subsequent sends while the
//! context stays open to writers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::context::{ContextCoverage, ContextKey, GLOBAL_SESSION, TEST_NONE};
use crate::descriptor::{ClassId, SessionId};
use crate::exec::{ExecData, ExecDatum};
use crate::probes::ProbeArray;
use crate::recorder::CoverageRecorder;

/// Recorder for coverage collected outside any active test session.
#[derive(Debug)]
pub struct GlobalCoverageRecorder {
    data: Arc<ExecData>,
    last_sent: Mutex<HashMap<ClassId, Vec<bool>>>,
    session_label: Mutex<SessionId>,
}

impl GlobalCoverageRecorder {
    /// Create a recorder with an empty ambient context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(ExecData::new()),
            last_sent: Mutex::new(HashMap::new()),
            session_label: Mutex::new(GLOBAL_SESSION.to_string()),
        }
    }

    /// The always-live ambient context.
    #[must_use]
    pub fn ambient_context(&self) -> ContextCoverage {
        let label = self
            .session_label
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ContextCoverage {
            context: ContextKey::new(&label, TEST_NONE),
            data: Arc::clone(&self.data),
        }
    }

    /// Attribute ambient coverage created from now on to a global session.
    /// Datums created before adoption keep their original attribution.
    pub fn adopt_session(&self, session_id: &str) {
        let mut label = self
            .session_label
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *label = session_id.to_string();
        trace!(session_id, "ambient coverage adopted by global session");
    }

    /// Revert the ambient label if `session_id` currently holds it.
    pub fn release_session(&self, session_id: &str) {
        let mut label = self
            .session_label
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *label == session_id {
            *label = GLOBAL_SESSION.to_string();
            trace!(session_id, "global session released ambient coverage");
        }
    }

    /// Diff every ambient datum against the last-sent snapshot and emit the
    /// newly covered bits, updating the snapshot as it goes.
    ///
    /// The snapshot mutex serializes the whole diff step, so concurrent
    /// pollers cannot interleave and double-report a bit.
    fn poll_deltas(&self) -> Vec<ExecDatum> {
        let mut last_sent = self
            .last_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut deltas = Vec::new();
        for datum in self.data.snapshot() {
            let current = datum.probes.snapshot();
            let sent = last_sent
                .entry(datum.class_id)
                .or_insert_with(|| vec![false; current.len()]);
            let mut delta = vec![false; current.len()];
            let mut any_new = false;
            for (index, covered) in current.iter().enumerate() {
                if *covered && !sent[index] {
                    delta[index] = true;
                    sent[index] = true;
                    any_new = true;
                }
            }
            if any_new {
                deltas.push(ExecDatum {
                    probes: Arc::new(ProbeArray::from_snapshot(&delta)),
                    ..datum
                });
            }
        }
        deltas
    }
}

impl Default for GlobalCoverageRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageRecorder for GlobalCoverageRecorder {
    // The ambient context has no lifecycle: it is live from construction to
    // process exit.
    fn start_recording(&self, _session_id: &str, _test_id: &str) {}

    fn stop_recording(&self, _session_id: &str, _test_id: &str) {}

    fn poll_recorded(&self) -> Box<dyn Iterator<Item = ExecDatum> + '_> {
        Box::new(self.poll_deltas().into_iter())
    }

    fn context(&self) -> Option<ContextCoverage> {
        Some(self.ambient_context())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(recorder: &GlobalCoverageRecorder, class_id: u64, probe_count: usize, probe: usize) {
        let coverage = recorder.ambient_context();
        let datum = coverage.data.get_or_insert_with(class_id, || ExecDatum {
            class_id,
            class_name: format!("class-{class_id}"),
            probes: Arc::new(ProbeArray::new(probe_count)),
            session_id: coverage.context.session_id().to_string(),
            test_id: coverage.context.test_id().to_string(),
        });
        datum.probes.set(probe);
    }

    mod global_recorder_tests {
        use super::*;

        /// The ambient context is always available
        #[test]
        fn test_context_always_live() {
            let recorder = GlobalCoverageRecorder::new();
            let coverage = recorder.context().expect("ambient context");
            assert_eq!(coverage.context.session_id(), GLOBAL_SESSION);
        }

        /// First poll emits the delta, a quiet second poll emits nothing
        #[test]
        fn test_delta_then_silence() {
            let recorder = GlobalCoverageRecorder::new();
            touch(&recorder, 2, 2, 1);

            let first: Vec<ExecDatum> = recorder.poll_recorded().collect();
            assert_eq!(first.len(), 1);
            assert_eq!(first[0].probes.snapshot(), vec![false, true]);

            assert_eq!(recorder.poll_recorded().count(), 0);
        }

        /// A bit never appears in two consecutive polls
        #[test]
        fn test_no_bit_reported_twice() {
            let recorder = GlobalCoverageRecorder::new();
            touch(&recorder, 1, 4, 0);
            let first: Vec<ExecDatum> = recorder.poll_recorded().collect();
            assert_eq!(first[0].probes.snapshot(), vec![true, false, false, false]);

            touch(&recorder, 1, 4, 2);
            let second: Vec<ExecDatum> = recorder.poll_recorded().collect();
            assert_eq!(second.len(), 1);
            assert_eq!(
                second[0].probes.snapshot(),
                vec![false, false, true, false]
            );
        }

        /// The live ambient array keeps its bits after a poll
        #[test]
        fn test_live_array_not_cleared() {
            let recorder = GlobalCoverageRecorder::new();
            touch(&recorder, 1, 2, 0);
            let _ = recorder.poll_recorded().count();
            let live = recorder
                .ambient_context()
                .data
                .get(1)
                .expect("ambient datum");
            assert!(live.probes.get(0));
        }

        /// Adopting a global session relabels newly created datums only
        #[test]
        fn test_global_session_labeling() {
            let recorder = GlobalCoverageRecorder::new();
            touch(&recorder, 1, 2, 0);

            recorder.adopt_session("gs1");
            touch(&recorder, 2, 2, 0);

            let polled: Vec<ExecDatum> = recorder.poll_recorded().collect();
            let by_class =
                |id: u64| polled.iter().find(|d| d.class_id == id).expect("datum");
            assert_eq!(by_class(1).session_id, GLOBAL_SESSION);
            assert_eq!(by_class(2).session_id, "gs1");

            recorder.release_session("gs1");
            assert_eq!(
                recorder.ambient_context().context.session_id(),
                GLOBAL_SESSION
            );
        }

        /// Releasing a session that does not hold the label is a no-op
        #[test]
        fn test_release_wrong_session_keeps_label() {
            let recorder = GlobalCoverageRecorder::new();
            recorder.adopt_session("gs1");
            recorder.release_session("other");
            assert_eq!(recorder.ambient_context().context.session_id(), "gs1");
        }
    }
}
