//! Thread-scoped coverage recording.
//!
//! Each application thread carries at most one recording context at a time.
//! The context is thread-local because the instrumentation ABI cannot pass
//! a handle through the call chain of the monitored application; this
//! mirrors an unavoidable cross-cutting concern rather than a preference.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::context::{ContextCoverage, ContextKey};
use crate::exec::{ExecData, ExecDatum};
use crate::pool::DataPool;
use crate::recorder::CoverageRecorder;

// Contexts are keyed by recorder instance so independent recorders on the
// same thread (a test constructing several) cannot observe each other.
thread_local! {
    static THREAD_CONTEXTS: RefCell<HashMap<u64, (ContextKey, Arc<ExecData>)>> =
        RefCell::new(HashMap::new());
}

static NEXT_RECORDER_ID: AtomicU64 = AtomicU64::new(0);

/// Recorder for session-scoped coverage with a thread-local context.
///
/// State machine per thread: idle, recording, idle. `start_recording` on a
/// thread that is already recording stops the previous context first; there
/// are no nested contexts per thread.
#[derive(Debug)]
pub struct ThreadCoverageRecorder {
    id: u64,
    pool: DataPool<ContextKey, ExecData>,
}

impl ThreadCoverageRecorder {
    /// Create a recorder with an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_RECORDER_ID.fetch_add(1, Ordering::Relaxed),
            pool: DataPool::new(),
        }
    }

    /// Release every active context belonging to `session_id` into the
    /// released queue, returning handles to the released data.
    pub fn release_session(&self, session_id: &str) -> Vec<Arc<ExecData>> {
        self.pool
            .release_where(|key| key.session_id() == session_id)
    }

    /// Drop every active context belonging to `session_id` without
    /// queueing it. Returns the number of contexts discarded.
    pub fn discard_session(&self, session_id: &str) -> usize {
        self.pool
            .discard_where(|key| key.session_id() == session_id)
    }

    /// Release all active contexts, returning handles to the released data.
    pub fn release_all(&self) -> Vec<Arc<ExecData>> {
        self.pool.release_where(|_| true)
    }

    /// Drop all active contexts without queueing them.
    pub fn discard_all(&self) -> usize {
        self.pool.discard_where(|_| true)
    }

    fn take_thread_context(&self) -> Option<(ContextKey, Arc<ExecData>)> {
        THREAD_CONTEXTS.with(|cell| cell.borrow_mut().remove(&self.id))
    }
}

impl Default for ThreadCoverageRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageRecorder for ThreadCoverageRecorder {
    fn start_recording(&self, session_id: &str, test_id: &str) {
        if let Some((previous, _)) = self.take_thread_context() {
            self.pool.release(&previous);
            trace!(
                session_id = previous.session_id(),
                test_id = previous.test_id(),
                "implicitly stopped previous context before new recording"
            );
        }
        let key = ContextKey::new(session_id, test_id);
        let data = self.pool.get_or_put(key.clone(), ExecData::new);
        THREAD_CONTEXTS.with(|cell| {
            cell.borrow_mut().insert(self.id, (key, data));
        });
        trace!(session_id, test_id, "recording started");
    }

    fn stop_recording(&self, session_id: &str, test_id: &str) {
        let key = ContextKey::new(session_id, test_id);
        self.pool.release(&key);
        THREAD_CONTEXTS.with(|cell| {
            let mut contexts = cell.borrow_mut();
            if contexts
                .get(&self.id)
                .is_some_and(|(current, _)| *current == key)
            {
                contexts.remove(&self.id);
            }
        });
        trace!(session_id, test_id, "recording stopped");
    }

    fn poll_recorded(&self) -> Box<dyn Iterator<Item = ExecDatum> + '_> {
        Box::new(
            self.pool
                .poll_released()
                .flat_map(|data| data.covered()),
        )
    }

    fn context(&self) -> Option<ContextCoverage> {
        THREAD_CONTEXTS.with(|cell| {
            cell.borrow()
                .get(&self.id)
                .map(|(context, data)| ContextCoverage {
                    context: context.clone(),
                    data: Arc::clone(data),
                })
        })
    }
}
