//! Probe access facade and session management.
//!
//! `CoverageManager` is the single runtime entry point for instrumented
//! code and the session-management collaborator. It owns the descriptor
//! registry and both recorders, resolves "wherever this call is happening
//! right now" on every probe acquisition, and sweeps session contexts on
//! stop and cancel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::context::{ContextCoverage, TEST_NONE};
use crate::descriptor::{
    ClassDescriptor, ClassId, DescriptorRegistry, MethodDescriptor, SessionId, TestId,
};
use crate::exec::ExecDatum;
use crate::probes::ProbeArray;
use crate::recorder::{CoverageRecorder, GlobalCoverageRecorder, ThreadCoverageRecorder};
use crate::sender::CoverageSource;

#[derive(Debug, Clone)]
struct SessionInfo {
    is_global: bool,
    default_test_id: TestId,
}

/// Facade over the registry, the thread-scoped recorder, and the global
/// recorder. One instance lives for the whole process; collaborators reach
/// it through dependency injection rather than a global singleton.
#[derive(Debug)]
pub struct CoverageManager {
    registry: Arc<DescriptorRegistry>,
    thread_recorder: ThreadCoverageRecorder,
    global_recorder: GlobalCoverageRecorder,
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl CoverageManager {
    /// Create a manager around an existing registry.
    #[must_use]
    pub fn new(registry: Arc<DescriptorRegistry>) -> Self {
        Self {
            registry,
            thread_recorder: ThreadCoverageRecorder::new(),
            global_recorder: GlobalCoverageRecorder::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The descriptor registry backing this manager.
    #[must_use]
    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    /// Register a class's probe metadata. Called once per class by the
    /// instrumentation collaborator.
    pub fn register_class(&self, id: ClassId, name: &str, probe_count: usize) {
        self.registry.register_class(ClassDescriptor {
            id,
            name: name.to_string(),
            probe_count,
        });
    }

    /// Register a class's method probe ranges, used at send time.
    pub fn register_methods(&self, class_id: ClassId, methods: Vec<MethodDescriptor>) {
        self.registry.register_methods(class_id, methods);
    }

    /// The instrumentation ABI: return the probe array for `class_id` in
    /// the calling thread's current context.
    ///
    /// Resolution order on every call: the thread's active session context,
    /// else the ambient context, else (unregistered class) the shared stub.
    /// Never fails, never blocks beyond short map locks, and never hands
    /// instrumented code an invalid reference.
    pub fn acquire(
        &self,
        class_id: ClassId,
        probe_count: usize,
        class_name: &str,
    ) -> Arc<ProbeArray> {
        let Some(descriptor) =
            self.registry
                .descriptor_or_warn(class_id, probe_count, class_name)
        else {
            return ProbeArray::stub();
        };
        let coverage = self
            .thread_recorder
            .context()
            .unwrap_or_else(|| self.global_recorder.ambient_context());
        let datum = coverage.data.get_or_insert_with(class_id, || ExecDatum {
            class_id,
            class_name: descriptor.name.clone(),
            probes: Arc::new(ProbeArray::new(descriptor.probe_count)),
            session_id: coverage.context.session_id().to_string(),
            test_id: coverage.context.test_id().to_string(),
        });
        datum.probes
    }

    /// Begin a session. A global session additionally adopts the ambient
    /// context, attributing coverage recorded outside tests to it.
    pub fn start_session(&self, session_id: &str, is_global: bool, test_id: Option<&str>) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                session_id.to_string(),
                SessionInfo {
                    is_global,
                    default_test_id: test_id.unwrap_or(TEST_NONE).to_string(),
                },
            );
        if is_global {
            self.global_recorder.adopt_session(session_id);
        }
        debug!(session_id, is_global, "session started");
    }

    /// Finish a session: every one of its still-active contexts is released
    /// into the pool for the sender, and handles to the released coverage
    /// are returned for the caller's bookkeeping.
    pub fn stop_session(&self, session_id: &str) -> Vec<ExecDatum> {
        let info = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if info.as_ref().is_some_and(|info| info.is_global) {
            self.global_recorder.release_session(session_id);
        }
        let released = self.thread_recorder.release_session(session_id);
        let data: Vec<ExecDatum> = released.iter().flat_map(|exec| exec.covered()).collect();
        debug!(
            session_id,
            contexts = released.len(),
            classes = data.len(),
            "session stopped"
        );
        data
    }

    /// Drop a session's coverage without shipping it. Contexts are removed
    /// from the pool; threads still inside instrumented calls keep valid
    /// references and their last few bits are lost by design.
    pub fn cancel_session(&self, session_id: &str) {
        let info = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if info.as_ref().is_some_and(|info| info.is_global) {
            self.global_recorder.release_session(session_id);
        }
        let dropped = self.thread_recorder.discard_session(session_id);
        debug!(session_id, contexts = dropped, "session cancelled");
    }

    /// Stop every known session and release every active context.
    pub fn stop_all(&self) -> Vec<ExecDatum> {
        let drained: Vec<(SessionId, SessionInfo)> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (session_id, info) in &drained {
            if info.is_global {
                self.global_recorder.release_session(session_id);
            }
        }
        let released = self.thread_recorder.release_all();
        let data: Vec<ExecDatum> = released.iter().flat_map(|exec| exec.covered()).collect();
        debug!(
            sessions = drained.len(),
            contexts = released.len(),
            "all sessions stopped"
        );
        data
    }

    /// Cancel every known session, discarding all active contexts.
    pub fn cancel_all(&self) {
        let drained: Vec<(SessionId, SessionInfo)> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (session_id, info) in &drained {
            if info.is_global {
                self.global_recorder.release_session(session_id);
            }
        }
        let dropped = self.thread_recorder.discard_all();
        debug!(
            sessions = drained.len(),
            contexts = dropped,
            "all sessions cancelled"
        );
    }

    /// Begin recording on the calling thread for the given context.
    pub fn start_recording(&self, session_id: &str, test_id: &str) {
        self.thread_recorder.start_recording(session_id, test_id);
    }

    /// Finish recording on the calling thread for the given context.
    pub fn stop_recording(&self, session_id: &str, test_id: &str) {
        self.thread_recorder.stop_recording(session_id, test_id);
    }

    /// Coverage that is new since the previous poll: rotated session data
    /// first, then the ambient delta.
    #[must_use]
    pub fn poll_recorded(&self) -> Vec<ExecDatum> {
        self.thread_recorder
            .poll_recorded()
            .chain(self.global_recorder.poll_recorded())
            .collect()
    }

    /// The calling thread's live context, falling back to the ambient one.
    #[must_use]
    pub fn context(&self) -> Option<ContextCoverage> {
        self.thread_recorder
            .context()
            .or_else(|| self.global_recorder.context())
    }

    /// Number of sessions currently known to the manager.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Default test id registered for a session, used by collaborators
    /// that start recording without an explicit test.
    #[must_use]
    pub fn default_test_id(&self, session_id: &str) -> Option<TestId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|info| info.default_test_id.clone())
    }
}

impl Default for CoverageManager {
    fn default() -> Self {
        Self::new(Arc::new(DescriptorRegistry::new()))
    }
}

impl CoverageSource for CoverageManager {
    fn poll_recorded(&self) -> Vec<ExecDatum> {
        Self::poll_recorded(self)
    }

    fn methods(&self, class_id: ClassId) -> Vec<MethodDescriptor> {
        self.registry.methods(class_id)
    }
}
