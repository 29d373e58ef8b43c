//! Coverage recorders.
//!
//! Two variants share one contract: the thread-scoped recorder rotates
//! per-(session, test) contexts through the data pool, and the global
//! recorder keeps a perpetually writable ambient context whose new coverage
//! is detected by diffing instead of rotation.

mod global;
mod thread;

pub use global::GlobalCoverageRecorder;
pub use thread::ThreadCoverageRecorder;

use crate::context::ContextCoverage;
use crate::exec::ExecDatum;

/// Common recording contract for the session-scoped and global recorders.
///
/// The facade selects between implementations per call; tests substitute
/// fakes through this trait.
pub trait CoverageRecorder: Send + Sync {
    /// Begin recording on the calling thread for the given context.
    fn start_recording(&self, session_id: &str, test_id: &str);

    /// Finish recording for the given context and hand its coverage to the
    /// shipping side.
    fn stop_recording(&self, session_id: &str, test_id: &str);

    /// Lazily yield coverage that is new since the previous poll. Each
    /// datum is yielded exactly once; all-false coverage is never yielded.
    fn poll_recorded(&self) -> Box<dyn Iterator<Item = ExecDatum> + '_>;

    /// The calling thread's live, still-mutable context, if any. Used by
    /// diagnostics and the probe access facade, never by the sender.
    fn context(&self) -> Option<ContextCoverage>;
}
