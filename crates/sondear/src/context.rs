//! Recording context identity.
//!
//! A context is a (session, test) pair. Coverage recorded outside any
//! active session is attributed to the ambient context, which uses the
//! reserved `GLOBAL_SESSION` id and never stops.

use std::sync::Arc;

use crate::descriptor::{SessionId, TestId};
use crate::exec::ExecData;

/// Reserved session id for a context created without a session.
pub const SESSION_NONE: &str = "SESSION_NONE";
/// Reserved test id for a context created without a test.
pub const TEST_NONE: &str = "TEST_NONE";
/// Reserved session id for the ambient (outside-any-session) context.
pub const GLOBAL_SESSION: &str = "GLOBAL";

/// Identity of one recording context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    session_id: SessionId,
    test_id: TestId,
}

impl ContextKey {
    /// Create a context key, substituting the reserved sentinels for empty
    /// ids so a key always carries usable attribution.
    #[must_use]
    pub fn new(session_id: &str, test_id: &str) -> Self {
        Self {
            session_id: if session_id.is_empty() {
                SESSION_NONE.to_string()
            } else {
                session_id.to_string()
            },
            test_id: if test_id.is_empty() {
                TEST_NONE.to_string()
            } else {
                test_id.to_string()
            },
        }
    }

    /// The ambient context key.
    #[must_use]
    pub fn ambient() -> Self {
        Self::new(GLOBAL_SESSION, TEST_NONE)
    }

    /// Session this context belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Test this context belongs to.
    #[must_use]
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    /// Whether this is the ambient context.
    #[must_use]
    pub fn is_ambient(&self) -> bool {
        self.session_id == GLOBAL_SESSION
    }
}

/// A live, still-mutable context and its coverage data.
///
/// Returned by recorder diagnostics and used by the probe access facade to
/// resolve "wherever this call is happening right now".
#[derive(Debug, Clone)]
pub struct ContextCoverage {
    /// Identity of the context
    pub context: ContextKey,
    /// The context's writable coverage map
    pub data: Arc<ExecData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod context_key_tests {
        use super::*;

        /// Empty ids fall back to the reserved sentinels
        #[test]
        fn test_empty_ids_use_sentinels() {
            let key = ContextKey::new("", "");
            assert_eq!(key.session_id(), SESSION_NONE);
            assert_eq!(key.test_id(), TEST_NONE);
        }

        /// Explicit ids are preserved
        #[test]
        fn test_explicit_ids() {
            let key = ContextKey::new("s1", "t1");
            assert_eq!(key.session_id(), "s1");
            assert_eq!(key.test_id(), "t1");
            assert!(!key.is_ambient());
        }

        /// The ambient key uses the reserved global session id
        #[test]
        fn test_ambient_key() {
            let key = ContextKey::ambient();
            assert_eq!(key.session_id(), GLOBAL_SESSION);
            assert!(key.is_ambient());
        }

        /// Keys with the same ids are equal and hash-equal
        #[test]
        fn test_key_equality() {
            use std::collections::HashSet;
            let mut set = HashSet::new();
            set.insert(ContextKey::new("s1", "t1"));
            set.insert(ContextKey::new("s1", "t1"));
            set.insert(ContextKey::new("s1", "t2"));
            assert_eq!(set.len(), 2);
        }
    }
}
