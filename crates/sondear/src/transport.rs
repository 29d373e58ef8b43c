//! Transport boundary.
//!
//! The wire protocol to the remote collector is out of scope; the engine
//! only needs a fire-and-forget `send` with a success/failure result and an
//! availability probe it can consult before draining queues.

use std::fmt;

use crate::result::{SondearError, SondearResult};

/// Logical address of a coverage endpoint on the remote collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    method: String,
    path: String,
}

impl Destination {
    /// Create a destination from a method and path.
    #[must_use]
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    /// The default coverage endpoint.
    #[must_use]
    pub fn coverage() -> Self {
        Self::new("POST", "coverage")
    }

    /// Transport method, e.g. `POST`.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Endpoint path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Capability required of the transport collaborator.
///
/// Only the background sender calls these; application threads never touch
/// the transport. Implementations may block on network I/O.
pub trait CoverageTransport: Send + Sync {
    /// Deliver one serialized page to the destination. Fire-and-forget: no
    /// acknowledgement payload beyond the success result.
    fn send(&self, destination: &Destination, payload: &[u8]) -> SondearResult<()>;

    /// Whether the destination is currently believed reachable. The sender
    /// skips delivery attempts and queues instead while this is false.
    fn is_available(&self) -> bool;

    /// Release transport resources. Called once by the sender after its
    /// final flush; sends may not be attempted afterwards.
    fn shutdown(&self) {}
}

/// Placeholder transport used before a real one is wired in: reports
/// unavailable and fails every send, so coverage accumulates in the
/// retention queue up to its ceiling and nothing is silently dropped.
#[derive(Debug, Default)]
pub struct StubTransport;

impl StubTransport {
    /// Create a stub transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CoverageTransport for StubTransport {
    fn send(&self, destination: &Destination, _payload: &[u8]) -> SondearResult<()> {
        Err(SondearError::TransportFailed {
            message: format!("stub transport cannot deliver to {destination}"),
        })
    }

    fn is_available(&self) -> bool {
        false
    }
}
