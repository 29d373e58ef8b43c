//! Bounded retention of undelivered payloads.
//!
//! When the transport fails, serialized pages wait here for the next
//! successful attempt. The queue is unbounded in count but enforces a
//! total-byte ceiling: overflow rejects the incoming payload rather than
//! evicting queued ones, because older unacknowledged coverage is
//! higher-value than data still accumulating.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::result::{SondearError, SondearResult};
use crate::throttle::LogThrottle;

/// Holding area for serialized pages awaiting redelivery.
pub trait RetentionQueue: Send + Sync {
    /// Queue one payload. Fails with `RetentionOverflow` when the byte
    /// ceiling would be exceeded; the payload is dropped and the rejection
    /// logged, preserving already-queued older data.
    fn add(&self, payload: Vec<u8>) -> SondearResult<()>;

    /// Drain every queued payload, oldest first.
    fn flush(&self) -> Vec<Vec<u8>>;

    /// Bytes currently queued.
    fn total_bytes(&self) -> u64;

    /// Number of queued payloads.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct QueueState {
    payloads: VecDeque<Vec<u8>>,
    total_bytes: u64,
}

/// In-memory retention queue with a total-byte ceiling.
pub struct InMemoryRetentionQueue {
    state: Mutex<QueueState>,
    limit_bytes: u64,
    overflow_log: LogThrottle,
}

impl InMemoryRetentionQueue {
    /// Create a queue bounded to `limit_bytes` total payload bytes.
    #[must_use]
    pub fn new(limit_bytes: u64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                payloads: VecDeque::new(),
                total_bytes: 0,
            }),
            limit_bytes,
            overflow_log: LogThrottle::new(),
        }
    }

    /// The configured byte ceiling.
    #[must_use]
    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }
}

impl std::fmt::Debug for InMemoryRetentionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRetentionQueue")
            .field("len", &self.len())
            .field("total_bytes", &self.total_bytes())
            .field("limit_bytes", &self.limit_bytes)
            .finish()
    }
}

impl RetentionQueue for InMemoryRetentionQueue {
    fn add(&self, payload: Vec<u8>) -> SondearResult<()> {
        let size = payload.len() as u64;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.total_bytes + size > self.limit_bytes {
            if self.overflow_log.should_log() {
                warn!(
                    payload_bytes = size,
                    used_bytes = state.total_bytes,
                    limit_bytes = self.limit_bytes,
                    rejections = self.overflow_log.occurrences(),
                    "retention queue full, dropping incoming payload"
                );
            }
            return Err(SondearError::RetentionOverflow {
                needed: size,
                used: state.total_bytes,
                limit: self.limit_bytes,
            });
        }
        state.total_bytes += size;
        state.payloads.push_back(payload);
        Ok(())
    }

    fn flush(&self) -> Vec<Vec<u8>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.total_bytes = 0;
        state.payloads.drain(..).collect()
    }

    fn total_bytes(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_bytes
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .payloads
            .len()
    }
}
