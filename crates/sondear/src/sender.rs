//! Interval coverage sending.
//!
//! One background thread polls the recorders, converts raw probe arrays
//! into per-method facts, pages them, and ships the pages. Transport
//! failures re-queue payloads into the bounded retention queue; the queue
//! is drained oldest-first at the next attempt. Application threads never
//! touch the transport.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::config::CoverageConfig;
use crate::descriptor::{ClassId, MethodDescriptor};
use crate::exec::ExecDatum;
use crate::facts::{facts_for, paginate};
use crate::result::{SondearError, SondearResult};
use crate::retention::{InMemoryRetentionQueue, RetentionQueue};
use crate::throttle::LogThrottle;
use crate::transport::CoverageTransport;

/// What the sender needs from the recording side: newly recorded coverage
/// and the method ranges to slice it with. Implemented by
/// `CoverageManager`; tests substitute fakes.
pub trait CoverageSource: Send + Sync {
    /// Coverage that is new since the previous poll.
    fn poll_recorded(&self) -> Vec<ExecDatum>;

    /// Method probe ranges for a class; empty if none were registered.
    fn methods(&self, class_id: ClassId) -> Vec<MethodDescriptor>;
}

/// Lifecycle of a background coverage sender.
pub trait CoverageSender {
    /// Start the periodic sending job.
    fn start_sending(&mut self);

    /// Stop the job, performing one final bounded flush.
    fn stop_sending(&mut self);
}

struct SenderInner {
    config: CoverageConfig,
    source: Arc<dyn CoverageSource>,
    transport: Arc<dyn CoverageTransport>,
    retention: Arc<dyn RetentionQueue>,
    failure_log: LogThrottle,
}

impl SenderInner {
    /// One poll-convert-page-ship cycle. The result reports delivery
    /// health to callers; failures are already logged and retained by the
    /// time it returns.
    fn tick(&self) -> SondearResult<()> {
        let pages = self.collect_pages();
        self.ship(pages)
    }

    fn collect_pages(&self) -> Vec<Vec<u8>> {
        let mut facts = Vec::new();
        for datum in self.source.poll_recorded() {
            facts.extend(facts_for(&datum, &self.source.methods(datum.class_id)));
        }
        paginate(facts, self.config.page_size)
            .into_iter()
            .filter_map(|page| match serde_json::to_vec(&page) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    error!(error = %err, "coverage page serialization failed, page dropped");
                    None
                }
            })
            .collect()
    }

    /// Ship queued payloads oldest-first, then the fresh ones. After the
    /// first failure the remaining payloads are re-queued unsent so FIFO
    /// order survives into the next attempt.
    fn ship(&self, fresh: Vec<Vec<u8>>) -> SondearResult<()> {
        if !self.transport.is_available() {
            let pending = !fresh.is_empty() || !self.retention.is_empty();
            if !fresh.is_empty() && self.failure_log.should_log() {
                debug!(
                    pages = fresh.len(),
                    queued = self.retention.len(),
                    "transport unavailable, retaining coverage pages"
                );
            }
            for payload in fresh {
                let _ = self.retention.add(payload);
            }
            if pending {
                return Err(SondearError::TransportUnavailable);
            }
            return Ok(());
        }

        let mut first_error = None;
        for payload in self.retention.flush().into_iter().chain(fresh) {
            if first_error.is_some() {
                let _ = self.retention.add(payload);
                continue;
            }
            match self.transport.send(&self.config.destination, &payload) {
                Ok(()) => {}
                Err(err) => {
                    if self.failure_log.should_log() {
                        warn!(
                            error = %err,
                            failures = self.failure_log.occurrences(),
                            "coverage send failed, retaining payload"
                        );
                    }
                    first_error = Some(err);
                    let _ = self.retention.add(payload);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                self.failure_log.reset();
                Ok(())
            }
        }
    }
}

/// Background sender ticking at a configured interval.
///
/// The timer thread doubles as the shutdown path: the interval wait is a
/// channel receive with timeout, so a stop signal interrupts the wait, the
/// thread performs one final flush, and `stop_sending` waits for that flush
/// up to the configured shutdown timeout before letting the process move
/// on. A dead network peer can delay shutdown, never hang it.
pub struct IntervalCoverageSender {
    inner: Arc<SenderInner>,
    worker: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    done_rx: Option<mpsc::Receiver<()>>,
}

impl IntervalCoverageSender {
    /// Create a sender with an in-memory retention queue sized from the
    /// configuration.
    #[must_use]
    pub fn new(
        config: CoverageConfig,
        source: Arc<dyn CoverageSource>,
        transport: Arc<dyn CoverageTransport>,
    ) -> Self {
        let retention = Arc::new(InMemoryRetentionQueue::new(config.retention_limit_bytes));
        Self::with_retention(config, source, transport, retention)
    }

    /// Create a sender with an injected retention queue.
    #[must_use]
    pub fn with_retention(
        config: CoverageConfig,
        source: Arc<dyn CoverageSource>,
        transport: Arc<dyn CoverageTransport>,
        retention: Arc<dyn RetentionQueue>,
    ) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                config,
                source,
                transport,
                retention,
                failure_log: LogThrottle::new(),
            }),
            worker: None,
            shutdown_tx: None,
            done_rx: None,
        }
    }

    /// Run one poll-and-send cycle on the calling thread. Used by the
    /// background job on every tick and available to callers that need an
    /// immediate flush. A failure means the coverage is retained, not
    /// lost, up to the retention ceiling.
    pub fn flush_now(&self) -> SondearResult<()> {
        self.inner.tick()
    }

    /// Whether the background job is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl CoverageSender for IntervalCoverageSender {
    fn start_sending(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("sondear-coverage-sender".to_string())
            .spawn(move || {
                loop {
                    let _ = inner.tick();
                    match shutdown_rx.recv_timeout(inner.config.send_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Final flush: one last chance for data released since the
                // previous tick before the process goes away.
                let _ = inner.tick();
                let _ = done_tx.send(());
            });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.shutdown_tx = Some(shutdown_tx);
                self.done_rx = Some(done_rx);
                debug!("coverage sending job started");
            }
            Err(err) => {
                error!(error = %err, "failed to spawn coverage sender thread");
            }
        }
    }

    fn stop_sending(&mut self) {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return;
        };
        let _ = shutdown_tx.send(());
        drop(shutdown_tx);
        if let Some(done_rx) = self.done_rx.take() {
            match done_rx.recv_timeout(self.inner.config.shutdown_timeout) {
                Ok(()) => {
                    if let Some(worker) = self.worker.take() {
                        let _ = worker.join();
                    }
                    debug!("coverage sending job stopped");
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.inner.config.shutdown_timeout.as_millis() as u64,
                        "final coverage flush did not finish in time, abandoning sender thread"
                    );
                    let _ = self.worker.take();
                }
            }
        }
        self.inner.transport.shutdown();
    }
}

impl Drop for IntervalCoverageSender {
    fn drop(&mut self) {
        self.stop_sending();
    }
}

impl std::fmt::Debug for IntervalCoverageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalCoverageSender")
            .field("running", &self.is_running())
            .field("interval", &self.inner.config.send_interval)
            .finish()
    }
}
