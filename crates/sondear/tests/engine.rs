//! End-to-end engine scenarios: concurrent recording, session rotation,
//! ambient diffing, and bounded retry delivery through a fake transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sondear::{
    CoverageConfig, CoverageManager, CoveragePage, CoverageSender, CoverageSource,
    CoverageTransport, Destination, IntervalCoverageSender, MethodDescriptor, SondearError,
    SondearResult,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    fail_remaining: AtomicUsize,
}

impl RecordingTransport {
    fn pages(&self) -> Vec<CoveragePage> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).expect("valid page"))
            .collect()
    }
}

impl CoverageTransport for RecordingTransport {
    fn send(&self, _destination: &Destination, payload: &[u8]) -> SondearResult<()> {
        if self.fail_remaining.load(Ordering::SeqCst) > 0 {
            self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(SondearError::TransportFailed {
                message: "injected outage".to_string(),
            });
        }
        self.sent.lock().expect("sent lock").push(payload.to_vec());
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn method(class_id: u64, signature: &str, start: usize, count: usize) -> MethodDescriptor {
    MethodDescriptor {
        class_id,
        signature: signature.to_string(),
        probe_range_start: start,
        probe_range_count: count,
        checksum: format!("ck-{signature}"),
    }
}

/// Two threads recording the same (session, test) context share one probe
/// array, and stopping yields the merged coverage exactly once.
#[test]
fn two_threads_one_context_yields_merged_coverage() {
    init_tracing();
    let manager = Arc::new(CoverageManager::default());
    manager.register_class(1, "com/acme/Widget", 4);

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handles: Vec<_> = [0usize, 2]
        .into_iter()
        .map(|bit| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                manager.start_recording("s1", "t1");
                barrier.wait();
                let probes = manager.acquire(1, 4, "com/acme/Widget");
                probes.set(bit);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("recording thread panicked");
    }

    manager.stop_recording("s1", "t1");
    let polled = manager.poll_recorded();
    assert_eq!(polled.len(), 1);
    assert_eq!(polled[0].class_id, 1);
    assert_eq!(polled[0].session_id, "s1");
    assert_eq!(polled[0].test_id, "t1");
    assert_eq!(
        polled[0].probes.snapshot(),
        vec![true, false, true, false]
    );

    // Nothing is yielded twice
    assert!(manager.poll_recorded().is_empty());
}

/// Ambient coverage is emitted as a delta once and never re-sent.
#[test]
fn ambient_delta_emitted_once() {
    init_tracing();
    let manager = CoverageManager::default();
    manager.register_class(2, "com/acme/Helper", 2);

    manager.acquire(2, 2, "com/acme/Helper").set(1);

    let first = manager.poll_recorded();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].probes.snapshot(), vec![false, true]);

    // No further writes: the second tick emits nothing for class 2
    assert!(manager.poll_recorded().is_empty());
}

/// Session stop flows through the sender into per-method facts.
#[test]
fn session_coverage_becomes_method_facts() {
    init_tracing();
    let manager = Arc::new(CoverageManager::default());
    manager.register_class(1, "com/acme/Widget", 4);
    manager.register_methods(
        1,
        vec![method(1, "render()V", 0, 2), method(1, "update()V", 2, 2)],
    );

    manager.start_session("s1", false, Some("t1"));
    manager.start_recording("s1", "t1");
    let probes = manager.acquire(1, 4, "com/acme/Widget");
    probes.set(0);
    probes.set(2);
    let stopped = manager.stop_session("s1");
    assert_eq!(stopped.len(), 1);

    let transport = Arc::new(RecordingTransport::default());
    let sender = IntervalCoverageSender::new(
        CoverageConfig::default(),
        Arc::clone(&manager) as Arc<dyn CoverageSource>,
        Arc::clone(&transport) as Arc<dyn CoverageTransport>,
    );
    sender.flush_now().expect("delivery succeeds");

    let pages = transport.pages();
    assert_eq!(pages.len(), 1);
    let facts = &pages[0].facts;
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].signature, "render()V");
    assert_eq!(facts[0].probes, vec![true, false]);
    assert_eq!(facts[1].signature, "update()V");
    assert_eq!(facts[1].probes, vec![true, false]);
    assert!(facts.iter().all(|fact| fact.session_id == "s1"));
}

/// Transport outage retains pages; recovery delivers them and drains the
/// queue to empty.
#[test]
fn outage_then_recovery_drains_retention() {
    init_tracing();
    let manager = Arc::new(CoverageManager::default());
    manager.register_class(1, "com/acme/Widget", 2);

    manager.start_recording("s1", "t1");
    manager.acquire(1, 2, "com/acme/Widget").set(0);
    manager.stop_recording("s1", "t1");

    let transport = Arc::new(RecordingTransport::default());
    transport.fail_remaining.store(3, Ordering::SeqCst);
    let sender = IntervalCoverageSender::new(
        CoverageConfig::default(),
        Arc::clone(&manager) as Arc<dyn CoverageSource>,
        Arc::clone(&transport) as Arc<dyn CoverageTransport>,
    );

    for _ in 0..3 {
        assert!(sender.flush_now().is_err());
    }
    assert!(transport.pages().is_empty());

    sender.flush_now().expect("fourth attempt succeeds");
    let pages = transport.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].facts[0].class_name, "com/acme/Widget");

    // Nothing left to deliver afterwards
    sender.flush_now().expect("quiet tick");
    assert_eq!(transport.pages().len(), 1);
}

/// Cancelled sessions never reach the transport.
#[test]
fn cancelled_session_ships_nothing() {
    init_tracing();
    let manager = Arc::new(CoverageManager::default());
    manager.register_class(1, "com/acme/Widget", 2);

    manager.start_session("doomed", false, None);
    manager.start_recording("doomed", "t1");
    manager.acquire(1, 2, "com/acme/Widget").set(0);
    manager.cancel_session("doomed");

    let transport = Arc::new(RecordingTransport::default());
    let sender = IntervalCoverageSender::new(
        CoverageConfig::default(),
        Arc::clone(&manager) as Arc<dyn CoverageSource>,
        Arc::clone(&transport) as Arc<dyn CoverageTransport>,
    );
    sender.flush_now().expect("nothing to deliver");
    assert!(transport.pages().is_empty());
}

/// An unregistered class is absorbed by the stub and the host keeps going.
#[test]
fn unregistered_class_is_absorbed() {
    init_tracing();
    let manager = CoverageManager::default();
    let probes = manager.acquire(999, 16, "com/acme/Ghost");
    for index in 0..32 {
        probes.set(index);
    }
    assert!(manager.poll_recorded().is_empty());
}

/// The background job ships session coverage end to end and shuts down
/// within its bound.
#[test]
fn background_job_ships_and_stops() {
    init_tracing();
    let manager = Arc::new(CoverageManager::default());
    manager.register_class(1, "com/acme/Widget", 2);

    let transport = Arc::new(RecordingTransport::default());
    let config = CoverageConfig::builder()
        .send_interval(Duration::from_millis(10))
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    let mut sender = IntervalCoverageSender::new(
        config,
        Arc::clone(&manager) as Arc<dyn CoverageSource>,
        Arc::clone(&transport) as Arc<dyn CoverageTransport>,
    );
    sender.start_sending();

    manager.start_recording("s1", "t1");
    manager.acquire(1, 2, "com/acme/Widget").set(1);
    manager.stop_recording("s1", "t1");

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while transport.pages().is_empty() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    sender.stop_sending();

    let pages = transport.pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].facts[0].probes, vec![false, true]);
}
