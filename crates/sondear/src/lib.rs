//! Sondear: In-Process Coverage Recording and Transport Engine
//!
//! Sondear (Spanish: "to probe / sound out") records which control-flow
//! probes instrumented application code exercises, attributes them to test
//! sessions, and ships the aggregate to a remote collector under memory and
//! bandwidth bounds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     SONDEAR Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Instrumented Code → CoverageManager → ProbeArray (bit flips)   │
//! │                           │                                      │
//! │        session stop ──► DataPool (released queue)                │
//! │        ambient diff ──► GlobalCoverageRecorder                   │
//! │                           │                                      │
//! │   IntervalCoverageSender ─┴─► facts → pages → CoverageTransport  │
//! │                           │        (failures)                    │
//! │                           └──────► InMemoryRetentionQueue        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Many application threads flip probe bits concurrently; the one
//! background sender drains and ships without ever blocking them. Nothing
//! in this crate may panic or propagate an error into instrumented code.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

mod config;
mod context;
mod descriptor;
mod exec;
mod facts;
mod manager;
mod pool;
mod probes;
mod recorder;
mod result;
mod retention;
mod sender;
mod throttle;
mod transport;

pub use config::{
    CoverageConfig, CoverageConfigBuilder, DEFAULT_PAGE_SIZE, DEFAULT_RETENTION_LIMIT_BYTES,
    DEFAULT_SEND_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use context::{ContextCoverage, ContextKey, GLOBAL_SESSION, SESSION_NONE, TEST_NONE};
pub use descriptor::{
    ClassDescriptor, ClassId, DescriptorRegistry, MethodDescriptor, SessionId, TestId,
};
pub use exec::{ExecData, ExecDatum};
pub use facts::{facts_for, paginate, CoveragePage, MethodCoverage};
pub use manager::CoverageManager;
pub use pool::DataPool;
pub use probes::ProbeArray;
pub use recorder::{CoverageRecorder, GlobalCoverageRecorder, ThreadCoverageRecorder};
pub use result::{SondearError, SondearResult};
pub use retention::{InMemoryRetentionQueue, RetentionQueue};
pub use sender::{CoverageSender, CoverageSource, IntervalCoverageSender};
pub use transport::{CoverageTransport, Destination, StubTransport};
