//! Engine configuration.

use std::time::Duration;

use crate::transport::Destination;

/// Default interval between send ticks.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(2000);
/// Default maximum facts per page.
pub const DEFAULT_PAGE_SIZE: usize = 0xffff;
/// Default retention queue byte ceiling.
pub const DEFAULT_RETENTION_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
/// Default upper bound on the final shutdown flush.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coverage engine configuration
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// Interval between sender ticks
    pub send_interval: Duration,
    /// Maximum facts per transported page
    pub page_size: usize,
    /// Total-byte ceiling for the retention queue
    pub retention_limit_bytes: u64,
    /// Upper bound on the final flush during shutdown
    pub shutdown_timeout: Duration,
    /// Where coverage pages are sent
    pub destination: Destination,
}

impl CoverageConfig {
    /// Create a builder for coverage config
    #[must_use]
    pub fn builder() -> CoverageConfigBuilder {
        CoverageConfigBuilder::default()
    }
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            retention_limit_bytes: DEFAULT_RETENTION_LIMIT_BYTES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            destination: Destination::coverage(),
        }
    }
}

/// Builder for coverage configuration
#[derive(Debug, Default)]
pub struct CoverageConfigBuilder {
    send_interval: Option<Duration>,
    page_size: Option<usize>,
    retention_limit_bytes: Option<u64>,
    shutdown_timeout: Option<Duration>,
    destination: Option<Destination>,
}

impl CoverageConfigBuilder {
    /// Set the interval between sender ticks
    #[must_use]
    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = Some(interval);
        self
    }

    /// Set the maximum facts per page
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set the retention queue byte ceiling
    #[must_use]
    pub fn retention_limit_bytes(mut self, limit: u64) -> Self {
        self.retention_limit_bytes = Some(limit);
        self
    }

    /// Set the shutdown flush timeout
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Set the transport destination
    #[must_use]
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> CoverageConfig {
        let defaults = CoverageConfig::default();
        CoverageConfig {
            send_interval: self.send_interval.unwrap_or(defaults.send_interval),
            page_size: match self.page_size {
                Some(0) | None => defaults.page_size,
                Some(size) => size,
            },
            retention_limit_bytes: self
                .retention_limit_bytes
                .unwrap_or(defaults.retention_limit_bytes),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(defaults.shutdown_timeout),
            destination: self.destination.unwrap_or(defaults.destination),
        }
    }
}
