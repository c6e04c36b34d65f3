//! Request profiling for the external address services.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// External services the checker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// General-purpose geocoder
    Geocoder,
    /// National address register
    Register,
}

impl Service {
    fn index(self) -> usize {
        match self {
            Service::Geocoder => 0,
            Service::Register => 1,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Geocoder => f.write_str("geocoder"),
            Service::Register => f.write_str("register"),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    retries: AtomicU64,
    misses: AtomicU64,
    latency_us: AtomicU64,
}

/// Thread-safe request counters, shared by the service clients.
#[derive(Debug)]
pub struct RequestProfiler {
    counters: [Counters; 2],
    start_time: Instant,
}

impl RequestProfiler {
    /// Create a new profiler
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            start_time: Instant::now(),
        }
    }

    /// Record one request attempt and how long it took
    pub fn record_request(&self, service: Service, duration: Duration) {
        let counters = &self.counters[service.index()];
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters
            .latency_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a retried attempt
    pub fn record_retry(&self, service: Service) {
        self.counters[service.index()]
            .retries
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup that produced no usable result
    pub fn record_miss(&self, service: Service) {
        self.counters[service.index()]
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get elapsed time since profiling started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Summary for one service
    pub fn summary(&self, service: Service) -> RequestSummary {
        let counters = &self.counters[service.index()];
        let requests = counters.requests.load(Ordering::Relaxed);
        let latency_us = counters.latency_us.load(Ordering::Relaxed);

        RequestSummary {
            service,
            requests,
            retries: counters.retries.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            average_latency: if requests > 0 {
                Duration::from_micros(latency_us / requests)
            } else {
                Duration::ZERO
            },
            total_runtime: self.elapsed(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counters in &self.counters {
            counters.requests.store(0, Ordering::Relaxed);
            counters.retries.store(0, Ordering::Relaxed);
            counters.misses.store(0, Ordering::Relaxed);
            counters.latency_us.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for RequestProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of request metrics for one service
#[derive(Debug, Clone)]
pub struct RequestSummary {
    /// Which service
    pub service: Service,
    /// Number of request attempts, retries included
    pub requests: u64,
    /// Number of retried attempts
    pub retries: u64,
    /// Lookups that produced no usable result
    pub misses: u64,
    /// Mean time per attempt
    pub average_latency: Duration,
    /// Time since the profiler was created
    pub total_runtime: Duration,
}

impl RequestSummary {
    /// Calculate requests per second
    pub fn requests_per_second(&self) -> f64 {
        if self.total_runtime.as_secs_f64() > 0.0 {
            self.requests as f64 / self.total_runtime.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} requests ({} retries, {} misses), avg {} ms",
            self.service,
            self.requests,
            self.retries,
            self.misses,
            self.average_latency.as_millis()
        )
    }
}
