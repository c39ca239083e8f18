// src/core/metrics.rs

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters for one scan. Producers bump them with relaxed atomics; readers may see
/// slightly stale values.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    requests_issued: AtomicU64,
    requests_failed: AtomicU64,
    web_applications: AtomicU64,
    plugins: AtomicU64,
    security_issues: AtomicU64,
    started: OnceCell<Instant>,
    finished: OnceCell<Instant>,
}

/// A point-in-time copy of [`ScanMetrics`], plus the frontier's queue depth and the number
/// of hidden resources reported so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_issued: u64,
    pub requests_failed: u64,
    pub hidden_resources: u64,
    pub web_applications: u64,
    pub plugins: u64,
    pub security_issues: u64,
    pub queued: usize,
    pub in_flight: usize,
    pub elapsed_ms: u64,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        let _ = self.started.set(Instant::now());
    }

    pub fn mark_finished(&self) {
        let _ = self.finished.set(Instant::now());
    }

    pub fn request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn web_application_found(&self) {
        self.web_applications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn plugin_found(&self) {
        self.plugins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn security_issue_found(&self) {
        self.security_issues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests_issued.load(Ordering::Relaxed)
    }

    fn elapsed_ms(&self) -> u64 {
        match (self.started.get(), self.finished.get()) {
            (Some(start), Some(end)) => end.duration_since(*start).as_millis() as u64,
            (Some(start), None) => start.elapsed().as_millis() as u64,
            _ => 0,
        }
    }

    pub fn snapshot(&self, queued: usize, in_flight: usize, hidden_resources: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            hidden_resources: hidden_resources as u64,
            web_applications: self.web_applications.load(Ordering::Relaxed),
            plugins: self.plugins.load(Ordering::Relaxed),
            security_issues: self.security_issues.load(Ordering::Relaxed),
            queued,
            in_flight,
            elapsed_ms: self.elapsed_ms(),
        }
    }
}
