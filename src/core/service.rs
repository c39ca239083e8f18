// src/core/service.rs

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::ScanError;
use crate::core::metrics::MetricsSnapshot;
use crate::core::models::ScanReport;
use crate::core::scanner::state::ScanState;
use crate::core::scanner::{Scan, ScanContext};
use crate::core::session::SessionTracker;

/// A cheap, non-blocking view of one registered scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStatus {
    pub scan_id: String,
    pub target: String,
    pub template: String,
    pub state: ScanState,
    pub metrics: MetricsSnapshot,
}

/// Registry of scans, keyed by caller-supplied id. Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ScanService {
    scans: Mutex<HashMap<String, Arc<Scan>>>,
    sessions: Arc<SessionTracker>,
}

impl ScanService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scan without running it. Fails if `id` is taken.
    pub fn register(&self, context: ScanContext, id: &str) -> Result<Arc<Scan>, ScanError> {
        let mut scans = self.scans.lock();
        if scans.contains_key(id) {
            warn!(scan_id = id, "Rejected duplicate scan id.");
            return Err(ScanError::DuplicateScan(id.to_string()));
        }
        let scan = Arc::new(Scan::new(id, context, Arc::clone(&self.sessions))?);
        scans.insert(id.to_string(), Arc::clone(&scan));
        info!(scan_id = id, target = %scan.context().target(), "Scan registered.");
        Ok(scan)
    }

    /// Registers and runs a scan, resolving once it is Completed, Stopped or Aborted.
    pub async fn start_scan(&self, context: ScanContext, id: &str) -> Result<ScanReport, ScanError> {
        let scan = self.register(context, id)?;
        Ok(scan.run().await)
    }

    /// Aborts every live scan and returns how many were aborted.
    pub fn abort_active(&self) -> usize {
        let scans: Vec<Arc<Scan>> = self.scans.lock().values().cloned().collect();
        let aborted = scans.iter().filter(|scan| scan.abort().is_ok()).count();
        info!(aborted, "Aborted active scans.");
        aborted
    }

    pub fn get_scan(&self, id: &str) -> Option<Arc<Scan>> {
        self.scans.lock().get(id).cloned()
    }

    pub fn get_status(&self, id: &str) -> Option<ScanStatus> {
        let scan = self.get_scan(id)?;
        Some(ScanStatus {
            scan_id: scan.id().to_string(),
            target: scan.context().target().to_string(),
            template: scan.context().profile().id().to_string(),
            state: scan.state(),
            metrics: scan.metrics(),
        })
    }

    pub fn get_metrics(&self, id: &str) -> Option<MetricsSnapshot> {
        self.get_scan(id).map(|scan| scan.metrics())
    }

    /// Ids of every registered scan, sorted.
    pub fn scan_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.scans.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes a finished scan and its session state, returning its final report.
    ///
    /// A stopped scan stays `StillActive` until its in-flight work has drained and the
    /// report is sealed.
    pub fn release(&self, id: &str) -> Result<ScanReport, ScanError> {
        let mut scans = self.scans.lock();
        let scan = scans.get(id).ok_or_else(|| ScanError::NotFound(id.to_string()))?;
        if !scan.is_finalized() {
            return Err(ScanError::StillActive(id.to_string()));
        }
        let report = scan.report();
        scans.remove(id);
        self.sessions.forget(id);
        info!(scan_id = id, "Scan released.");
        Ok(report)
    }

    pub fn pause(&self, id: &str) -> Result<ScanState, ScanError> {
        self.require(id)?.pause()
    }

    pub fn resume(&self, id: &str) -> Result<ScanState, ScanError> {
        self.require(id)?.resume()
    }

    pub fn stop(&self, id: &str) -> Result<ScanState, ScanError> {
        self.require(id)?.stop()
    }

    pub fn abort(&self, id: &str) -> Result<ScanState, ScanError> {
        self.require(id)?.abort()
    }

    fn require(&self, id: &str) -> Result<Arc<Scan>, ScanError> {
        self.get_scan(id).ok_or_else(|| ScanError::NotFound(id.to_string()))
    }
}
