// src/core/session.rs

//! Per-scan authorization state for gated journeys.
//!
//! Each scan id owns exactly one gate. A gate only opens for the credential it was enrolled
//! with, and an open gate admits a single privileged read before closing again.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Authorization {
    Granted,
    Denied,
}

#[derive(Debug, Default)]
struct Gate {
    expected: Option<String>,
    authorized: bool,
}

/// Keyed table of journey gates, one per scan.
#[derive(Debug, Default)]
pub struct SessionTracker {
    gates: Mutex<HashMap<String, Gate>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or re-registers) the credential that opens the gate for `scan_id`.
    /// Any outstanding authorization is dropped.
    pub fn enroll(&self, scan_id: &str, expected: impl Into<String>) {
        let mut gates = self.gates.lock();
        let gate = gates.entry(scan_id.to_string()).or_default();
        gate.expected = Some(expected.into());
        gate.authorized = false;
    }

    pub fn authorize(&self, scan_id: &str, submitted: &str) -> Authorization {
        let mut gates = self.gates.lock();
        let Some(gate) = gates.get_mut(scan_id) else {
            debug!(scan_id, "Authorization requested for unknown scan.");
            return Authorization::Denied;
        };

        if gate.expected.as_deref() == Some(submitted) {
            gate.authorized = true;
            Authorization::Granted
        } else {
            gate.authorized = false;
            Authorization::Denied
        }
    }

    pub fn is_authorized(&self, scan_id: &str) -> bool {
        self.gates.lock().get(scan_id).is_some_and(|gate| gate.authorized)
    }

    /// Spends the authorization of `scan_id`. Returns whether there was one to spend.
    pub fn consume(&self, scan_id: &str) -> bool {
        let mut gates = self.gates.lock();
        match gates.get_mut(scan_id) {
            Some(gate) => std::mem::take(&mut gate.authorized),
            None => false,
        }
    }

    pub fn forget(&self, scan_id: &str) {
        self.gates.lock().remove(scan_id);
    }
}
