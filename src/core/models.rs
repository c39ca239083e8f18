// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::Display;

use crate::core::metrics::MetricsSnapshot;
use crate::core::scanner::state::ScanState;

// --- Shared Enums ---

// An enumeration representing the severity level of a finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// How a resource entered the scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryMethod {
    Seed,
    Crawled,
    WordlistProbed,
    Mutated,
    FingerprintProbe,
    NestedProbe,
    Journey,
}

// --- Findings ---

/// The fields every finding carries: where it was seen, the raw evidence, and how the
/// resource was reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindingSource {
    pub uri: String,
    pub evidence: String,
    pub method: DiscoveryMethod,
    pub found_at: DateTime<Utc>,
}

impl FindingSource {
    pub fn new(uri: impl Into<String>, evidence: impl Into<String>, method: DiscoveryMethod) -> Self {
        Self { uri: uri.into(), evidence: evidence.into(), method, found_at: Utc::now() }
    }
}

// A resource reached through wordlist probing rather than a followed link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HiddenResource {
    #[serde(flatten)]
    pub source: FindingSource,
    pub status: u16,
}

// A plugin identified underneath an already identified web application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginMatch {
    pub name: String,
    pub version: Option<String>,
    #[serde(flatten)]
    pub source: FindingSource,
}

// An identified web application (CMS, framework install) rooted at a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebApplication {
    pub name: String,
    pub version: Option<String>,
    pub root: String,
    #[serde(flatten)]
    pub source: FindingSource,
    pub plugins: Vec<PluginMatch>,
}

/// Server and platform signals collected from headers and banners across the whole scan.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WebServerFingerprint {
    pub server: Option<String>,
    pub frameworks: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub sources: Vec<FindingSource>,
}

impl WebServerFingerprint {
    pub fn is_empty(&self) -> bool {
        self.server.is_none() && self.frameworks.is_empty() && self.languages.is_empty()
    }
}

// A flagged weakness. `origin` is set when the affected URI was produced by link mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityIssue {
    pub code: String,
    pub name: String,
    pub severity: Severity,
    pub parameter: Option<String>,
    pub origin: Option<String>,
    #[serde(flatten)]
    pub source: FindingSource,
}

// --- Journeys ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivilegedRead {
    pub uri: String,
    pub status: u16,
    pub body: String,
    pub accepted: bool,
}

/// What happened when a gated journey was walked against the target.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct JourneyOutcome {
    pub name: String,
    pub form_status: Option<u16>,
    pub decoys_submitted: usize,
    pub decoys_refused: usize,
    pub granted: bool,
    pub privileged_read: Option<PrivilegedRead>,
    pub replay_refused: Option<bool>,
    pub error: Option<String>,
}

// --- Main Report ---

/// Everything one scan produced. Collections only ever grow while the scan runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub target: String,
    pub template: String,
    pub state: ScanState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub web_server: WebServerFingerprint,
    pub hidden_resources: Vec<HiddenResource>,
    pub web_applications: Vec<WebApplication>,
    pub security_issues: Vec<SecurityIssue>,
    pub journeys: Vec<JourneyOutcome>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub score: u8,
    pub critical_issues: usize,
    pub warning_issues: usize,
}

impl ScanReport {
    pub fn new(scan_id: &str, target: &str, template: &str) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            target: target.to_string(),
            template: template.to_string(),
            state: ScanState::Created,
            started_at: None,
            finished_at: None,
            web_server: WebServerFingerprint::default(),
            hidden_resources: Vec::new(),
            web_applications: Vec::new(),
            security_issues: Vec::new(),
            journeys: Vec::new(),
            metrics: MetricsSnapshot::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Scores the report from its issue severities: critical costs 15 points, warnings 5.
    pub fn summary(&self) -> ScanSummary {
        let criticals = self.security_issues.iter().filter(|i| i.severity == Severity::Critical).count();
        let warnings = self.security_issues.iter().filter(|i| i.severity == Severity::Warning).count();

        let score = 100_i64
            .saturating_sub(criticals as i64 * 15)
            .saturating_sub(warnings as i64 * 5);

        ScanSummary {
            score: score.clamp(0, 100) as u8,
            critical_issues: criticals,
            warning_issues: warnings,
        }
    }

    pub fn web_application(&self, name: &str) -> Option<&WebApplication> {
        self.web_applications.iter().find(|app| app.name.eq_ignore_ascii_case(name))
    }

    pub fn issues_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a SecurityIssue> + 'a {
        self.security_issues.iter().filter(move |issue| issue.code == code)
    }
}
