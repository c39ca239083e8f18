// src/core/scanner/journey.rs

//! Walks template-declared gated journeys against the target.
//!
//! A journey is judged from both sides: the scan's own [`SessionTracker`] says whether the
//! scanner holds a valid, unspent grant, and the target's response says whether it served the
//! protected resource. Any read the target serves while the tracker says "not authorized" is
//! reported as an issue.

use std::future::Future;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::FetchError;
use crate::core::http::{FetchedResource, HttpClient};
use crate::core::knowledge_base::{self, JOURNEY_GATE_BYPASS, JOURNEY_REPLAY_ACCEPTED};
use crate::core::metrics::ScanMetrics;
use crate::core::models::{DiscoveryMethod, FindingSource, JourneyOutcome, PrivilegedRead, SecurityIssue, Severity};
use crate::core::scanner::state::{Flow, ScanControl};
use crate::core::scanner::vuln_scanner::snippet;
use crate::core::session::{Authorization, SessionTracker};
use crate::core::template::JourneySpec;

/// Everything a journey needs from its scan.
pub struct JourneyContext<'a> {
    pub scan_id: &'a str,
    pub target: &'a Url,
    pub http: &'a HttpClient,
    pub sessions: &'a SessionTracker,
    pub control: &'a ScanControl,
    pub metrics: &'a ScanMetrics,
}

#[derive(Debug, Clone)]
pub struct JourneyRun {
    pub outcome: JourneyOutcome,
    pub issues: Vec<SecurityIssue>,
}

/// Whether the target turned a request away.
pub fn is_refused(response: &FetchedResource, spec: &JourneySpec) -> bool {
    !response.is_success() || response.body.contains(&spec.retry_marker)
}

impl JourneyContext<'_> {
    async fn send<F>(&self, request: F) -> Result<FetchedResource, FetchError>
    where
        F: Future<Output = Result<FetchedResource, FetchError>>,
    {
        self.metrics.request_issued();
        let response = request.await;
        if let Err(e) = &response {
            self.metrics.request_failed();
            warn!(scan_id = self.scan_id, error = %e, "Journey request failed.");
        }
        response
    }

    fn issue(&self, code: &str, parameter: &str, response: &FetchedResource) -> SecurityIssue {
        let detail = knowledge_base::get_finding_detail(code);
        SecurityIssue {
            code: code.to_string(),
            name: detail.map_or_else(|| code.to_string(), |d| d.title.to_string()),
            severity: detail.map_or(Severity::Warning, |d| d.severity),
            parameter: Some(parameter.to_string()),
            origin: None,
            source: FindingSource::new(
                response.url.as_str(),
                format!("HTTP {}: {}", response.status, snippet(&response.body)),
                DiscoveryMethod::Journey,
            ),
        }
    }

    /// Runs one journey to the end. Returns `None` when the scan halted part way through,
    /// in which case nothing from the journey is kept.
    pub async fn walk(&self, spec: &JourneySpec) -> Option<JourneyRun> {
        info!(scan_id = self.scan_id, journey = %spec.name, "Starting journey.");
        let mut outcome = JourneyOutcome { name: spec.name.clone(), ..Default::default() };
        let mut issues = Vec::new();

        let (submit, protected) = match (self.target.join(&spec.submit), self.target.join(&spec.protected)) {
            (Ok(submit), Ok(protected)) => (submit, protected),
            (Err(e), _) | (_, Err(e)) => {
                outcome.error = Some(format!("journey path does not resolve against the target: {e}"));
                return Some(JourneyRun { outcome, issues });
            }
        };
        let params: Vec<(String, String)> = spec.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        self.sessions.enroll(self.scan_id, spec.credential.clone());

        if let Some(form) = &spec.form {
            if self.control.wait_runnable().await == Flow::Halt {
                return None;
            }
            match self.target.join(form) {
                Ok(form_url) => {
                    if let Ok(page) = self.send(self.http.get(&form_url)).await {
                        outcome.form_status = Some(page.status);
                    }
                }
                Err(e) => outcome.error = Some(format!("form path does not resolve: {e}")),
            }
        }

        for decoy in spec.decoys.iter().filter(|decoy| **decoy != spec.credential) {
            if self.control.wait_runnable().await == Flow::Halt {
                return None;
            }
            outcome.decoys_submitted += 1;
            let form = [(spec.field.clone(), decoy.clone())];
            if let Err(e) = self.send(self.http.post_form(&submit, &form)).await {
                outcome.error = Some(e.to_string());
                continue;
            }
            let decision = self.sessions.authorize(self.scan_id, decoy);
            debug!(scan_id = self.scan_id, journey = %spec.name, ?decision, "Decoy submitted.");

            match self.send(self.http.get_with_query(&protected, &params)).await {
                Ok(read) if is_refused(&read, spec) => outcome.decoys_refused += 1,
                Ok(read) => {
                    warn!(scan_id = self.scan_id, url = %read.url, "Protected resource served without authorization.");
                    issues.push(self.issue(JOURNEY_GATE_BYPASS, &spec.field, &read));
                }
                Err(e) => outcome.error = Some(e.to_string()),
            }
        }

        if self.control.wait_runnable().await == Flow::Halt {
            return None;
        }
        let form = [(spec.field.clone(), spec.credential.clone())];
        let accepted = match self.send(self.http.post_form(&submit, &form)).await {
            Ok(response) => !is_refused(&response, spec),
            Err(e) => {
                outcome.error = Some(e.to_string());
                false
            }
        };
        if !accepted || self.sessions.authorize(self.scan_id, &spec.credential) != Authorization::Granted {
            info!(scan_id = self.scan_id, journey = %spec.name, "Credential was not accepted.");
            return Some(JourneyRun { outcome, issues });
        }
        outcome.granted = true;

        if self.sessions.is_authorized(self.scan_id) {
            let read = self.send(self.http.get_with_query(&protected, &params)).await;
            self.sessions.consume(self.scan_id);
            match read {
                Ok(read) => {
                    outcome.privileged_read = Some(PrivilegedRead {
                        uri: read.url.to_string(),
                        status: read.status,
                        accepted: !is_refused(&read, spec),
                        body: read.body,
                    });
                }
                Err(e) => outcome.error = Some(e.to_string()),
            }
        }

        if self.control.wait_runnable().await == Flow::Halt {
            return None;
        }
        if !self.sessions.is_authorized(self.scan_id) {
            match self.send(self.http.get_with_query(&protected, &params)).await {
                Ok(replay) => {
                    let refused = is_refused(&replay, spec);
                    outcome.replay_refused = Some(refused);
                    if !refused {
                        warn!(scan_id = self.scan_id, url = %replay.url, "Spent grant was replayed.");
                        issues.push(self.issue(JOURNEY_REPLAY_ACCEPTED, &spec.field, &replay));
                    }
                }
                Err(e) => outcome.error = Some(e.to_string()),
            }
        }

        info!(scan_id = self.scan_id, journey = %spec.name, issues = issues.len(), "Journey finished.");
        Some(JourneyRun { outcome, issues })
    }
}
