// src/core/scanner/mod.rs

// The scan engine: one `Scan` owns a frontier, a worker pool and the report it fills in.
// The stage modules below are pure functions over a fetched response; this file decides
// which of them run for a given response and commits what they produce.
pub mod crawler;
pub mod discovery;
pub mod fingerprint_scanner;
pub mod journey;
pub mod state;
pub mod vuln_scanner;

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::slice;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::core::error::ScanError;
use crate::core::frontier::{Admission, Frontier, FrontierEntry, Next, Provenance};
use crate::core::http::{FetchedResource, HttpClient};
use crate::core::metrics::{MetricsSnapshot, ScanMetrics};
use crate::core::models::{
    DiscoveryMethod, FindingSource, HiddenResource, JourneyOutcome, PluginMatch, ScanReport, SecurityIssue,
    WebApplication, WebServerFingerprint,
};
use crate::core::session::SessionTracker;
use crate::core::template::{SignalCategory, TemplateProfile, Trigger};

use self::fingerprint_scanner::ServerSignal;
use self::journey::JourneyContext;
use self::state::{Flow, ScanControl, ScanOperation, ScanState};

/// A validated target plus the template it is scanned with.
#[derive(Debug, Clone)]
pub struct ScanContext {
    target: Url,
    profile: Arc<TemplateProfile>,
}

impl ScanContext {
    /// Accepts only absolute `http`/`https` URIs with a host.
    pub fn new(target: &str, profile: Arc<TemplateProfile>) -> Result<Self, ScanError> {
        let invalid = |reason: String| ScanError::InvalidTarget { target: target.to_string(), reason };

        let mut url = Url::parse(target.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("no host".to_string()));
        }
        url.set_fragment(None);
        Ok(Self { target: url, profile })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn profile(&self) -> &Arc<TemplateProfile> {
        &self.profile
    }
}

// --- Stage output ---

#[derive(Debug)]
struct ApplicationHit {
    signature: usize,
    root: Url,
    depth: usize,
    version: Option<String>,
    source: FindingSource,
}

#[derive(Debug)]
struct PluginHit {
    signature: usize,
    plugin: usize,
    root: Url,
    version: Option<String>,
    source: FindingSource,
}

#[derive(Debug)]
struct ServerObservation {
    uri: String,
    method: DiscoveryMethod,
    banner: Option<String>,
    signals: Vec<ServerSignal>,
}

/// What evaluating one response produced. Nothing here is visible until committed.
#[derive(Debug, Default)]
struct StageOutput {
    enqueue: Vec<(Url, usize, Provenance)>,
    hidden: Vec<HiddenResource>,
    server: Option<ServerObservation>,
    applications: Vec<ApplicationHit>,
    plugins: Vec<PluginHit>,
    issues: Vec<SecurityIssue>,
}

/// One scan of one target.
#[derive(Debug)]
pub struct Scan {
    id: String,
    context: ScanContext,
    control: ScanControl,
    frontier: Frontier,
    http: HttpClient,
    sessions: Arc<SessionTracker>,
    metrics: ScanMetrics,
    report: RwLock<ScanReport>,
}

impl Scan {
    pub fn new(id: impl Into<String>, context: ScanContext, sessions: Arc<SessionTracker>) -> Result<Self, ScanError> {
        let id = id.into();
        let http = HttpClient::new(&id, &context.profile().limits())?;
        let report = ScanReport::new(&id, context.target().as_str(), context.profile().id());
        Ok(Self {
            frontier: Frontier::new(context.target()),
            control: ScanControl::new(),
            metrics: ScanMetrics::new(),
            report: RwLock::new(report),
            id,
            context,
            http,
            sessions,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    pub fn state(&self) -> ScanState {
        self.control.state()
    }

    // --- Control ---

    pub fn pause(&self) -> Result<ScanState, ScanError> {
        self.apply(ScanOperation::Pause)
    }

    pub fn resume(&self) -> Result<ScanState, ScanError> {
        self.apply(ScanOperation::Resume)
    }

    /// Stops dispatching new work; in-flight fetches finish and are committed.
    pub fn stop(&self) -> Result<ScanState, ScanError> {
        self.apply(ScanOperation::Stop)
    }

    /// Cancels in-flight work and discards whatever it had not yet committed.
    pub fn abort(&self) -> Result<ScanState, ScanError> {
        self.apply(ScanOperation::Abort)
    }

    fn apply(&self, operation: ScanOperation) -> Result<ScanState, ScanError> {
        let from = self.control.transition(operation)?;
        let to = self.control.state();
        info!(scan_id = %self.id, %operation, %from, %to, "Scan control applied.");
        // Nothing runs a scan that never started, so it is sealed here.
        if from == ScanState::Created {
            self.finalize();
        }
        Ok(to)
    }

    /// Resolves once the scan has reached a terminal state.
    pub async fn finished(&self) -> ScanState {
        self.control.finished().await
    }

    // --- Results ---

    pub fn metrics(&self) -> MetricsSnapshot {
        let report = self.report.read();
        if report.is_terminal() {
            return report.metrics;
        }
        self.snapshot(&report)
    }

    /// Whether the report has been sealed. A stopped scan is terminal before this holds,
    /// while its in-flight work drains.
    pub fn is_finalized(&self) -> bool {
        self.report.read().is_terminal()
    }

    /// A consistent copy of everything found so far.
    pub fn report(&self) -> ScanReport {
        let mut report = self.report.read().clone();
        if !report.is_terminal() {
            report.state = self.control.state();
            report.hidden_resources = self.unlinked(&report.hidden_resources);
            report.metrics = self.snapshot(&report);
        }
        report
    }

    pub fn web_server(&self) -> WebServerFingerprint {
        self.report.read().web_server.clone()
    }

    pub fn hidden_resources(&self) -> Vec<HiddenResource> {
        self.unlinked(&self.report.read().hidden_resources)
    }

    pub fn web_applications(&self) -> Vec<WebApplication> {
        self.report.read().web_applications.clone()
    }

    pub fn security_issues(&self) -> Vec<SecurityIssue> {
        self.report.read().security_issues.clone()
    }

    pub fn journeys(&self) -> Vec<JourneyOutcome> {
        self.report.read().journeys.clone()
    }

    // --- Execution ---

    /// Drives the scan to a terminal state and returns the final report.
    ///
    /// Crawling, discovery, fingerprinting and detection share one frontier worked by
    /// `limits.workers` tasks. Once the frontier drains, the template's journeys are walked
    /// and the scan completes, unless it was stopped or aborted first.
    pub async fn run(self: Arc<Self>) -> ScanReport {
        if let Err(e) = self.control.transition(ScanOperation::Start) {
            warn!(scan_id = %self.id, error = %e, "Scan did not start.");
            return self.finalize();
        }

        let profile = self.context.profile().clone();
        let limits = profile.limits();
        info!(
            scan_id = %self.id,
            target = %self.context.target(),
            template = profile.id(),
            workers = limits.workers,
            max_depth = limits.max_depth,
            "Starting scan."
        );
        self.metrics.mark_started();
        self.report.write().started_at = Some(chrono::Utc::now());
        self.frontier.insert(self.context.target().clone(), 0, Provenance::Seed);

        let mut workers = JoinSet::new();
        for worker in 0..limits.workers {
            let scan = Arc::clone(&self);
            workers.spawn(async move { scan.work(worker).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(scan_id = %self.id, error = %e, "Scan worker failed.");
            }
        }

        if profile.modules().journeys && self.control.wait_runnable().await == Flow::Proceed {
            self.run_journeys().await;
        }

        while self.control.wait_runnable().await == Flow::Proceed {
            if self.control.transition(ScanOperation::Complete).is_ok() {
                break;
            }
        }
        self.finalize()
    }

    async fn work(self: Arc<Self>, worker: usize) {
        debug!(scan_id = %self.id, worker, "Worker started.");
        let mut rx = self.control.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ScanState::Running => {}
                ScanState::Created | ScanState::Paused => {
                    if rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                ScanState::Stopped | ScanState::Aborted | ScanState::Completed => break,
            }

            let next = tokio::select! {
                next = self.frontier.next() => next,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let entry = match next {
                Next::Entry(entry) => entry,
                Next::Idle => break,
            };

            let output = tokio::select! {
                output = self.process(entry) => output,
                _ = self.control.aborted() => {
                    debug!(scan_id = %self.id, worker, "In-flight work discarded.");
                    break;
                }
            };
            self.commit(output);
            self.frontier.settle();
        }
        debug!(scan_id = %self.id, worker, "Worker finished.");
    }

    /// Fetches one entry and evaluates the response against every lead that reached it.
    async fn process(&self, entry: FrontierEntry) -> StageOutput {
        self.metrics.request_issued();
        match self.http.get(&entry.url).await {
            Ok(resource) => {
                let resource = Arc::new(resource);
                let late = self.frontier.complete(&entry.key, Some(Arc::clone(&resource)), &entry.provenance);
                let mut leads = entry.provenance;
                leads.extend(late);
                self.evaluate(&resource, entry.depth, &leads, true, true)
            }
            Err(e) => {
                warn!(scan_id = %self.id, url = %entry.url, error = %e, "Probe failed, resource marked unreachable.");
                self.metrics.request_failed();
                self.frontier.complete(&entry.key, None, &entry.provenance);
                StageOutput::default()
            }
        }
    }

    /// Runs the stages for one response: crawl, discover, fingerprint, detect.
    ///
    /// `run_page` is false when the page stages already ran for this URI; `fresh` is false
    /// when the response was fetched earlier and only new leads are being evaluated. Any
    /// wordlist lead makes the response a hidden-resource candidate; whether it is reported
    /// is settled against the frontier's links when results are read.
    fn evaluate(
        &self,
        resource: &FetchedResource,
        depth: usize,
        leads: &[Provenance],
        run_page: bool,
        fresh: bool,
    ) -> StageOutput {
        let profile = self.context.profile();
        let modules = profile.modules();
        let limits = profile.limits();
        let mut out = StageOutput::default();

        let found = !profile.discovery().is_not_found(resource.status);
        let method = leads.first().map_or(DiscoveryMethod::Seed, Provenance::method);
        let is_seed = leads.contains(&Provenance::Seed);
        let probed = found && leads.iter().any(Provenance::is_wordlist);
        let page = run_page && found && leads.iter().any(Provenance::is_page);

        if page && modules.crawler {
            for link in crawler::crawl(resource, depth, limits.max_depth, self.context.target()) {
                if modules.discovery {
                    for dir in discovery::ancestors(&link, self.context.target()) {
                        out.enqueue.push((dir, depth + 1, Provenance::WordlistProbed { from: resource.url.clone() }));
                    }
                }
                out.enqueue.push((link, depth + 1, Provenance::Crawled { from: resource.url.clone() }));
            }
        }

        if probed {
            out.hidden.push(discovery::hidden_resource(resource));
        }
        if page && modules.discovery {
            for candidate in discovery::discover(resource, depth, profile) {
                out.enqueue.push((candidate, depth + 1, Provenance::WordlistProbed { from: resource.url.clone() }));
            }
        }

        if modules.fingerprint {
            if page {
                self.queue_application_probes(resource, depth, is_seed, false, &mut out);
            }
            if probed {
                self.queue_application_probes(resource, depth, is_seed, true, &mut out);
            }
            for lead in leads {
                if found {
                    self.match_probe_lead(resource, lead, depth, &mut out);
                }
            }
            if fresh {
                let banner = resource.header("server").map(str::to_string);
                let signals = fingerprint_scanner::match_server_rules(resource, profile.server_rules());
                if banner.is_some() || !signals.is_empty() {
                    out.server = Some(ServerObservation { uri: resource.url.to_string(), method, banner, signals });
                }
            }
        }

        if modules.vulnerabilities {
            if fresh {
                let origin = leads.iter().find_map(|lead| match lead {
                    Provenance::Mutated { origin, .. } => Some(origin),
                    _ => None,
                });
                let method = if origin.is_some() { DiscoveryMethod::Mutated } else { method };
                out.issues = vuln_scanner::apply_content_rules(resource, profile.content_rules(), method, origin);
            }
            let discovered = leads
                .iter()
                .any(|lead| matches!(lead, Provenance::Crawled { .. } | Provenance::WordlistProbed { .. }));
            if page && discovered {
                for (url, rule) in vuln_scanner::mutate(&resource.url, profile.mutations()) {
                    out.enqueue.push((url, depth + 1, Provenance::Mutated { origin: resource.url.clone(), rule }));
                }
            }
        }
        out
    }

    // Runs twice per directory at most: once with the page stages for root and directory
    // triggers, once for the first wordlist lead for hidden-directory triggers.
    fn queue_application_probes(
        &self,
        resource: &FetchedResource,
        depth: usize,
        is_seed: bool,
        hidden: bool,
        out: &mut StageOutput,
    ) {
        let root = if discovery::is_directory_like(&resource.url) {
            discovery::as_directory(&resource.url)
        } else if is_seed {
            match resource.url.join(".") {
                Ok(parent) => parent,
                Err(_) => return,
            }
        } else {
            return;
        };

        for (index, signature) in self.context.profile().applications().iter().enumerate() {
            if matches!(signature.trigger, Trigger::HiddenDirectory { .. }) != hidden {
                continue;
            }
            if !fingerprint_scanner::is_triggered(&signature.trigger, &root, is_seed, hidden) {
                continue;
            }
            debug!(scan_id = %self.id, app = %signature.name, root = %root, "Application signature triggered.");
            for (probe_index, probe) in signature.probes.iter().enumerate() {
                if let Ok(url) = root.join(&probe.path) {
                    let lead = Provenance::FingerprintProbe { signature: index, probe: probe_index, root: root.clone() };
                    out.enqueue.push((url, depth + 1, lead));
                }
            }
        }
    }

    fn match_probe_lead(&self, resource: &FetchedResource, lead: &Provenance, depth: usize, out: &mut StageOutput) {
        let applications = self.context.profile().applications();
        match lead {
            Provenance::FingerprintProbe { signature, probe, root } => {
                let Some(probe_spec) = applications.get(*signature).and_then(|s| s.probes.get(*probe)) else {
                    return;
                };
                if let Some(version) = fingerprint_scanner::match_probe(resource, probe_spec) {
                    out.applications.push(ApplicationHit {
                        signature: *signature,
                        root: root.clone(),
                        depth,
                        source: FindingSource::new(
                            resource.url.as_str(),
                            evidence_for(resource, &version),
                            DiscoveryMethod::FingerprintProbe,
                        ),
                        version,
                    });
                }
            }
            Provenance::NestedProbe { signature, plugin, probe, root } => {
                let Some(probe_spec) = applications
                    .get(*signature)
                    .and_then(|s| s.plugins.get(*plugin))
                    .and_then(|p| p.probes.get(*probe))
                else {
                    return;
                };
                if let Some(version) = fingerprint_scanner::match_probe(resource, probe_spec) {
                    out.plugins.push(PluginHit {
                        signature: *signature,
                        plugin: *plugin,
                        root: root.clone(),
                        source: FindingSource::new(
                            resource.url.as_str(),
                            evidence_for(resource, &version),
                            DiscoveryMethod::NestedProbe,
                        ),
                        version,
                    });
                }
            }
            _ => {}
        }
    }

    /// Publishes stage output, then queues what it asked for. Leads that land on an already
    /// fetched URI are evaluated right here against the stored response.
    fn commit(&self, output: StageOutput) {
        let mut pending = vec![output];
        while let Some(output) = pending.pop() {
            let StageOutput { mut enqueue, hidden, server, applications, plugins, issues } = output;
            let Some(identified) = self.record(hidden, server, applications, plugins, issues) else {
                return;
            };
            for (signature, root, depth) in identified {
                enqueue.extend(self.nested_probes(signature, &root, depth));
            }

            for (url, depth, lead) in enqueue {
                match self.frontier.insert(url, depth, lead.clone()) {
                    Admission::Fetched { resource, run_page } => {
                        pending.push(self.evaluate(&resource, depth, slice::from_ref(&lead), run_page, false));
                    }
                    Admission::Queued | Admission::Merged | Admission::Duplicate | Admission::OutOfScope => {}
                }
            }
        }
    }

    // Plugin probes are only generated here, after the parent application is on record.
    fn nested_probes(&self, signature: usize, root: &Url, depth: usize) -> Vec<(Url, usize, Provenance)> {
        let Some(application) = self.context.profile().applications().get(signature) else {
            return Vec::new();
        };
        let mut probes = Vec::new();
        for (plugin_index, plugin) in application.plugins.iter().enumerate() {
            for (probe_index, probe) in plugin.probes.iter().enumerate() {
                if let Ok(url) = root.join(&probe.path) {
                    let lead = Provenance::NestedProbe {
                        signature,
                        plugin: plugin_index,
                        probe: probe_index,
                        root: root.clone(),
                    };
                    probes.push((url, depth + 1, lead));
                }
            }
        }
        probes
    }

    /// Appends findings to the report. Returns the newly identified applications, or `None`
    /// once the report is final.
    fn record(
        &self,
        hidden: Vec<HiddenResource>,
        server: Option<ServerObservation>,
        applications: Vec<ApplicationHit>,
        plugins: Vec<PluginHit>,
        issues: Vec<SecurityIssue>,
    ) -> Option<Vec<(usize, Url, usize)>> {
        if self.control.state() == ScanState::Aborted {
            return None;
        }
        let signatures = self.context.profile().applications();
        let mut report = self.report.write();
        if report.is_terminal() {
            return None;
        }

        for resource in hidden {
            if report.hidden_resources.iter().any(|known| known.source.uri == resource.source.uri) {
                continue;
            }
            debug!(scan_id = %self.id, uri = %resource.source.uri, status = resource.status, "Hidden resource candidate.");
            report.hidden_resources.push(resource);
        }

        if let Some(observation) = server {
            merge_server(&mut report.web_server, observation);
        }

        let mut identified = Vec::new();
        for hit in applications {
            let Some(signature) = signatures.get(hit.signature) else { continue };
            let root = hit.root.to_string();
            if let Some(known) = report.web_applications.iter_mut().find(|app| app.name == signature.name && app.root == root) {
                if known.version.is_none() && hit.version.is_some() {
                    known.version = hit.version;
                }
                continue;
            }
            info!(scan_id = %self.id, app = %signature.name, version = ?hit.version, root = %root, "Web application identified.");
            self.metrics.web_application_found();
            report.web_applications.push(WebApplication {
                name: signature.name.clone(),
                version: hit.version,
                root,
                source: hit.source,
                plugins: Vec::new(),
            });
            identified.push((hit.signature, hit.root, hit.depth));
        }

        for hit in plugins {
            let Some(signature) = signatures.get(hit.signature) else { continue };
            let Some(plugin) = signature.plugins.get(hit.plugin) else { continue };
            let root = hit.root.to_string();
            let Some(parent) = report.web_applications.iter_mut().find(|app| app.name == signature.name && app.root == root)
            else {
                continue;
            };
            if parent.plugins.iter().any(|known| known.name == plugin.name) {
                continue;
            }
            info!(scan_id = %self.id, app = %signature.name, plugin = %plugin.name, version = ?hit.version, "Plugin identified.");
            self.metrics.plugin_found();
            parent.plugins.push(PluginMatch { name: plugin.name.clone(), version: hit.version, source: hit.source });
        }

        for issue in issues {
            self.push_issue(&mut report, issue);
        }
        Some(identified)
    }

    fn push_issue(&self, report: &mut ScanReport, issue: SecurityIssue) {
        let duplicate = report
            .security_issues
            .iter()
            .any(|known| known.code == issue.code && known.source.uri == issue.source.uri);
        if duplicate {
            return;
        }
        info!(
            scan_id = %self.id,
            code = %issue.code,
            severity = ?issue.severity,
            uri = %issue.source.uri,
            origin = ?issue.origin,
            "Security issue found."
        );
        self.metrics.security_issue_found();
        report.security_issues.push(issue);
    }

    async fn run_journeys(&self) {
        let profile = self.context.profile();
        let context = JourneyContext {
            scan_id: &self.id,
            target: self.context.target(),
            http: &self.http,
            sessions: &self.sessions,
            control: &self.control,
            metrics: &self.metrics,
        };
        for spec in profile.journeys() {
            let walked = tokio::select! {
                walked = context.walk(spec) => walked,
                _ = self.control.aborted() => None,
            };
            let Some(run) = walked else {
                debug!(scan_id = %self.id, journey = %spec.name, "Journey interrupted.");
                break;
            };
            if self.control.state() == ScanState::Aborted {
                break;
            }
            let mut report = self.report.write();
            for issue in run.issues {
                self.push_issue(&mut report, issue);
            }
            report.journeys.push(run.outcome);
        }
    }

    /// Hidden-resource candidates that no seed or crawled link ever reached.
    fn unlinked(&self, candidates: &[HiddenResource]) -> Vec<HiddenResource> {
        candidates
            .iter()
            .filter(|candidate| Url::parse(&candidate.source.uri).map_or(true, |url| !self.frontier.is_linked(&url)))
            .cloned()
            .collect()
    }

    fn snapshot(&self, report: &ScanReport) -> MetricsSnapshot {
        let (queued, in_flight) = self.frontier.counts();
        self.metrics.snapshot(queued, in_flight, self.unlinked(&report.hidden_resources).len())
    }

    /// Seals the report with the terminal state. Later commits are ignored.
    fn finalize(&self) -> ScanReport {
        self.metrics.mark_finished();
        let mut report = self.report.write();
        if !report.is_terminal() {
            report.hidden_resources = self.unlinked(&report.hidden_resources);
            for hidden in &report.hidden_resources {
                info!(scan_id = %self.id, uri = %hidden.source.uri, status = hidden.status, "Hidden resource found.");
            }
            report.state = self.control.state();
            report.finished_at = Some(chrono::Utc::now());
            report.metrics = self.snapshot(&report);
        }
        let summary = report.summary();
        info!(
            scan_id = %self.id,
            state = %report.state,
            requests = report.metrics.requests_issued,
            hidden = report.hidden_resources.len(),
            applications = report.web_applications.len(),
            issues = report.security_issues.len(),
            score = summary.score,
            "Scan finished."
        );
        report.clone()
    }
}

fn evidence_for(resource: &FetchedResource, version: &Option<String>) -> String {
    match version {
        Some(version) => format!("HTTP {} matched version {}", resource.status, version),
        None => format!("HTTP {} matched", resource.status),
    }
}

// Labels are `Name` or `Name/version`; a versioned label replaces the bare one.
fn merge_label(set: &mut BTreeSet<String>, signal: &ServerSignal) -> bool {
    let label = signal.label();
    if set.contains(&label) {
        return false;
    }
    let prefix = format!("{}/", signal.name);
    if signal.version.is_none() {
        if set.iter().any(|known| known.starts_with(&prefix)) {
            return false;
        }
    } else {
        set.remove(&signal.name);
    }
    set.insert(label)
}

fn merge_server(fingerprint: &mut WebServerFingerprint, observation: ServerObservation) {
    let ServerObservation { uri, method, banner, signals } = observation;
    if let Some(banner) = banner {
        if fingerprint.server.is_none() {
            fingerprint.sources.push(FindingSource::new(&uri, format!("Server: {banner}"), method));
            fingerprint.server = Some(banner);
        }
    }
    for signal in signals {
        let added = match signal.category {
            SignalCategory::Server => {
                if fingerprint.server.is_none() {
                    fingerprint.server = Some(signal.label());
                    true
                } else {
                    false
                }
            }
            SignalCategory::Framework => merge_label(&mut fingerprint.frameworks, &signal),
            SignalCategory::Language => merge_label(&mut fingerprint.languages, &signal),
        };
        if added {
            let evidence = format!("{:?} signal {}", signal.category, signal.label());
            fingerprint.sources.push(FindingSource::new(&uri, evidence, method));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Arc<TemplateProfile> {
        Arc::new(TemplateProfile::builtin().unwrap())
    }

    #[test]
    fn context_rejects_bad_targets() {
        for target in ["example.com/path", "ftp://example.com/", "mailto:a@b.c", "", "http://"] {
            assert!(
                matches!(ScanContext::new(target, profile()), Err(ScanError::InvalidTarget { .. })),
                "{target} should be rejected"
            );
        }
    }

    #[test]
    fn context_accepts_http_targets() {
        let context = ScanContext::new(" https://example.com/app/#top ", profile()).unwrap();
        assert_eq!(context.target().as_str(), "https://example.com/app/");
    }

    #[test]
    fn versioned_labels_replace_bare_ones() {
        let mut set = BTreeSet::new();
        let bare = ServerSignal { category: SignalCategory::Language, name: "PHP".into(), version: None };
        let versioned = ServerSignal { version: Some("8.2".into()), ..bare.clone() };
        assert!(merge_label(&mut set, &bare));
        assert!(merge_label(&mut set, &versioned));
        assert!(!merge_label(&mut set, &bare));
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["PHP/8.2".to_string()]);
    }

    #[test]
    fn first_banner_wins() {
        let mut fingerprint = WebServerFingerprint::default();
        let observe = |banner: &str| ServerObservation {
            uri: "http://t.test/".into(),
            method: DiscoveryMethod::Seed,
            banner: Some(banner.into()),
            signals: Vec::new(),
        };
        merge_server(&mut fingerprint, observe("nginx/1.25"));
        merge_server(&mut fingerprint, observe("Apache"));
        assert_eq!(fingerprint.server.as_deref(), Some("nginx/1.25"));
        assert_eq!(fingerprint.sources.len(), 1);
    }
}
