// src/core/template.rs

//! Scan templates: the JSON document a profile is loaded from, and the validated,
//! compiled form the scanner consumes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

use crate::core::error::TemplateError;
use crate::core::knowledge_base;
use crate::core::models::Severity;

// --- Document (as written on disk) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: ModuleToggles,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub fingerprint: FingerprintCatalog,
    #[serde(default)]
    pub vulnerabilities: VulnerabilityCatalog,
    #[serde(default)]
    pub journeys: Vec<JourneySpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModuleToggles {
    pub crawler: bool,
    pub discovery: bool,
    pub fingerprint: bool,
    pub vulnerabilities: bool,
    pub journeys: bool,
}

impl Default for ModuleToggles {
    fn default() -> Self {
        Self { crawler: true, discovery: true, fingerprint: true, vulnerabilities: true, journeys: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    /// Maximum link/directory depth below the start URI.
    pub max_depth: usize,
    pub workers: usize,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 6, workers: 8, request_timeout_secs: 10, max_body_bytes: 1024 * 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub wordlist: Vec<String>,
    pub not_found_statuses: BTreeSet<u16>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { wordlist: Vec::new(), not_found_statuses: BTreeSet::from([404]) }
    }
}

impl DiscoveryConfig {
    pub fn is_not_found(&self, status: u16) -> bool {
        self.not_found_statuses.contains(&status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FingerprintCatalog {
    pub applications: Vec<ApplicationSignatureSpec>,
    pub server: Vec<ServerRuleSpec>,
}

/// When an application signature's probes should be sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// The start URI.
    Root,
    /// Any confirmed directory, optionally only one whose last segment is `name`.
    Directory {
        #[serde(default)]
        name: Option<String>,
    },
    /// A directory found by wordlist probing, optionally only one named `name`.
    HiddenDirectory {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Path appended to the directory that triggered the signature.
    pub path: String,
    /// Matched against the response body; capture group 1, if any, is the version.
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSignatureSpec {
    pub name: String,
    pub probes: Vec<ProbeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSignatureSpec {
    pub name: String,
    pub trigger: Trigger,
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub plugins: Vec<PluginSignatureSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Server,
    Framework,
    Language,
}

/// Where a server/platform rule looks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSource {
    Header { name: String },
    Cookie,
    Body,
    MetaTag { name: String },
    ScriptSrc,
    LinkHref,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRuleSpec {
    pub name: String,
    pub category: SignalCategory,
    pub source: SignalSource,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VulnerabilityCatalog {
    pub content_rules: Vec<ContentRuleSpec>,
    pub mutations: Vec<MutationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRuleSpec {
    pub code: String,
    pub name: String,
    pub severity: Severity,
    pub pattern: String,
    #[serde(default)]
    pub parameter: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Add `segment` below the link, treating the link as a directory.
    Append,
    /// Swap the last path segment of the link for `segment`.
    ReplaceLast,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationRule {
    pub name: String,
    pub action: MutationAction,
    pub segment: String,
}

/// A gated multi-step flow: submit a credential, then read the protected resource once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JourneySpec {
    pub name: String,
    #[serde(default)]
    pub form: Option<String>,
    pub submit: String,
    pub field: String,
    pub credential: String,
    #[serde(default)]
    pub decoys: Vec<String>,
    pub protected: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub retry_marker: String,
}

// --- Compiled profile ---

#[derive(Debug, Clone)]
pub struct Probe {
    pub path: String,
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct PluginSignature {
    pub name: String,
    pub probes: Vec<Probe>,
}

#[derive(Debug, Clone)]
pub struct ApplicationSignature {
    pub name: String,
    pub trigger: Trigger,
    pub probes: Vec<Probe>,
    pub plugins: Vec<PluginSignature>,
}

#[derive(Debug, Clone)]
pub struct ServerRule {
    pub name: String,
    pub category: SignalCategory,
    pub source: SignalSource,
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct ContentRule {
    pub code: String,
    pub name: String,
    pub severity: Severity,
    pub parameter: Option<String>,
    pub pattern: Regex,
}

/// A validated template. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TemplateProfile {
    document: TemplateDocument,
    applications: Vec<ApplicationSignature>,
    server_rules: Vec<ServerRule>,
    content_rules: Vec<ContentRule>,
}

fn compile_pattern(field: String, pattern: &str) -> Result<Regex, TemplateError> {
    Regex::new(pattern).map_err(|source| TemplateError::InvalidPattern { field, source })
}

fn compile_probes(field: &str, probes: &[ProbeSpec]) -> Result<Vec<Probe>, TemplateError> {
    if probes.is_empty() {
        return Err(TemplateError::invalid(field, "at least one probe is required"));
    }
    probes
        .iter()
        .enumerate()
        .map(|(i, probe)| {
            if probe.path.trim().is_empty() {
                return Err(TemplateError::invalid(format!("{field}[{i}].path"), "must not be empty"));
            }
            Ok(Probe {
                path: probe.path.trim_start_matches('/').to_string(),
                pattern: compile_pattern(format!("{field}[{i}].pattern"), &probe.pattern)?,
            })
        })
        .collect()
}

fn require(field: &str, value: &str) -> Result<(), TemplateError> {
    if value.trim().is_empty() {
        Err(TemplateError::invalid(field, "must not be empty"))
    } else {
        Ok(())
    }
}

impl TemplateProfile {
    /// Parses and validates a JSON template.
    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let document: TemplateDocument = serde_json::from_str(json)?;
        Self::compile(document)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading template file.");
        let json = std::fs::read_to_string(path)
            .map_err(|source| TemplateError::Read { path: path.to_path_buf(), source })?;
        Self::from_json_str(&json)
    }

    /// The default profile assembled from the knowledge base.
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::compile(knowledge_base::builtin_template())
    }

    pub fn compile(document: TemplateDocument) -> Result<Self, TemplateError> {
        require("id", &document.id)?;
        require("name", &document.name)?;

        let limits = document.limits;
        if limits.workers == 0 {
            return Err(TemplateError::invalid("limits.workers", "must be at least 1"));
        }
        if limits.request_timeout_secs == 0 {
            return Err(TemplateError::invalid("limits.request_timeout_secs", "must be at least 1"));
        }
        if limits.max_body_bytes == 0 {
            return Err(TemplateError::invalid("limits.max_body_bytes", "must be at least 1"));
        }

        for (i, word) in document.discovery.wordlist.iter().enumerate() {
            if word.trim_matches('/').trim().is_empty() || word.chars().any(char::is_whitespace) {
                return Err(TemplateError::invalid(
                    format!("discovery.wordlist[{i}]"),
                    format!("'{word}' is not a usable path segment"),
                ));
            }
        }
        if let Some(status) = document.discovery.not_found_statuses.iter().find(|s| !(100..=599).contains(*s)) {
            return Err(TemplateError::invalid("discovery.not_found_statuses", format!("{status} is not an HTTP status")));
        }

        let applications = document
            .fingerprint
            .applications
            .iter()
            .enumerate()
            .map(|(i, app)| {
                let field = format!("fingerprint.applications[{i}]");
                require(&format!("{field}.name"), &app.name)?;
                let plugins = app
                    .plugins
                    .iter()
                    .enumerate()
                    .map(|(j, plugin)| {
                        let field = format!("{field}.plugins[{j}]");
                        require(&format!("{field}.name"), &plugin.name)?;
                        Ok(PluginSignature {
                            name: plugin.name.clone(),
                            probes: compile_probes(&format!("{field}.probes"), &plugin.probes)?,
                        })
                    })
                    .collect::<Result<Vec<_>, TemplateError>>()?;
                Ok(ApplicationSignature {
                    name: app.name.clone(),
                    trigger: app.trigger.clone(),
                    probes: compile_probes(&format!("{field}.probes"), &app.probes)?,
                    plugins,
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let server_rules = document
            .fingerprint
            .server
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                require(&format!("fingerprint.server[{i}].name"), &rule.name)?;
                Ok(ServerRule {
                    name: rule.name.clone(),
                    category: rule.category,
                    source: rule.source.clone(),
                    pattern: compile_pattern(format!("fingerprint.server[{i}].pattern"), &rule.pattern)?,
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let content_rules = document
            .vulnerabilities
            .content_rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                require(&format!("vulnerabilities.content_rules[{i}].code"), &rule.code)?;
                Ok(ContentRule {
                    code: rule.code.clone(),
                    name: rule.name.clone(),
                    severity: rule.severity,
                    parameter: rule.parameter.clone(),
                    pattern: compile_pattern(format!("vulnerabilities.content_rules[{i}].pattern"), &rule.pattern)?,
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        for (i, rule) in document.vulnerabilities.mutations.iter().enumerate() {
            let segment = rule.segment.trim_matches('/');
            if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                return Err(TemplateError::invalid(
                    format!("vulnerabilities.mutations[{i}].segment"),
                    format!("'{}' is not a usable path segment", rule.segment),
                ));
            }
        }

        for (i, journey) in document.journeys.iter().enumerate() {
            let field = format!("journeys[{i}]");
            require(&format!("{field}.name"), &journey.name)?;
            require(&format!("{field}.submit"), &journey.submit)?;
            require(&format!("{field}.field"), &journey.field)?;
            require(&format!("{field}.credential"), &journey.credential)?;
            require(&format!("{field}.protected"), &journey.protected)?;
            require(&format!("{field}.retry_marker"), &journey.retry_marker)?;
        }

        info!(
            template = %document.id,
            applications = applications.len(),
            server_rules = server_rules.len(),
            content_rules = content_rules.len(),
            words = document.discovery.wordlist.len(),
            "Template loaded."
        );

        Ok(Self { document, applications, server_rules, content_rules })
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn name(&self) -> &str {
        &self.document.name
    }

    pub fn description(&self) -> &str {
        &self.document.description
    }

    pub fn document(&self) -> &TemplateDocument {
        &self.document
    }

    pub fn modules(&self) -> ModuleToggles {
        self.document.modules
    }

    pub fn limits(&self) -> Limits {
        self.document.limits
    }

    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.document.discovery
    }

    pub fn applications(&self) -> &[ApplicationSignature] {
        &self.applications
    }

    pub fn server_rules(&self) -> &[ServerRule] {
        &self.server_rules
    }

    pub fn content_rules(&self) -> &[ContentRule] {
        &self.content_rules
    }

    pub fn mutations(&self) -> &[MutationRule] {
        &self.document.vulnerabilities.mutations
    }

    pub fn journeys(&self) -> &[JourneySpec] {
        &self.document.journeys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{ "id": "t1", "name": "Minimal" }"#;

    #[test]
    fn minimal_template_gets_defaults() {
        let profile = TemplateProfile::from_json_str(MINIMAL).unwrap();
        assert_eq!(profile.id(), "t1");
        assert_eq!(profile.limits(), Limits::default());
        assert!(profile.modules().crawler);
        assert!(profile.discovery().is_not_found(404));
        assert!(profile.applications().is_empty());
    }

    #[test]
    fn full_template_compiles_catalogs() {
        let json = r#"{
            "id": "cms",
            "name": "CMS audit",
            "modules": { "journeys": false },
            "limits": { "max_depth": 3, "workers": 2 },
            "discovery": { "wordlist": ["admin", "wp"], "not_found_statuses": [404, 410] },
            "fingerprint": {
                "applications": [{
                    "name": "WordPress",
                    "trigger": { "kind": "hidden_directory", "name": "wp" },
                    "probes": [{ "path": "/version.txt", "pattern": "WordPress ([0-9.]+)" }],
                    "plugins": [{ "name": "akismet", "probes": [{ "path": "plugins/akismet/readme.txt", "pattern": "Stable tag: ([0-9.]+)" }] }]
                }],
                "server": [{ "name": "nginx", "category": "server", "source": { "kind": "header", "name": "server" }, "pattern": "nginx/([0-9.]+)" }]
            },
            "vulnerabilities": {
                "content_rules": [{ "code": "DIRECTORY_LISTING", "name": "Directory listing", "severity": "Warning", "pattern": "Index of /" }],
                "mutations": [{ "name": "admin", "action": "append", "segment": "admin" }]
            }
        }"#;

        let profile = TemplateProfile::from_json_str(json).unwrap();
        assert!(!profile.modules().journeys);
        assert_eq!(profile.limits().workers, 2);
        assert!(profile.discovery().is_not_found(410));
        assert_eq!(profile.applications()[0].probes[0].path, "version.txt");
        assert_eq!(profile.applications()[0].plugins[0].name, "akismet");
        assert_eq!(profile.server_rules()[0].category, SignalCategory::Server);
        assert!(profile.content_rules()[0].pattern.is_match("<h1>Index of /files</h1>"));
        assert_eq!(profile.mutations()[0].action, MutationAction::Append);
    }

    #[test]
    fn malformed_json_fails_fast() {
        let err = TemplateProfile::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));
    }

    #[test]
    fn missing_identity_is_rejected() {
        let err = TemplateProfile::from_json_str(r#"{ "name": "x" }"#).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));

        let err = TemplateProfile::from_json_str(r#"{ "id": " ", "name": "x" }"#).unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
    }

    #[test]
    fn bad_regex_is_rejected_with_field() {
        let json = r#"{ "id": "t", "name": "t",
            "vulnerabilities": { "content_rules": [{ "code": "X", "name": "x", "severity": "Info", "pattern": "([unclosed" }] } }"#;
        match TemplateProfile::from_json_str(json).unwrap_err() {
            TemplateError::InvalidPattern { field, .. } => {
                assert_eq!(field, "vulnerabilities.content_rules[0].pattern")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let json = r#"{ "id": "t", "name": "t", "limits": { "workers": 0 } }"#;
        assert!(matches!(TemplateProfile::from_json_str(json).unwrap_err(), TemplateError::Invalid { .. }));
    }

    #[test]
    fn wordlist_entries_must_be_segments() {
        let json = r#"{ "id": "t", "name": "t", "discovery": { "wordlist": ["ok", "has space"] } }"#;
        assert!(matches!(TemplateProfile::from_json_str(json).unwrap_err(), TemplateError::Invalid { .. }));
    }

    #[test]
    fn application_without_probes_is_rejected() {
        let json = r#"{ "id": "t", "name": "t", "fingerprint": { "applications": [
            { "name": "Empty", "trigger": { "kind": "root" }, "probes": [] } ] } }"#;
        assert!(matches!(TemplateProfile::from_json_str(json).unwrap_err(), TemplateError::Invalid { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TemplateProfile::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }

    #[test]
    fn builtin_profile_compiles() {
        let profile = TemplateProfile::builtin().unwrap();
        assert!(!profile.server_rules().is_empty());
        assert!(!profile.content_rules().is_empty());
        assert!(!profile.discovery().wordlist.is_empty());
    }
}
