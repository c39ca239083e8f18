//! This module acts as the central "brain" of the scanner.
//! It holds the read-only database of security issue codes, with human-readable
//! explanations and remediation steps, and the built-in signature catalog that backs
//! the default template.

use crate::core::models::Severity;
use crate::core::template::{
    ApplicationSignatureSpec, ContentRuleSpec, DiscoveryConfig, FingerprintCatalog, Limits,
    ModuleToggles, MutationAction, MutationRule, PluginSignatureSpec, ProbeSpec, ServerRuleSpec,
    SignalCategory, SignalSource, TemplateDocument, Trigger, VulnerabilityCatalog,
};
use std::fmt;

/// Issue code raised when a body exposes an auto-generated directory index.
pub const DIRECTORY_LISTING: &str = "DIRECTORY_LISTING";
/// Issue code raised when a journey's protected resource is served after a wrong credential.
pub const JOURNEY_GATE_BYPASS: &str = "JOURNEY_GATE_BYPASS";
/// Issue code raised when a journey's protected resource is served twice for one authorization.
pub const JOURNEY_REPLAY_ACCEPTED: &str = "JOURNEY_REPLAY_ACCEPTED";

/// Defines the high-level categories for security findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingCategory {
    /// Content the server should never hand out (listings, debug pages, metadata).
    Exposure,
    /// Weaknesses in multi-step, session-gated flows.
    Session,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::Exposure => write!(f, "Information Exposure"),
            FindingCategory::Session => write!(f, "Session Gating"),
        }
    }
}

/// A struct that holds all the detailed, human-readable information about a specific issue code.
pub struct FindingDetail {
    /// A unique, machine-readable identifier for the finding (e.g., "DIRECTORY_LISTING").
    pub code: &'static str,
    /// A short, human-readable title for the finding.
    pub title: &'static str,
    /// The category this finding belongs to.
    pub category: FindingCategory,
    /// The severity level of the finding (e.g., Critical, Warning, Info).
    pub severity: Severity,
    /// What the finding means and why it's a problem.
    pub description: &'static str,
    /// Clear, actionable steps the user can take to fix the issue.
    pub remediation: &'static str,
}

static FINDINGS: &[FindingDetail] = &[
    // --- Exposure ---
    FindingDetail {
        code: DIRECTORY_LISTING,
        title: "Directory Listing Enabled",
        category: FindingCategory::Exposure,
        severity: Severity::Warning,
        description: "The server generates an index page for a directory without a default document. Anyone can enumerate every file in it, including backups, configuration and uploads that were never meant to be linked.",
        remediation: "Disable automatic indexes ('Options -Indexes' on Apache, 'autoindex off' on nginx) or place an empty index document in the directory."
    },
    FindingDetail {
        code: "PHPINFO_EXPOSED",
        title: "phpinfo() Page Exposed",
        category: FindingCategory::Exposure,
        severity: Severity::Warning,
        description: "A phpinfo() page reveals the exact PHP version, loaded modules, filesystem paths and environment variables, which shortens an attacker's reconnaissance considerably.",
        remediation: "Remove diagnostic scripts from production deployments or restrict them to trusted addresses."
    },
    FindingDetail {
        code: "GIT_METADATA_EXPOSED",
        title: "Git Metadata Exposed",
        category: FindingCategory::Exposure,
        severity: Severity::Critical,
        description: "The .git directory is reachable over HTTP. Its objects can be downloaded to rebuild the full source tree, history and any secrets ever committed.",
        remediation: "Deny access to '/.git' in the web server configuration and deploy build artifacts instead of working copies."
    },
    FindingDetail {
        code: "STACK_TRACE_LEAK",
        title: "Stack Trace Disclosed",
        category: FindingCategory::Exposure,
        severity: Severity::Info,
        description: "An error page includes a stack trace, exposing framework internals, file paths and sometimes query fragments.",
        remediation: "Turn off debug mode in production and serve generic error pages."
    },
    // --- Session ---
    FindingDetail {
        code: JOURNEY_GATE_BYPASS,
        title: "Journey Gate Bypassed",
        category: FindingCategory::Session,
        severity: Severity::Critical,
        description: "The protected step of a multi-step flow was served even though the preceding step was completed with a wrong value.",
        remediation: "Check server-side that the gating step succeeded for this session before serving the protected resource."
    },
    FindingDetail {
        code: JOURNEY_REPLAY_ACCEPTED,
        title: "Journey Authorization Replayable",
        category: FindingCategory::Session,
        severity: Severity::Warning,
        description: "The protected step of a multi-step flow could be read again without repeating the gating step, so one successful interaction grants unlimited access.",
        remediation: "Make the authorization single-use: revoke it as soon as the protected resource has been served."
    },
];

/// Retrieves the full detail for a given issue code from the static knowledge base.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|f| f.code == code)
}

// --- Built-in catalog ---

fn header(tech: &str, category: SignalCategory, name: &str, pattern: &str) -> ServerRuleSpec {
    ServerRuleSpec {
        name: tech.to_string(),
        category,
        source: SignalSource::Header { name: name.to_string() },
        pattern: pattern.to_string(),
    }
}

fn rule(tech: &str, category: SignalCategory, source: SignalSource, pattern: &str) -> ServerRuleSpec {
    ServerRuleSpec { name: tech.to_string(), category, source, pattern: pattern.to_string() }
}

fn probe(path: &str, pattern: &str) -> ProbeSpec {
    ProbeSpec { path: path.to_string(), pattern: pattern.to_string() }
}

fn content(code: &str, name: &str, severity: Severity, pattern: &str) -> ContentRuleSpec {
    ContentRuleSpec { code: code.to_string(), name: name.to_string(), severity, pattern: pattern.to_string(), parameter: None }
}

fn server_rules() -> Vec<ServerRuleSpec> {
    use SignalCategory::{Framework, Language, Server};
    vec![
        header("nginx", Server, "server", r"nginx/([\d\.]+)"),
        rule("nginx", Server, SignalSource::Body, r"<hr><center>nginx</center>"),
        header("Apache", Server, "server", r"Apache/([\d\.]+)"),
        rule("Apache", Server, SignalSource::Body, r"Apache Server at"),
        header("Microsoft-IIS", Server, "server", r"Microsoft-IIS/([\d\.]+)"),
        header("LiteSpeed", Server, "server", r"LiteSpeed"),
        header("Cloudflare", Server, "server", r"cloudflare"),
        header("PHP", Language, "x-powered-by", r"PHP/([\d\.]+)"),
        rule("PHP", Language, SignalSource::Cookie, r"PHPSESSID"),
        rule("Java", Language, SignalSource::Cookie, r"JSESSIONID"),
        header("ASP.NET", Framework, "x-aspnet-version", r"([\d\.]+)"),
        header("ASP.NET", Framework, "x-powered-by", r"ASP\.NET"),
        header("Express", Framework, "x-powered-by", r"Express"),
        rule("Django", Framework, SignalSource::Cookie, r"csrftoken"),
        rule("Ruby on Rails", Framework, SignalSource::Cookie, r"_rails_session"),
        header("Next.js", Framework, "x-powered-by", r"Next\.js ?([\d\.]+)?"),
        rule("Next.js", Framework, SignalSource::ScriptSrc, r"/_next/static/"),
        rule("Nuxt.js", Framework, SignalSource::Body, r"__NUXT__"),
        rule("Angular", Framework, SignalSource::Body, r#"ng-version="([\d\.]+)""#),
        rule("Astro", Framework, SignalSource::MetaTag { name: "generator".into() }, r"Astro v([\d\.]+)"),
        rule("Bootstrap", Framework, SignalSource::LinkHref, r"bootstrap(\.min)?\.css"),
    ]
}

fn applications() -> Vec<ApplicationSignatureSpec> {
    vec![
        ApplicationSignatureSpec {
            name: "WordPress".to_string(),
            trigger: Trigger::Directory { name: None },
            probes: vec![
                probe("wp-includes/version.php", r"\$wp_version = '([\d\.]+)'"),
                probe("readme.html", r"(?s)WordPress.*?Version ([\d\.]+)"),
            ],
            plugins: vec![
                PluginSignatureSpec {
                    name: "akismet".to_string(),
                    probes: vec![probe("wp-content/plugins/akismet/readme.txt", r"Stable tag: ([\d\.]+)")],
                },
                PluginSignatureSpec {
                    name: "contact-form-7".to_string(),
                    probes: vec![probe("wp-content/plugins/contact-form-7/readme.txt", r"Stable tag: ([\d\.]+)")],
                },
            ],
        },
        ApplicationSignatureSpec {
            name: "Joomla".to_string(),
            trigger: Trigger::HiddenDirectory { name: None },
            probes: vec![probe("administrator/manifests/files/joomla.xml", r"<version>([\d\.]+)</version>")],
            plugins: Vec::new(),
        },
        ApplicationSignatureSpec {
            name: "Drupal".to_string(),
            trigger: Trigger::Root,
            probes: vec![probe("CHANGELOG.txt", r"Drupal ([\d\.]+)")],
            plugins: Vec::new(),
        },
    ]
}

/// The default template used when no template file is given.
pub fn builtin_template() -> TemplateDocument {
    TemplateDocument {
        id: "default".to_string(),
        name: "Default web audit".to_string(),
        description: "Crawl, wordlist discovery, fingerprinting and exposure checks with the built-in catalog.".to_string(),
        modules: ModuleToggles::default(),
        limits: Limits::default(),
        discovery: DiscoveryConfig {
            wordlist: ["admin", "backup", "blog", "cms", "old", "test", "uploads", "wp", "wordpress"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            ..DiscoveryConfig::default()
        },
        fingerprint: FingerprintCatalog { applications: applications(), server: server_rules() },
        vulnerabilities: VulnerabilityCatalog {
            content_rules: vec![
                content(DIRECTORY_LISTING, "Directory listing", Severity::Warning, r"(?i)<title>\s*Index of /|Directory Listing For /|\[To Parent Directory\]"),
                content("PHPINFO_EXPOSED", "phpinfo() exposed", Severity::Warning, r"<title>phpinfo\(\)</title>"),
                content("GIT_METADATA_EXPOSED", "Git metadata exposed", Severity::Critical, r"^ref: refs/heads/"),
                content("STACK_TRACE_LEAK", "Stack trace disclosed", Severity::Info, r"Traceback \(most recent call last\)|at [\w\.$]+\([\w]+\.java:\d+\)"),
            ],
            mutations: vec![
                MutationRule { name: "admin".to_string(), action: MutationAction::Append, segment: "admin".to_string() },
                MutationRule { name: "git-head".to_string(), action: MutationAction::Append, segment: ".git/HEAD".to_string() },
                MutationRule { name: "backup".to_string(), action: MutationAction::ReplaceLast, segment: "backup".to_string() },
            ],
        },
        journeys: Vec::new(),
    }
}
