// src/core/scanner/vuln_scanner.rs

use tracing::debug;
use url::Url;

use crate::core::frontier::normalize_key;
use crate::core::http::FetchedResource;
use crate::core::models::{DiscoveryMethod, FindingSource, SecurityIssue};
use crate::core::scanner::discovery;
use crate::core::template::{ContentRule, MutationAction, MutationRule};

const EVIDENCE_CHARS: usize = 160;

/// Runs every content rule against a response body.
///
/// # Arguments
/// * `resource` - The response to inspect.
/// * `rules` - The template's content rules.
/// * `method` - How the response's URI was reached.
/// * `origin` - The URI a mutated probe was derived from, if the response came from one.
///
/// # Returns
/// One `SecurityIssue` per matching rule, located at the response's own URI.
pub fn apply_content_rules(
    resource: &FetchedResource,
    rules: &[ContentRule],
    method: DiscoveryMethod,
    origin: Option<&Url>,
) -> Vec<SecurityIssue> {
    rules
        .iter()
        .filter_map(|rule| {
            let matched = rule.pattern.find(&resource.body)?;
            debug!(code = %rule.code, url = %resource.url, "Content rule matched.");
            Some(SecurityIssue {
                code: rule.code.clone(),
                name: rule.name.clone(),
                severity: rule.severity,
                parameter: rule.parameter.clone(),
                origin: origin.map(Url::to_string),
                source: FindingSource::new(resource.url.as_str(), snippet(matched.as_str()), method),
            })
        })
        .collect()
}

/// Derives probe URIs from a discovered resource. Returns each URI with the rule that made it;
/// rules that would reproduce the resource itself are skipped.
pub fn mutate(url: &Url, rules: &[MutationRule]) -> Vec<(Url, String)> {
    let own_key = normalize_key(url);
    rules
        .iter()
        .filter_map(|rule| {
            let segment = rule.segment.trim_start_matches('/');
            let mutated = match rule.action {
                MutationAction::Append => discovery::as_directory(url).join(segment).ok()?,
                MutationAction::ReplaceLast => parent_of(url).join(segment).ok()?,
            };
            (normalize_key(&mutated) != own_key).then(|| (mutated, rule.name.clone()))
        })
        .collect()
}

// The URI with its last path segment left open for replacement.
fn parent_of(url: &Url) -> Url {
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let trimmed = base.path().trim_end_matches('/').to_string();
    base.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    base
}

/// A bounded excerpt of matched text, cut on a char boundary.
pub(crate) fn snippet(text: &str) -> String {
    match text.char_indices().nth(EVIDENCE_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
