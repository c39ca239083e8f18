// src/core/scanner/fingerprint_scanner.rs

use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::core::http::FetchedResource;
use crate::core::scanner::discovery;
use crate::core::template::{Probe, ServerRule, SignalCategory, SignalSource, Trigger};

/// A server, framework or language detected on one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSignal {
    pub category: SignalCategory,
    pub name: String,
    pub version: Option<String>,
}

impl ServerSignal {
    /// `Name/version`, or just the name when no version was captured.
    pub fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{}/{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

/// Applies the template's server rules to one response.
///
/// Rules naming the same technology are merged; a versioned match wins over a bare one.
pub fn match_server_rules(resource: &FetchedResource, rules: &[ServerRule]) -> Vec<ServerSignal> {
    if rules.is_empty() {
        return Vec::new();
    }
    let cookies = resource.joined_header("set-cookie");
    let needs_document = rules
        .iter()
        .any(|rule| matches!(rule.source, SignalSource::MetaTag { .. } | SignalSource::ScriptSrc | SignalSource::LinkHref));
    let document = (needs_document && resource.is_textual()).then(|| Html::parse_document(&resource.body));

    let mut found: HashMap<String, ServerSignal> = HashMap::new();
    let mut order = Vec::new();
    for rule in rules {
        let version = match (&rule.source, &document) {
            (SignalSource::Header { name }, _) => check_with_regex(resource.header(name), &rule.pattern),
            (SignalSource::Cookie, _) => check_with_regex(Some(&cookies), &rule.pattern),
            (SignalSource::Body, _) => check_with_regex(Some(&resource.body), &rule.pattern),
            (SignalSource::MetaTag { name }, Some(doc)) => check_meta_tag(doc, name, &rule.pattern),
            (SignalSource::ScriptSrc, Some(doc)) => check_script_src(doc, &rule.pattern),
            (SignalSource::LinkHref, Some(doc)) => check_link_href(doc, &rule.pattern),
            (_, None) => None,
        };

        let Some(version) = version else { continue };
        debug!(tech = %rule.name, version = ?version, url = %resource.url, "Rule matched.");
        match found.get_mut(&rule.name) {
            Some(existing) => {
                if existing.version.is_none() && version.is_some() {
                    existing.version = version;
                }
            }
            None => {
                order.push(rule.name.clone());
                found.insert(
                    rule.name.clone(),
                    ServerSignal { category: rule.category, name: rule.name.clone(), version },
                );
            }
        }
    }
    order.into_iter().filter_map(|name| found.remove(&name)).collect()
}

/// Whether an application signature applies to the confirmed directory `root`.
pub fn is_triggered(trigger: &Trigger, root: &Url, is_seed: bool, is_hidden: bool) -> bool {
    let named = |name: &Option<String>| match name {
        None => true,
        Some(name) => discovery::last_segment(root).is_some_and(|segment| segment.eq_ignore_ascii_case(name)),
    };
    match trigger {
        Trigger::Root => is_seed,
        Trigger::Directory { name } => named(name),
        Trigger::HiddenDirectory { name } => is_hidden && named(name),
    }
}

/// Checks a probe response. `Some(version)` when the probe's pattern matched.
pub fn match_probe(resource: &FetchedResource, probe: &Probe) -> Option<Option<String>> {
    check_with_regex(Some(&resource.body), &probe.pattern)
}

/// A helper function that applies a regex to an optional string slice.
///
/// Returns `Some(version)` if the regex matches. The `version` itself is an `Option<String>`:
/// `Some(Some(String))` if a version was captured, `Some(None)` if the pattern matched
/// but no version was captured, and `None` if the pattern did not match at all.
fn check_with_regex(text_option: Option<&str>, re: &Regex) -> Option<Option<String>> {
    text_option.and_then(|text| {
        re.captures(text).map(|caps| {
            caps.get(1)
                .map(|m| m.as_str().to_string())
                .filter(|s| !s.is_empty())
        })
    })
}

/// Searches the parsed HTML for a specific meta tag and checks its content with a regex.
fn check_meta_tag(doc: &Html, name: &str, re: &Regex) -> Option<Option<String>> {
    let selector_str = format!("meta[name='{}']", name);
    if let Ok(selector) = Selector::parse(&selector_str) {
        let content = doc.select(&selector).next().and_then(|el| el.value().attr("content"));
        return check_with_regex(content, re);
    }
    None
}

/// Checks the `src` of every script tag; first match wins.
fn check_script_src(doc: &Html, re: &Regex) -> Option<Option<String>> {
    check_attribute(doc, "script[src]", "src", re)
}

/// Checks the `href` of every link tag; first match wins.
fn check_link_href(doc: &Html, re: &Regex) -> Option<Option<String>> {
    check_attribute(doc, "link[href]", "href", re)
}

fn check_attribute(doc: &Html, selector: &str, attribute: &str, re: &Regex) -> Option<Option<String>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .filter_map(|el| el.value().attr(attribute))
        .find_map(|value| check_with_regex(Some(value), re))
}
