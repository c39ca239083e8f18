// src/core/scanner/crawler.rs

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

use crate::core::frontier::normalize_key;
use crate::core::http::FetchedResource;

// Every element that carries a navigable reference, and the attribute holding it.
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[href], area[href], link[href], form[action], iframe[src], frame[src], script[src]").unwrap()
});

const IGNORED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Extracts every hyperlink reference from an HTML body, resolved against `base`.
/// Fragments are dropped and duplicates removed, preserving document order.
pub fn extract_links(body: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&LINK_SELECTOR) {
        let attrs = element.value();
        let Some(raw) = attrs.attr("href").or_else(|| attrs.attr("action")).or_else(|| attrs.attr("src")) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let lowered = raw.to_ascii_lowercase();
        if IGNORED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
            continue;
        }
        if let Ok(mut resolved) = base.join(raw) {
            resolved.set_fragment(None);
            if seen.insert(resolved.to_string()) {
                links.push(resolved);
            }
        }
    }
    links
}

/// Where a 3xx response points, resolved against the response URI. A redirect that only
/// adds or drops a trailing slash lands on the same frontier key and is ignored.
pub fn redirect_target(resource: &FetchedResource) -> Option<Url> {
    if !(300..400).contains(&resource.status) {
        return None;
    }
    let location = resource.header("location")?.trim();
    let mut target = resource.url.join(location).ok()?;
    target.set_fragment(None);
    (normalize_key(&target) != normalize_key(&resource.url)).then_some(target)
}

/// The crawl stage: the redirect target and the links of a textual resource that stay on
/// the target's origin and within `max_depth` of the start URI.
pub fn crawl(resource: &FetchedResource, depth: usize, max_depth: usize, target: &Url) -> Vec<Url> {
    if depth + 1 > max_depth {
        return Vec::new();
    }
    let mut links: Vec<Url> = redirect_target(resource).into_iter().collect();
    if resource.is_textual() {
        for link in extract_links(&resource.body, &resource.url) {
            if !links.contains(&link) {
                links.push(link);
            }
        }
    }
    let origin = target.origin();
    links.retain(|link| link.origin() == origin);
    debug!(url = %resource.url, links = links.len(), "Crawled resource.");
    links
}
