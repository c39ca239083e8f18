// src/core/scanner/discovery.rs

use tracing::debug;
use url::Url;

use crate::core::http::FetchedResource;
use crate::core::models::{DiscoveryMethod, FindingSource, HiddenResource};
use crate::core::template::TemplateProfile;

/// A URI is directory-like when its path ends in `/` or its last segment has no extension.
pub fn is_directory_like(url: &Url) -> bool {
    let path = url.path();
    path.ends_with('/') || path.rsplit('/').next().is_some_and(|last| !last.contains('.'))
}

/// The same URI with a trailing slash and no query, so relative joins land inside it.
pub fn as_directory(url: &Url) -> Url {
    let mut dir = url.clone();
    dir.set_query(None);
    dir.set_fragment(None);
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    dir
}

/// The last non-empty path segment, if any.
pub fn last_segment(url: &Url) -> Option<&str> {
    url.path_segments()?.filter(|segment| !segment.is_empty()).next_back()
}

/// Wordlist candidates directly under `dir`.
pub fn candidates(dir: &Url, wordlist: &[String]) -> Vec<Url> {
    let base = as_directory(dir);
    wordlist
        .iter()
        .filter_map(|word| base.join(word.trim_start_matches('/')).ok())
        .collect()
}

/// The discovery stage: probes to enqueue below a directory-like resource.
pub fn discover(resource: &FetchedResource, depth: usize, profile: &TemplateProfile) -> Vec<Url> {
    if depth + 1 > profile.limits().max_depth || !is_directory_like(&resource.url) {
        return Vec::new();
    }
    let probes = candidates(&resource.url, &profile.discovery().wordlist);
    debug!(dir = %resource.url, probes = probes.len(), "Queueing wordlist probes.");
    probes
}

/// Directories above `url` that lie strictly inside the target's directory, nearest first.
/// A link to `/vault/notes.html` reveals `/vault/` even when nothing links to it.
pub fn ancestors(url: &Url, target: &Url) -> Vec<Url> {
    let scope = if is_directory_like(target) { as_directory(target) } else { target.join(".").unwrap_or_else(|_| target.clone()) };
    let step = if url.path().ends_with('/') { ".." } else { "." };
    let mut dirs = Vec::new();
    let mut current = url.join(step).ok();
    while let Some(dir) = current {
        if dir.path().len() <= scope.path().len() || !dir.path().starts_with(scope.path()) {
            break;
        }
        current = dir.join("..").ok();
        dirs.push(dir);
    }
    dirs
}

pub fn hidden_resource(resource: &FetchedResource) -> HiddenResource {
    let evidence = format!("HTTP {} ({} bytes)", resource.status, resource.body.len());
    HiddenResource {
        source: FindingSource::new(resource.url.as_str(), evidence, DiscoveryMethod::WordlistProbed),
        status: resource.status,
    }
}
