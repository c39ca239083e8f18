// tests/common/mod.rs

#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use vanguard_webscan::{ScanContext, ScanService, ScanState, TemplateProfile};
use wiremock::MockServer;

/// A template with every catalog empty; tests fill in what they exercise.
pub fn base_template() -> Value {
    json!({
        "id": "test",
        "name": "Integration test template",
        "limits": { "max_depth": 4, "workers": 4, "request_timeout_secs": 10 },
        "discovery": { "wordlist": [] },
        "fingerprint": { "applications": [], "server": [] },
        "vulnerabilities": { "content_rules": [], "mutations": [] },
        "journeys": []
    })
}

pub fn listing_rule() -> Value {
    json!({
        "code": "DIRECTORY_LISTING",
        "name": "Directory listing enabled",
        "severity": "Warning",
        "pattern": "<title>Index of /"
    })
}

pub fn profile(template: Value) -> Arc<TemplateProfile> {
    Arc::new(TemplateProfile::from_json_str(&template.to_string()).expect("template should load"))
}

pub fn context(server: &MockServer, template: Value) -> ScanContext {
    ScanContext::new(&format!("{}/", server.uri()), profile(template)).expect("mock server URI is a valid target")
}

pub fn url_of(server: &MockServer, path: &str) -> String {
    format!("{}{}", server.uri(), path)
}

/// Polls until the scan reaches `state`, failing the test after five seconds.
pub async fn wait_for_state(service: &ScanService, id: &str, state: ScanState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if service.get_status(id).is_some_and(|status| status.state == state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("scan {id} never reached {state}"));
}

/// Polls until the scan has issued at least `count` requests.
pub async fn wait_for_requests(service: &ScanService, id: &str, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if service.get_metrics(id).is_some_and(|metrics| metrics.requests_issued >= count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("scan {id} never issued {count} requests"));
}
