// tests/lifecycle.rs

mod common;

use common::{base_template, context, listing_rule, wait_for_requests, wait_for_state};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vanguard_webscan::{ScanError, ScanReport, ScanService, ScanState, TemplateError, TemplateProfile};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(body: &str, delay_ms: u64) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(body.to_string(), "text/html")
        .set_delay(Duration::from_millis(delay_ms))
}

/// A small site with links, a hidden directory and a listing, each response slightly delayed.
async fn small_site(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;
    let pages = [
        ("/", r#"<a href="/a">a</a><a href="/b">b</a><a href="/c/">c</a>"#),
        ("/a", r#"<a href="/a/1">1</a><a href="/a/2">2</a>"#),
        ("/b", r#"<a href="/b/1">1</a>"#),
        ("/c/", "<title>Index of /c</title>"),
        ("/a/1", "one"),
        ("/a/2", "two"),
        ("/b/1", "<title>Index of /b/1</title>"),
        ("/secret", "shh"),
    ];
    for (at, body) in pages {
        Mock::given(method("GET")).and(path(at)).respond_with(page(body, delay_ms)).mount(&server).await;
    }
    server
}

fn site_template() -> serde_json::Value {
    let mut template = base_template();
    template["limits"]["workers"] = json!(2);
    template["discovery"]["wordlist"] = json!(["secret", "nothing"]);
    template["vulnerabilities"]["content_rules"] = json!([listing_rule()]);
    template
}

/// A target whose only page is a slow directory listing.
async fn slow_listing(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page("<title>Index of /</title>", delay_ms))
        .mount(&server)
        .await;
    server
}

fn listing_template() -> serde_json::Value {
    let mut template = base_template();
    template["vulnerabilities"]["content_rules"] = json!([listing_rule()]);
    template
}

fn findings(report: &ScanReport) -> (Vec<String>, Vec<(String, String)>) {
    let mut hidden: Vec<String> = report.hidden_resources.iter().map(|h| h.source.uri.clone()).collect();
    let mut issues: Vec<(String, String)> =
        report.security_issues.iter().map(|i| (i.code.clone(), i.source.uri.clone())).collect();
    hidden.sort();
    issues.sort();
    (hidden, issues)
}

#[tokio::test]
async fn pause_and_resume_preserve_results() {
    let server = small_site(20).await;
    let service = Arc::new(ScanService::new());

    let baseline = service.start_scan(context(&server, site_template()), "baseline").await.unwrap();
    assert_eq!(baseline.state, ScanState::Completed);

    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, site_template());
        tokio::spawn(async move { service.start_scan(context, "paused").await })
    };
    wait_for_requests(&service, "paused", 1).await;
    assert_eq!(service.pause("paused").unwrap(), ScanState::Paused);

    // In-flight requests may still finish; after that nothing new is dispatched.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let issued = service.get_metrics("paused").unwrap().requests_issued;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(service.get_metrics("paused").unwrap().requests_issued, issued);
    assert_eq!(service.get_status("paused").unwrap().state, ScanState::Paused);

    assert_eq!(service.resume("paused").unwrap(), ScanState::Running);
    let resumed = handle.await.unwrap().unwrap();

    assert_eq!(resumed.state, ScanState::Completed);
    assert_eq!(findings(&resumed), findings(&baseline));
    assert_eq!(resumed.metrics.requests_issued, baseline.metrics.requests_issued);
    assert!(!findings(&baseline).1.is_empty());
}

#[tokio::test]
async fn abort_interrupts_requests_in_flight() {
    let server = slow_listing(10_000).await;

    let service = Arc::new(ScanService::new());
    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, listing_template());
        tokio::spawn(async move { service.start_scan(context, "q1").await })
    };
    wait_for_requests(&service, "q1", 1).await;
    assert_eq!(service.abort("q1").unwrap(), ScanState::Aborted);

    let report = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("abort should finish the scan promptly")
        .unwrap()
        .unwrap();
    assert_eq!(report.state, ScanState::Aborted);
    assert!(report.finished_at.is_some());
    assert!(report.security_issues.is_empty());
}

#[tokio::test]
async fn abort_from_paused() {
    let server = small_site(50).await;
    let service = Arc::new(ScanService::new());
    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, site_template());
        tokio::spawn(async move { service.start_scan(context, "q1").await })
    };
    wait_for_state(&service, "q1", ScanState::Running).await;
    service.pause("q1").unwrap();
    assert_eq!(service.abort("q1").unwrap(), ScanState::Aborted);

    let report = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.state, ScanState::Aborted);
    assert!(matches!(service.resume("q1"), Err(ScanError::Terminal { state: ScanState::Aborted, .. })));
}

#[tokio::test]
async fn stop_drains_and_finalizes() {
    let server = small_site(50).await;
    let service = Arc::new(ScanService::new());
    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, site_template());
        tokio::spawn(async move { service.start_scan(context, "q1").await })
    };
    wait_for_requests(&service, "q1", 1).await;
    assert_eq!(service.stop("q1").unwrap(), ScanState::Stopped);

    let report = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.state, ScanState::Stopped);
    assert_eq!(report.metrics.in_flight, 0);
    assert!(matches!(service.stop("q1"), Err(ScanError::Terminal { .. })));
}

#[tokio::test]
async fn stop_commits_work_in_flight_and_release_waits_for_it() {
    let server = slow_listing(500).await;
    let service = Arc::new(ScanService::new());
    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, listing_template());
        tokio::spawn(async move { service.start_scan(context, "q1").await })
    };
    wait_for_requests(&service, "q1", 1).await;
    assert_eq!(service.stop("q1").unwrap(), ScanState::Stopped);

    // Stopped, but the listing is still on its way.
    assert!(matches!(service.release("q1"), Err(ScanError::StillActive(_))));

    let report = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    assert_eq!(report.state, ScanState::Stopped);
    assert_eq!(report.issues_with_code("DIRECTORY_LISTING").count(), 1);

    let released = service.release("q1").unwrap();
    assert!(released.finished_at.is_some());
    assert_eq!(released.security_issues.len(), 1);
}

#[tokio::test]
async fn duplicate_start_leaves_running_scan_alone() {
    let server = small_site(50).await;
    let service = Arc::new(ScanService::new());
    let handle = {
        let service = Arc::clone(&service);
        let context = context(&server, site_template());
        tokio::spawn(async move { service.start_scan(context, "q1").await })
    };
    wait_for_state(&service, "q1", ScanState::Running).await;

    let second = service.start_scan(context(&server, site_template()), "q1").await;
    assert!(matches!(second, Err(ScanError::DuplicateScan(id)) if id == "q1"));

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.state, ScanState::Completed);
}

#[tokio::test]
async fn completed_scan_can_be_released_once() {
    let server = small_site(0).await;
    let service = ScanService::new();
    let report = service.start_scan(context(&server, site_template()), "q1").await.unwrap();

    let status = service.get_status("q1").unwrap();
    assert_eq!(status.state, ScanState::Completed);
    assert_eq!(status.metrics, report.metrics);

    let released = service.release("q1").unwrap();
    assert_eq!(findings(&released), findings(&report));
    assert!(service.get_status("q1").is_none());
    assert!(matches!(service.release("q1"), Err(ScanError::NotFound(_))));

    // The id is free again.
    let again = service.start_scan(context(&server, site_template()), "q1").await.unwrap();
    assert_eq!(findings(&again), findings(&report));
}

#[test]
fn invalid_targets_are_rejected_before_registration() {
    let profile = Arc::new(TemplateProfile::builtin().unwrap());
    for target in ["not a uri", "/relative/path", "ftp://example.com/", "http://"] {
        let result = vanguard_webscan::ScanContext::new(target, profile.clone());
        assert!(matches!(result, Err(ScanError::InvalidTarget { .. })), "{target}");
    }
}

#[test]
fn broken_templates_fail_fast() {
    let mut template = base_template();
    template["vulnerabilities"]["content_rules"] = json!([{
        "code": "BROKEN", "name": "broken", "severity": "Warning", "pattern": "(unclosed"
    }]);
    assert!(matches!(
        TemplateProfile::from_json_str(&template.to_string()),
        Err(TemplateError::InvalidPattern { .. })
    ));
    assert!(matches!(TemplateProfile::from_json_str("{"), Err(TemplateError::Parse(_))));
    assert!(matches!(
        TemplateProfile::from_path("/definitely/not/here.json"),
        Err(TemplateError::Read { .. })
    ));
}
