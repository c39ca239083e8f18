// src/core/http.rs

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::core::error::{FetchError, ScanError};
use crate::core::template::Limits;

/// Header carrying the scan id on every request, so targets can tell concurrent scans apart.
pub const SCAN_ID_HEADER: &str = "x-vanguard-scan";

const USER_AGENT: &str = "VanguardRS/0.1";

/// A response as the pipeline sees it: status, headers and a (possibly truncated) body.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl FetchedResource {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a repeated header, joined the way a browser would send cookies back.
    pub fn joined_header(&self, name: &str) -> String {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is worth parsing for links. A missing content type counts as text.
    pub fn is_textual(&self) -> bool {
        match self.header(CONTENT_TYPE.as_str()) {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") || ct.contains("json")
            }
        }
    }
}

/// The scan's only way to talk to the target.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpClient {
    /// Builds a client for one scan: no redirects are followed, so a directory redirect is
    /// observed as such, and cookies persist across the scan's requests.
    pub fn new(scan_id: &str, limits: &Limits) -> Result<Self, ScanError> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(scan_id) {
            headers.insert(HeaderName::from_static(SCAN_ID_HEADER), value);
        } else {
            warn!(scan_id, "Scan id is not a valid header value, requests will not carry it.");
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(Policy::none())
            .cookie_store(true)
            .timeout(Duration::from_secs(limits.request_timeout_secs))
            .build()
            .map_err(ScanError::Client)?;

        Ok(Self { client, max_body_bytes: limits.max_body_bytes })
    }

    pub async fn get(&self, url: &Url) -> Result<FetchedResource, FetchError> {
        self.execute(url, self.client.get(url.clone())).await
    }

    pub async fn get_with_query(&self, url: &Url, params: &[(String, String)]) -> Result<FetchedResource, FetchError> {
        self.execute(url, self.client.get(url.clone()).query(params)).await
    }

    pub async fn post_form(&self, url: &Url, form: &[(String, String)]) -> Result<FetchedResource, FetchError> {
        self.execute(url, self.client.post(url.clone()).form(form)).await
    }

    async fn execute(&self, url: &Url, request: reqwest::RequestBuilder) -> Result<FetchedResource, FetchError> {
        let mut response = request
            .send()
            .await
            .map_err(|source| FetchError::Request { url: url.to_string(), source })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        // The rest of an oversized body is never read; dropping the response closes it.
        let mut bytes = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| FetchError::Body { url: url.to_string(), source })?
        {
            let room = self.max_body_bytes - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = chunk.len() > room;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        debug!(url = %final_url, status, bytes = bytes.len(), truncated, "Fetched resource.");

        Ok(FetchedResource { url: final_url, status, headers, body })
    }
}
