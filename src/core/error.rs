// src/core/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::core::scanner::state::{ScanOperation, ScanState};

/// Errors surfaced by the scan registry and the scan lifecycle.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target URI '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("a scan with id '{0}' is already registered")]
    DuplicateScan(String),

    #[error("no scan registered with id '{0}'")]
    NotFound(String),

    #[error("cannot {operation} a scan that is {from}")]
    InvalidTransition { operation: ScanOperation, from: ScanState },

    #[error("scan already reached {state}, {operation} ignored")]
    Terminal { operation: ScanOperation, state: ScanState },

    #[error("scan '{0}' is still active and cannot be released")]
    StillActive(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors raised while loading a template. All of them happen before any scan exists.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse template: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid pattern in {field}: {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid template value: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl TemplateError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid { field: field.into(), reason: reason.into() }
    }
}

/// A single probe that could not be completed. Never fatal to a scan.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
