// src/core/mod.rs

/// Data structures shared across the engine: findings, journey outcomes and the
/// `ScanReport` a scan fills in.
pub mod models;

/// The scan engine: lifecycle state, the worker pool and the pipeline stages
/// (crawler, discovery, fingerprinting, vulnerability detection, journeys).
pub mod scanner;

/// Issue codes with their descriptions, plus the built-in template catalog.
pub mod knowledge_base;

pub mod control;
pub mod error;
pub mod frontier;
pub mod http;
pub mod metrics;
pub mod service;
pub mod session;
pub mod template;
