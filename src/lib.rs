// src/lib.rs

pub mod core;
pub mod logging;

pub use crate::core::control::{ControlCommand, ControlReply};
pub use crate::core::error::{FetchError, ScanError, TemplateError};
pub use crate::core::models::ScanReport;
pub use crate::core::scanner::state::ScanState;
pub use crate::core::scanner::{Scan, ScanContext};
pub use crate::core::service::{ScanService, ScanStatus};
pub use crate::core::template::TemplateProfile;
