// src/core/control.rs

//! Asynchronous control channel for running scans.
//!
//! Front ends send kebab-case command words (`pause`, `resume`, `stop`, `abort`,
//! `dump-metrics`, `status`) which map one to one onto [`ScanService`] operations.

use serde::Serialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::core::error::ScanError;
use crate::core::metrics::MetricsSnapshot;
use crate::core::scanner::state::ScanState;
use crate::core::service::{ScanService, ScanStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
    Abort,
    DumpMetrics,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    State { state: ScanState },
    Metrics { metrics: MetricsSnapshot },
    Status { status: ScanStatus },
}

impl ScanService {
    /// Applies a control command to the scan registered under `id`.
    pub fn dispatch(&self, id: &str, command: ControlCommand) -> Result<ControlReply, ScanError> {
        debug!(scan_id = id, %command, "Dispatching control command.");
        let not_found = || ScanError::NotFound(id.to_string());
        let state = match command {
            ControlCommand::Pause => self.pause(id)?,
            ControlCommand::Resume => self.resume(id)?,
            ControlCommand::Stop => self.stop(id)?,
            ControlCommand::Abort => self.abort(id)?,
            ControlCommand::DumpMetrics => {
                let metrics = self.get_metrics(id).ok_or_else(not_found)?;
                return Ok(ControlReply::Metrics { metrics });
            }
            ControlCommand::Status => {
                let status = self.get_status(id).ok_or_else(not_found)?;
                return Ok(ControlReply::Status { status });
            }
        };
        Ok(ControlReply::State { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::ScanContext;
    use crate::core::template::TemplateProfile;
    use std::str::FromStr;
    use std::sync::Arc;

    #[test]
    fn commands_parse_from_kebab_case() {
        assert_eq!(ControlCommand::from_str("dump-metrics").unwrap(), ControlCommand::DumpMetrics);
        assert_eq!(ControlCommand::from_str("Pause").unwrap(), ControlCommand::Pause);
        assert!(ControlCommand::from_str("explode").is_err());
        assert_eq!(ControlCommand::DumpMetrics.to_string(), "dump-metrics");
    }

    #[test]
    fn dispatch_maps_onto_the_registry() {
        let service = ScanService::new();
        let profile = Arc::new(TemplateProfile::builtin().unwrap());
        service.register(ScanContext::new("http://127.0.0.1:9/", profile).unwrap(), "q1").unwrap();

        assert!(matches!(
            service.dispatch("q1", ControlCommand::Pause),
            Err(ScanError::InvalidTransition { from: ScanState::Created, .. })
        ));
        assert!(matches!(service.dispatch("q1", ControlCommand::DumpMetrics), Ok(ControlReply::Metrics { .. })));
        assert_eq!(
            service.dispatch("q1", ControlCommand::Abort).unwrap(),
            ControlReply::State { state: ScanState::Aborted }
        );
        assert!(matches!(service.dispatch("q1", ControlCommand::Resume), Err(ScanError::Terminal { .. })));
        assert!(matches!(service.dispatch("q2", ControlCommand::Status), Err(ScanError::NotFound(_))));
    }
}
