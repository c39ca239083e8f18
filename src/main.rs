// src/main.rs

use clap::Parser;
use color_eyre::eyre::Result;
use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use vanguard_webscan::core::knowledge_base;
use vanguard_webscan::{ControlCommand, ScanContext, ScanService, TemplateProfile, logging};

#[derive(Parser)]
#[command(name = "vanguard-webscan")]
#[command(about = "Template-driven web application scanner")]
#[command(version)]
struct Cli {
    /// Absolute http(s) URI to start from
    target: String,

    /// JSON template to scan with (built-in profile when omitted)
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Scan id used for control commands and request correlation
    #[arg(short, long, default_value = "scan-1")]
    id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let log_path = logging::initialize_logging()?;

    let profile = match &cli.template {
        Some(path) => TemplateProfile::from_path(path)?,
        None => TemplateProfile::builtin()?,
    };
    let context = ScanContext::new(&cli.target, Arc::new(profile))?;
    let service = Arc::new(ScanService::new());

    eprintln!("Scanning {} as '{}' (log: {})", context.target(), cli.id, log_path.display());
    eprintln!("Commands: pause, resume, stop, abort, dump-metrics, status");
    info!(target = %context.target(), scan_id = %cli.id, "Scan requested from command line.");

    let mut commands = spawn_stdin_reader();
    let scan = service.start_scan(context, &cli.id);
    tokio::pin!(scan);

    let report = loop {
        tokio::select! {
            report = &mut scan => break report?,
            Some(line) = commands.recv() => handle_command(&service, &cli.id, &line),
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    let summary = report.summary();
    eprintln!(
        "Finished in state {}: score {}, {} critical, {} warnings",
        report.state, summary.score, summary.critical_issues, summary.warning_issues
    );
    for issue in &report.security_issues {
        match knowledge_base::get_finding_detail(&issue.code) {
            Some(detail) => eprintln!(
                "  [{}] {} at {}\n      fix: {}",
                detail.category, detail.title, issue.source.uri, detail.remediation
            ),
            None => eprintln!("  [{:?}] {} at {}", issue.severity, issue.name, issue.source.uri),
        }
    }
    Ok(())
}

// Stdin is read on its own thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn handle_command(service: &ScanService, id: &str, line: &str) {
    let word = line.trim();
    if word.is_empty() {
        return;
    }
    let Ok(command) = ControlCommand::from_str(word) else {
        eprintln!("Unknown command '{word}'");
        return;
    };
    match service.dispatch(id, command) {
        Ok(reply) => match serde_json::to_string(&reply) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => eprintln!("{e}"),
        },
        Err(e) => eprintln!("{e}"),
    }
}
