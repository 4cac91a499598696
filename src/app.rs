//! Core application runner (business logic) for `airpods-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process
//! exit codes so it can be tested deterministically: the scanner is
//! injected behind a trait and output goes to injected writers.

use crate::device::Device;
use crate::output::ReportFormat;
use crate::scanner::lifecycle::AirPodsScanner;
use crate::scanner::{Backend, ScanError};
use clap::Parser;
use log::info;
use std::io;
use std::io::Write;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// How long to observe advertisements before reporting.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Report output format
    #[arg(long, default_value_t, value_enum)]
    pub format: ReportFormat,

    /// Verbose output, print scan warnings and decode diagnostics
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    /// The advertisement source refused to start
    #[error("failed to start Bluetooth advertisement scan")]
    StartFailed,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without
/// Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start(&self) -> bool;
    fn stop(&self) -> bool;
    fn is_scanning(&self) -> bool;
    fn snapshot(&self) -> Vec<Device>;
}

impl Scanner for AirPodsScanner {
    fn start(&self) -> bool {
        AirPodsScanner::start(self)
    }

    fn stop(&self) -> bool {
        AirPodsScanner::stop(self)
    }

    fn is_scanning(&self) -> bool {
        AirPodsScanner::is_scanning(self)
    }

    fn snapshot(&self) -> Vec<Device> {
        self.devices()
    }
}

/// Run one observation window, writing the report to `out` and warnings
/// to `err`.
///
/// Starts the scanner (a refusal is surfaced as [`RunError::StartFailed`],
/// never hidden), observes for `options.duration`, stops, then renders a
/// snapshot with the selected formatter.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    if !scanner.start() {
        return Err(RunError::StartFailed);
    }

    info!("scanning for {:?}", options.duration);
    tokio::time::sleep(options.duration).await;

    if !scanner.stop() && options.verbose {
        writeln!(err, "warning: scan stop reported failure")?;
    }

    let devices = scanner.snapshot();
    let formatter = options.format.formatter();
    writeln!(out, "{}", formatter.format(&devices, SystemTime::now()))?;

    Ok(())
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return Ok(Duration::from_secs(minutes * 60));
    }

    if let Some(num) = src.strip_suffix('s') {
        let secs: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds: {}", num))?;
        return Ok(Duration::from_secs(secs));
    }

    // No suffix, treat as seconds
    let secs: u64 = src
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Ok(Duration::from_secs(secs))
}
