//! Output formatters for scan reports.
//!
//! This module provides a trait for rendering a device snapshot into a
//! report string, with implementations for human-readable text and the
//! machine-readable JSON report.

pub mod json;
pub mod text;

use crate::device::Device;
use std::fmt;
use std::time::SystemTime;

/// Trait for rendering a completed scan into an output string.
///
/// Implementations receive the full device snapshot plus the time the
/// report is taken, so rendering stays deterministic under test.
pub trait ReportFormatter: Send + Sync {
    fn format(&self, devices: &[Device], scanned_at: SystemTime) -> String;
}

/// Report formats selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary lines
    #[default]
    Text,
    /// JSON scan report
    Json,
}

impl ReportFormat {
    /// Formatter implementing this format.
    pub fn formatter(self) -> Box<dyn ReportFormatter> {
        match self {
            ReportFormat::Text => Box::new(text::TextFormatter::new()),
            ReportFormat::Json => Box::new(json::JsonFormatter::new()),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => write!(f, "text"),
            ReportFormat::Json => write!(f, "json"),
        }
    }
}
