use std::io::{self, Write};

use serde::Serialize;

use crate::app::{RunReport, SignificantReport, StatusReport};
use crate::progress::{EventLevel, ProgressEvent, ProgressSink, TracingSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(report: &StatusReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_significant(report: &SignificantReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Only the JSON report goes to stdout; warnings and errors still reach the log on stderr.
impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        if event.level >= EventLevel::Warn {
            TracingSink.event(event);
        }
    }
}
