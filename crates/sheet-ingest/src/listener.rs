use std::fmt;

use crate::IngestError;

/// The three stages of a parse, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    LocateHeader,
    MapHeader,
    BuildRecords,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::LocateHeader => "locate header",
            Phase::MapHeader => "map header",
            Phase::BuildRecords => "build records",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer for parse progress.
///
/// All methods have empty defaults so implementors only override what they
/// care about.
pub trait ParseListener {
    fn phase_started(&mut self, phase: Phase) {
        let _ = phase;
    }

    fn phase_finished(&mut self, phase: Phase) {
        let _ = phase;
    }

    /// Called once when a parse stops on an error. The error is stored on the
    /// result afterwards.
    fn parse_failed(&mut self, error: &IngestError) {
        let _ = error;
    }
}

/// Forwards parse progress to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl ParseListener for LogListener {
    fn phase_started(&mut self, phase: Phase) {
        log::debug!("{phase}: started");
    }

    fn phase_finished(&mut self, phase: Phase) {
        log::debug!("{phase}: finished");
    }

    fn parse_failed(&mut self, error: &IngestError) {
        log::error!("spreadsheet parse failed: {error}");
    }
}
