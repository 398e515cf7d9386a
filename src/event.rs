//! Lifecycle event log.
//!
//! Every relay milestone is written as one line to standard output:
//!
//! ```text
//! 2024-01-02T03:04:05Z [+] 10.0.0.7:51234 => 93.184.216.34:443
//! ```
//!
//! ERROR events may additionally carry a detail that is written to standard
//! error when verbose mode is on. Logging is best-effort: write failures are
//! ignored and never affect the session that emitted the event.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::config::DisplayZone;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Error,
    Open,
    Close,
}

impl EventKind {
    /// Single-character symbol shown between brackets.
    pub fn symbol(self) -> char {
        match self {
            EventKind::Start => '*',
            EventKind::Error => '!',
            EventKind::Open => '+',
            EventKind::Close => '-',
        }
    }
}

/// One lifecycle record.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub source: String,
    pub destination: String,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            destination: destination.into(),
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// Formats the stdout line, without the trailing newline.
    pub fn format_line(&self, zone: &DisplayZone) -> String {
        format!(
            "{} [{}] {} => {}",
            zone.format(self.timestamp),
            self.kind.symbol(),
            self.source,
            self.destination
        )
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes lifecycle events. Cheap to clone; clones share the same writers.
#[derive(Clone)]
pub struct EventLogger {
    zone: DisplayZone,
    verbose: bool,
    out: SharedWriter,
    err: SharedWriter,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("zone", &self.zone)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl EventLogger {
    /// Logger writing to the process's stdout and stderr.
    pub fn stdio(zone: DisplayZone, verbose: bool) -> Self {
        Self::with_writers(
            zone,
            verbose,
            Box::new(std::io::stdout()),
            Box::new(std::io::stderr()),
        )
    }

    /// Logger writing to arbitrary sinks.
    pub fn with_writers(
        zone: DisplayZone,
        verbose: bool,
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            zone,
            verbose,
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    pub fn log(&self, event: &Event) {
        let line = event.format_line(&self.zone);
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }

        if event.kind != EventKind::Error || !self.verbose {
            return;
        }
        if let Some(detail) = &event.detail {
            if let Ok(mut err) = self.err.lock() {
                let _ = write!(err, "\n{}\n\n", detail);
                let _ = err.flush();
            }
        }
    }

    pub fn start(&self, listen: &str, destination: &str) {
        self.log(&Event::new(EventKind::Start, listen, destination));
    }

    pub fn open(&self, source: &str, destination: &str) {
        self.log(&Event::new(EventKind::Open, source, destination));
    }

    pub fn close(&self, source: &str, destination: &str) {
        self.log(&Event::new(EventKind::Close, source, destination));
    }

    pub fn error(&self, source: &str, destination: &str, detail: impl ToString) {
        self.log(&Event::new(EventKind::Error, source, destination).with_detail(detail));
    }
}
