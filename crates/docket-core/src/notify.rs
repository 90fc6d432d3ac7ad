use std::io::{self, IsTerminal, Write};

use parking_lot::Mutex;
use tracing::{debug, error, info};

/// User-visible feedback channel.
pub trait Notifier {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(message, "notify success");
    }

    fn error(&self, message: &str) {
        error!(message, "notify error");
    }
}

/// Prints notifications for the CLI: successes on stdout, errors on stderr.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    color: bool,
}

impl ConsoleNotifier {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, code: &str, terminal: bool) -> String {
        if !self.color || !terminal {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        let line = self.paint(message, "32", io::stdout().is_terminal());
        emit(io::stdout().lock(), &line);
    }

    fn error(&self, message: &str) {
        let line = self.paint(message, "31", io::stderr().is_terminal());
        emit(io::stderr().lock(), &line);
    }
}

/// Writes one notification line. A closed or full stream is logged, not fatal.
fn emit<W: Write>(mut out: W, line: &str) -> bool {
    match writeln!(out, "{line}") {
        Ok(()) => true,
        Err(err) => {
            debug!(error = %err, line, "notification not written");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Error(msg) => Some(msg.clone()),
                Notice::Success(_) => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notice::Success(msg) => Some(msg.clone()),
                Notice::Error(_) => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.notices.lock().push(Notice::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.notices.lock().push(Notice::Error(message.to_string()));
    }
}
