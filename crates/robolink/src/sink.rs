//! Notifications printed to stderr.

use std::io::Write;

use owo_colors::OwoColorize;

use robolink_core::{NotificationKind, NotificationSink};

#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    color: bool,
}

impl ConsoleSink {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn format(&self, kind: NotificationKind, title: &str, message: &str) -> String {
        let label = format!("[{kind}]");
        if !self.color {
            return format!("{label} {title}: {message}");
        }
        let label = match kind {
            NotificationKind::Success => label.green().bold().to_string(),
            NotificationKind::Info => label.cyan().bold().to_string(),
            NotificationKind::Warning => label.yellow().bold().to_string(),
            NotificationKind::Error => label.red().bold().to_string(),
        };
        format!("{label} {}: {message}", title.bold())
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        let line = self.format(kind, title, message);
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}
