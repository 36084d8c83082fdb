//! Failure reporting.
//!
//! Task failures are rendered prominently and routed through a [`Notifier`]
//! so interactive runs can surface them without killing the process. The
//! watch loop in particular reports and carries on.

use crate::pipeline::stage::Diagnostic;

/// Sink for prominent failure notices.
pub trait Notifier {
    /// Deliver a rendered failure notice.
    fn notify(&self, title: &str, body: &str);
}

/// Writes notices to stderr with a banner, mirroring desktop-notification
/// style output in a plain terminal.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, body: &str) {
        eprintln!("{}", "-".repeat(60));
        eprintln!("{}", title);
        eprintln!("{}", body);
        eprintln!("{}", "-".repeat(60));
    }
}

/// Formats and dispatches task failures and diagnostics.
pub struct ErrorReporter {
    notifier: Box<dyn Notifier>,
}

impl ErrorReporter {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Reporter writing to the console.
    pub fn console() -> Self {
        Self::new(Box::new(ConsoleNotifier))
    }

    /// Report a task failure. The failure is contained here: callers decide
    /// whether to abort (one-shot build) or continue (watch loop).
    pub fn task_failed(&self, task: &str, error: &dyn std::fmt::Display) {
        let title = format!("Task Failed [{}]", task);
        let body = error.to_string();
        tracing::error!("{}: {}", title, body);
        self.notifier.notify(&title, &body);
    }

    /// Print non-fatal diagnostics collected during a run.
    pub fn diagnostics(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            tracing::warn!("{}", diagnostic);
            eprintln!("  {}", diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingNotifier {
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, body: &str) {
            self.seen.lock().unwrap().push((title.to_string(), body.to_string()));
        }
    }

    #[test]
    fn test_task_failed_formats_title() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter = ErrorReporter::new(Box::new(RecordingNotifier { seen: seen.clone() }));

        reporter.task_failed("styles", &"missing partial _grid.scss");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Task Failed [styles]");
        assert!(seen[0].1.contains("_grid.scss"));
    }

    #[test]
    fn test_reporter_survives_repeated_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter = ErrorReporter::new(Box::new(RecordingNotifier { seen: seen.clone() }));

        reporter.task_failed("scripts", &"parse error");
        reporter.task_failed("scripts", &"parse error");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
