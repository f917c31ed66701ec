use tracing::info;

/// Readiness, alert, and progress signaling toward the embedding host app.
///
/// The engine only ever talks to the host through this seam, so a non-host
/// environment (CLI, tests) can substitute logging or a recording double.
pub trait HostSignals {
    /// Tells the host the pad grid is loaded and interactive.
    fn signal_ready(&self);
    fn show_alert(&self, message: &str);
    fn set_progress_text(&self, text: &str);
    fn show_progress(&self);
    fn hide_progress(&self);
}

/// Default host for non-embedded runs: everything goes to the log.
#[derive(Debug, Default)]
pub struct LogHost;

impl HostSignals for LogHost {
    fn signal_ready(&self) {
        info!("host: ready");
    }

    fn show_alert(&self, message: &str) {
        info!(message, "host: alert");
    }

    fn set_progress_text(&self, text: &str) {
        info!(text, "host: progress text");
    }

    fn show_progress(&self) {
        info!("host: progress shown");
    }

    fn hide_progress(&self) {
        info!("host: progress hidden");
    }
}
