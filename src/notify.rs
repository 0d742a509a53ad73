//! Desktop notifications for user-facing notices.

use notify_rust::Notification;
use sori_core::{APP_NAME, APP_NAME_PRETTY, Notice, Notifier};
use tracing::{error, warn};

/// Send a system notification with a summary and body.
pub fn notify(summary: &str, body: &str) {
    Notification::new()
        .appname(APP_NAME)
        .summary(&format!("{} - {}", APP_NAME_PRETTY, summary))
        .body(body)
        .show()
        .map_err(|e| error!("Failed to send notification: {}", e))
        .ok();
}

/// Shows notices as desktop notifications, and logs them too.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notice: Notice) {
        warn!(notice = ?notice, "{}", notice.message());
        notify(notice.summary(), notice.message());
    }
}
