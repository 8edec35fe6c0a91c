//! Terminal notification backend.
//!
//! Rings the terminal bell and writes the alert to stderr. Permission is
//! granted on request only when notifications are enabled in the config.

use crate::notify::{NotificationCapability, NotifyError, PermissionState};
use std::io::Write;

/// Notifies through the controlling terminal.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    enabled: bool,
    state: PermissionState,
    delivered: u64,
}

impl ConsoleNotifier {
    /// Create a notifier; `enabled` decides how a permission request resolves.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: PermissionState::Undetermined,
            delivered: 0,
        }
    }

    /// Number of notifications written so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl NotificationCapability for ConsoleNotifier {
    fn is_available(&self) -> bool {
        true
    }

    fn permission_state(&self) -> PermissionState {
        self.state
    }

    fn request_permission(&mut self) -> PermissionState {
        self.state = if self.enabled {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        self.state
    }

    fn notify(&mut self, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.state != PermissionState::Granted {
            return Err(NotifyError::Unavailable);
        }

        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "\x07[{title}] {body}").map_err(|e| NotifyError::Failed(e.to_string()))?;
        self.delivered += 1;
        tracing::info!(title, "system notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_follows_config() {
        let mut enabled = ConsoleNotifier::new(true);
        assert_eq!(enabled.permission_state(), PermissionState::Undetermined);
        assert_eq!(enabled.request_permission(), PermissionState::Granted);

        let mut disabled = ConsoleNotifier::new(false);
        assert_eq!(disabled.request_permission(), PermissionState::Denied);
        assert_eq!(disabled.notify("t", "b"), Err(NotifyError::Unavailable));
        assert_eq!(disabled.delivered(), 0);
    }

    #[test]
    fn test_notify_after_grant() {
        let mut notifier = ConsoleNotifier::new(true);
        notifier.request_permission();
        assert!(notifier.notify("Stress detected", "Breathe").is_ok());
        assert_eq!(notifier.delivered(), 1);
    }
}
