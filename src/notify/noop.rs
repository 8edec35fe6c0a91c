//! Notification backend for hosts without system notifications.
//!
//! Reports itself unavailable, so alerts raised while unfocused are dropped.

use crate::notify::{NotificationCapability, NotifyError, PermissionState};

/// A capability that never shows anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl NotificationCapability for NoopNotifier {
    fn is_available(&self) -> bool {
        false
    }

    fn permission_state(&self) -> PermissionState {
        PermissionState::Denied
    }

    fn request_permission(&mut self) -> PermissionState {
        PermissionState::Denied
    }

    fn notify(&mut self, _title: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_is_unavailable() {
        let mut notifier = NoopNotifier::new();
        assert!(!notifier.is_available());
        assert_eq!(notifier.request_permission(), PermissionState::Denied);
        assert_eq!(notifier.notify("t", "b"), Err(NotifyError::Unavailable));
    }
}
