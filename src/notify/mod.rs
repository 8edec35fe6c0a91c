//! Alert delivery.
//!
//! A stress alert is either shown in-app as an interactive breathing session
//! (when the application has focus) or handed to the system notification
//! capability. The capability is permission-gated and may be missing
//! entirely, in which case alerts are dropped without surfacing an error.

pub mod console;
pub mod noop;

use crate::error::ClientError;

pub use console::ConsoleNotifier;
pub use noop::NoopNotifier;

/// Permission to show system notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not asked yet
    Undetermined,
}

/// A system notification capability.
pub trait NotificationCapability {
    /// Whether the host offers system notifications at all.
    fn is_available(&self) -> bool;

    fn permission_state(&self) -> PermissionState;

    /// Ask for permission. The answer only affects later alerts.
    fn request_permission(&mut self) -> PermissionState;

    /// Fire-and-forget notification.
    fn notify(&mut self, title: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notification delivery errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// No capability or permission
    Unavailable,
    /// The host rejected the notification
    Failed(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Unavailable => write!(f, "System notifications are unavailable"),
            NotifyError::Failed(e) => write!(f, "Notification failed: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// An alert to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// The alert raised when the subject becomes stressed.
    pub fn stress() -> Self {
        Self::new(
            "Stress detected",
            "Take a minute for a guided breathing exercise.",
        )
    }
}

/// How an alert was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The application is focused: open an interactive session
    OpenSession,
    /// A system notification was shown
    SystemNotification,
    /// Nothing was shown
    Suppressed,
}

/// Chooses between in-app sessions and system notifications.
pub struct NotificationGateway<N: NotificationCapability> {
    capability: N,
    focused: bool,
    permission_requested: bool,
}

impl<N: NotificationCapability> NotificationGateway<N> {
    /// Create a gateway. The application starts focused.
    pub fn new(capability: N) -> Self {
        Self {
            capability,
            focused: true,
            permission_requested: false,
        }
    }

    /// Request notification permission if it has never been decided.
    ///
    /// Runs at most once per gateway; later calls are no-ops.
    pub fn request_permission_once(&mut self) {
        if self.permission_requested || !self.capability.is_available() {
            return;
        }
        if self.capability.permission_state() == PermissionState::Undetermined {
            self.permission_requested = true;
            let state = self.capability.request_permission();
            tracing::info!(?state, "notification permission requested");
        }
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Whether a system notification could be shown right now.
    pub fn system_notifications(&self) -> Result<(), ClientError> {
        if self.capability.is_available()
            && self.capability.permission_state() == PermissionState::Granted
        {
            Ok(())
        } else {
            Err(ClientError::PermissionUnavailable)
        }
    }

    /// Deliver an alert according to focus and permission.
    pub fn deliver(&mut self, alert: &Alert) -> Delivery {
        if self.focused {
            return Delivery::OpenSession;
        }

        if self.capability.is_available()
            && self.capability.permission_state() == PermissionState::Undetermined
        {
            self.request_permission_once();
            return Delivery::Suppressed;
        }

        if let Err(e) = self.system_notifications() {
            tracing::debug!(error = %e, "alert dropped");
            return Delivery::Suppressed;
        }

        match self.capability.notify(&alert.title, &alert.body) {
            Ok(()) => Delivery::SystemNotification,
            Err(e) => {
                tracing::debug!(error = %e, "system notification failed");
                Delivery::Suppressed
            }
        }
    }

    pub fn capability(&self) -> &N {
        &self.capability
    }

    pub fn capability_mut(&mut self) -> &mut N {
        &mut self.capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCapability {
        available: bool,
        state: PermissionState,
        grant_on_request: bool,
        requests: u32,
        sent: Vec<String>,
    }

    impl FakeCapability {
        fn new(state: PermissionState) -> Self {
            Self {
                available: true,
                state,
                grant_on_request: true,
                requests: 0,
                sent: Vec::new(),
            }
        }
    }

    impl NotificationCapability for FakeCapability {
        fn is_available(&self) -> bool {
            self.available
        }

        fn permission_state(&self) -> PermissionState {
            self.state
        }

        fn request_permission(&mut self) -> PermissionState {
            self.requests += 1;
            self.state = if self.grant_on_request {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            self.state
        }

        fn notify(&mut self, title: &str, _body: &str) -> Result<(), NotifyError> {
            self.sent.push(title.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_focused_opens_session() {
        let mut gateway = NotificationGateway::new(FakeCapability::new(PermissionState::Granted));
        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::OpenSession);
        assert!(gateway.capability().sent.is_empty());
    }

    #[test]
    fn test_unfocused_with_permission_notifies() {
        let mut gateway = NotificationGateway::new(FakeCapability::new(PermissionState::Granted));
        gateway.set_focused(false);

        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::SystemNotification);
        assert_eq!(gateway.capability().sent, vec!["Stress detected".to_string()]);
    }

    #[test]
    fn test_undetermined_permission_applies_to_future_alerts_only() {
        let mut gateway =
            NotificationGateway::new(FakeCapability::new(PermissionState::Undetermined));
        gateway.set_focused(false);

        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::Suppressed);
        assert_eq!(gateway.capability().requests, 1);
        assert!(gateway.capability().sent.is_empty());

        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::SystemNotification);
        assert_eq!(gateway.capability().requests, 1);
    }

    #[test]
    fn test_permission_requested_once() {
        let mut capability = FakeCapability::new(PermissionState::Undetermined);
        capability.grant_on_request = false;
        let mut gateway = NotificationGateway::new(capability);

        gateway.request_permission_once();
        gateway.request_permission_once();
        gateway.set_focused(false);
        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::Suppressed);

        assert_eq!(gateway.capability().requests, 1);
    }

    #[test]
    fn test_unavailable_capability_degrades_silently() {
        let mut capability = FakeCapability::new(PermissionState::Granted);
        capability.available = false;
        let mut gateway = NotificationGateway::new(capability);
        gateway.set_focused(false);

        assert_eq!(gateway.deliver(&Alert::stress()), Delivery::Suppressed);
        assert!(gateway.capability().sent.is_empty());
        assert_eq!(
            gateway.system_notifications(),
            Err(ClientError::PermissionUnavailable)
        );
    }
}
