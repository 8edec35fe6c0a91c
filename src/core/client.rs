//! The telemetry client.
//!
//! [`TelemetryClient`] wires the connection manager, router, dashboard,
//! notification gateway and intervention controller to one timer queue. It
//! performs no IO of its own: an outer loop feeds it transport events, user
//! commands and the current time, and drains [`ClientEvent`]s for display.

use crate::activity::{create_shared_log, SharedActivityLog};
use crate::config::Config;
use crate::core::buffer::DEFAULT_CAPACITY;
use crate::core::connection::{
    ConnectionManager, ConnectionState, DEFAULT_LIVENESS_INTERVAL, DEFAULT_RETRY_INTERVAL,
};
use crate::core::intervention::{
    BreathPhase, Encouragement, InterventionController, InterventionSession, SessionEnd,
};
use crate::core::router::{DashboardState, MessageRouter, ModeChange};
use crate::core::scheduler::{TimerId, TimerKind, Timers};
use crate::error::ClientError;
use crate::notify::{Alert, Delivery, NotificationCapability, NotificationGateway};
use crate::protocol::{MentalStateMode, OutboundCommand};
use crate::transport::{Transport, TransportEvent};
use rand::RngCore;
use std::time::Duration;

/// The part of [`Config`] the client core needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub retry_interval: Duration,
    pub liveness_interval: Duration,
    pub buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry_interval: config.retry_interval,
            liveness_interval: config.liveness_interval,
            buffer_capacity: config.buffer_capacity,
        }
    }
}

/// Something the presentation layer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionChanged {
        state: ConnectionState,
        status: String,
    },
    ModeChanged(ModeChange),
    RecordingChanged(bool),
    SessionOpened {
        session: u64,
        auto_close_after: Duration,
    },
    PhaseChanged {
        session: u64,
        phase: BreathPhase,
        cycle: u32,
    },
    SessionClosed {
        session: u64,
        reason: SessionEnd,
    },
    Encouragement(&'static str),
    EncouragementCleared,
    SystemNotification(Alert),
}

/// Resilient client for one telemetry stream.
pub struct TelemetryClient<T: Transport, N: NotificationCapability> {
    timers: Timers,
    connection: ConnectionManager<T>,
    router: MessageRouter,
    dashboard: DashboardState,
    notifications: NotificationGateway<N>,
    intervention: InterventionController,
    rng: Box<dyn RngCore + Send>,
    activity: SharedActivityLog,
    reported_state: ConnectionState,
    events: Vec<ClientEvent>,
}

impl<T: Transport, N: NotificationCapability> TelemetryClient<T, N> {
    pub fn new(
        transport: T,
        capability: N,
        config: ClientConfig,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        Self {
            timers: Timers::new(),
            connection: ConnectionManager::new(
                transport,
                config.retry_interval,
                config.liveness_interval,
            ),
            router: MessageRouter::new(),
            dashboard: DashboardState::new(config.buffer_capacity),
            notifications: NotificationGateway::new(capability),
            intervention: InterventionController::new(),
            rng,
            activity: create_shared_log(),
            reported_state: ConnectionState::Disconnected,
            events: Vec::new(),
        }
    }

    /// Count activity into `log` instead of a private log.
    pub fn with_activity(mut self, log: SharedActivityLog) -> Self {
        self.activity = log;
        self
    }

    /// Ask for notification permission and start connecting.
    pub fn start(&mut self, now: Duration) {
        self.notifications.request_permission_once();
        self.connection.start(now, &mut self.timers);
        self.drain_transitions();
    }

    /// Close the connection and cancel every timer the client owns.
    pub fn stop(&mut self) {
        self.connection.stop(&mut self.timers);

        let had_message = self.intervention.encouragement().is_some();
        if let Some(session) = self.intervention.teardown(&mut self.timers) {
            self.events.push(ClientEvent::SessionClosed {
                session: session.id,
                reason: SessionEnd::TornDown,
            });
        }
        if had_message {
            self.events.push(ClientEvent::EncouragementCleared);
        }

        self.drain_transitions();
    }

    /// Apply an event reported by the transport.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Duration) {
        let frame = self
            .connection
            .on_transport_event(event, now, &mut self.timers);
        self.drain_transitions();

        if let Some(text) = frame {
            self.activity.record_frame();
            let was_recording = self.dashboard.is_recording();

            match self.router.route(&text, &mut self.dashboard) {
                Ok(Some(change)) => self.on_mode_change(change, now),
                Ok(None) => {}
                Err(e) => {
                    self.activity.record_decode_failure();
                    tracing::warn!(error = %ClientError::Decode(e.to_string()), "frame dropped");
                }
            }

            if self.dashboard.is_recording() != was_recording {
                self.events
                    .push(ClientEvent::RecordingChanged(self.dashboard.is_recording()));
            }
        }
    }

    /// Fire every timer due at or before `now`, in deadline order.
    pub fn advance(&mut self, now: Duration) {
        while let Some(fired) = self.timers.pop_due(now) {
            let at = fired.deadline;
            match fired.kind {
                TimerKind::Reconnect => {
                    self.connection
                        .on_reconnect_timer(fired.id, at, &mut self.timers);
                }
                TimerKind::LivenessCheck => {
                    self.connection
                        .on_liveness_check(fired.id, at, &mut self.timers);
                }
                TimerKind::PhaseAdvance { session } => {
                    if let Some((phase, cycle)) =
                        self.intervention
                            .on_phase_timer(fired.id, session, at, &mut self.timers)
                    {
                        self.events.push(ClientEvent::PhaseChanged {
                            session,
                            phase,
                            cycle,
                        });
                    }
                }
                TimerKind::AutoClose { session } => {
                    self.on_auto_close(fired.id, session, at);
                }
                TimerKind::ClearEncouragement { token } => {
                    if self.intervention.on_clear_encouragement(fired.id, token) {
                        self.events.push(ClientEvent::EncouragementCleared);
                    }
                }
            }
            self.drain_transitions();
        }
    }

    /// Earliest instant at which [`advance`](Self::advance) has work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn set_focused(&mut self, focused: bool) {
        tracing::debug!(focused, "focus changed");
        self.notifications.set_focused(focused);
    }

    pub fn start_recording(&mut self, now: Duration) -> Result<(), ClientError> {
        self.send_command(OutboundCommand::StartRecording, now)
    }

    pub fn stop_recording(&mut self, now: Duration) -> Result<(), ClientError> {
        self.send_command(OutboundCommand::StopRecording, now)
    }

    /// Switch the source's generation mode.
    pub fn set_mode(&mut self, mode: MentalStateMode, now: Duration) -> Result<(), ClientError> {
        self.send_command(OutboundCommand::SetMode { mode }, now)?;
        let change = self.dashboard.set_mode(mode);
        self.on_mode_change(change, now);
        Ok(())
    }

    /// Declare the subject's mental state.
    pub fn set_mental_state(
        &mut self,
        mode: MentalStateMode,
        now: Duration,
    ) -> Result<(), ClientError> {
        self.send_command(OutboundCommand::SetMentalState { mode }, now)?;
        let change = self.dashboard.set_mode(mode);
        self.on_mode_change(change, now);
        Ok(())
    }

    /// Dismiss the breathing session. Returns false if none was live.
    pub fn close_intervention(&mut self) -> bool {
        match self.intervention.close_manually(&mut self.timers) {
            Some(session) => {
                self.activity.record_session_dismissed();
                self.events.push(ClientEvent::SessionClosed {
                    session: session.id,
                    reason: SessionEnd::Dismissed,
                });
                true
            }
            None => false,
        }
    }

    /// Take the events produced since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn dashboard(&self) -> &DashboardState {
        &self.dashboard
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn session(&self) -> Option<&InterventionSession> {
        self.intervention.session()
    }

    pub fn encouragement(&self) -> Option<&Encouragement> {
        self.intervention.encouragement()
    }

    pub fn notifications(&self) -> &NotificationGateway<N> {
        &self.notifications
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn activity(&self) -> &SharedActivityLog {
        &self.activity
    }

    fn send_command(&mut self, command: OutboundCommand, now: Duration) -> Result<(), ClientError> {
        let result = self.connection.send(&command, now, &mut self.timers);
        self.drain_transitions();

        if let Err(e) = &result {
            self.dashboard.set_error(e.to_string());
            self.dashboard.set_status(e.to_string());
        }
        result
    }

    fn on_mode_change(&mut self, change: ModeChange, now: Duration) {
        if change.previous == Some(change.current) {
            return;
        }
        tracing::info!(
            previous = ?change.previous,
            current = %change.current,
            "mental state changed"
        );
        self.events.push(ClientEvent::ModeChanged(change));

        if change.entered(MentalStateMode::Stressed) {
            self.on_stress(now);
        }
    }

    fn on_stress(&mut self, now: Duration) {
        if let Some(live) = self.intervention.session() {
            tracing::debug!(session = live.id, "stress reported during a live session");
            return;
        }

        let alert = Alert::stress();
        match self.notifications.deliver(&alert) {
            Delivery::OpenSession => {
                let begun = self.intervention.begin(now, &mut self.timers, &mut *self.rng);
                if let Some(session) = begun {
                    self.activity.record_session_started();
                    let auto_close_after = self
                        .intervention
                        .session()
                        .map(|s| s.auto_close_after)
                        .unwrap_or_default();
                    self.events.push(ClientEvent::SessionOpened {
                        session,
                        auto_close_after,
                    });
                }
            }
            Delivery::SystemNotification => {
                self.activity.record_notification_sent();
                self.events.push(ClientEvent::SystemNotification(alert));
            }
            Delivery::Suppressed => {}
        }
    }

    fn on_auto_close(&mut self, id: TimerId, session: u64, at: Duration) {
        let Some(closed) =
            self.intervention
                .on_auto_close(id, session, at, &mut self.timers, &mut *self.rng)
        else {
            return;
        };

        self.activity.record_session_auto_closed();
        self.events.push(ClientEvent::SessionClosed {
            session: closed.session.id,
            reason: SessionEnd::AutoClosed,
        });

        let calm = MentalStateMode::Calm;
        if let Err(e) = self.send_command(OutboundCommand::SetMentalState { mode: calm }, at) {
            tracing::warn!(error = %e, "could not report calm state");
        }
        let change = self.dashboard.set_mode(calm);
        self.on_mode_change(change, at);

        self.events.push(ClientEvent::Encouragement(closed.message));
    }

    /// Reflect connection transitions in the dashboard and the outbox.
    fn drain_transitions(&mut self) {
        for state in self.connection.take_transitions() {
            let status = match state {
                ConnectionState::Connecting => {
                    self.activity.record_connection_attempt();
                    "Connecting...".to_string()
                }
                ConnectionState::Open => {
                    self.dashboard.clear_error();
                    "Connected".to_string()
                }
                ConnectionState::Reconnecting { delay } => {
                    self.activity.record_reconnect_scheduled();
                    if self.reported_state == ConnectionState::Open {
                        let reason = self
                            .connection
                            .last_close_reason()
                            .unwrap_or("closed by peer")
                            .to_string();
                        self.dashboard
                            .set_error(ClientError::ConnectionLost(reason).to_string());
                    }
                    format!("Reconnecting in {}s...", delay.as_secs())
                }
                ConnectionState::Disconnected => "Disconnected".to_string(),
                ConnectionState::Failed => {
                    if let Some(reason) = self.connection.last_close_reason() {
                        self.dashboard.set_error(reason.to_string());
                    }
                    "Connection Error".to_string()
                }
            };

            self.reported_state = state;
            self.dashboard.set_status(status.clone());
            self.events
                .push(ClientEvent::ConnectionChanged { state, status });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use crate::transport::TransportError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct LoopbackTransport {
        sent: Vec<String>,
    }

    impl Transport for LoopbackTransport {
        fn connect(&mut self, _attempt: u64) -> Result<(), TransportError> {
            Ok(())
        }

        fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            self.sent.push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn client() -> TelemetryClient<LoopbackTransport, NoopNotifier> {
        TelemetryClient::new(
            LoopbackTransport::default(),
            NoopNotifier::new(),
            ClientConfig::default(),
            Box::new(StdRng::seed_from_u64(42)),
        )
    }

    #[test]
    fn test_status_follows_connection() {
        let mut client = client();
        assert_eq!(client.dashboard().status(), "Disconnected");

        client.start(Duration::ZERO);
        assert_eq!(client.dashboard().status(), "Connecting...");

        let attempt = client.connection().current_attempt();
        client.handle_transport(TransportEvent::opened(attempt), Duration::from_millis(50));
        assert_eq!(client.dashboard().status(), "Connected");

        client.handle_transport(TransportEvent::closed(attempt), Duration::from_secs(1));
        assert_eq!(client.dashboard().status(), "Reconnecting in 3s...");
        assert!(client
            .dashboard()
            .error()
            .is_some_and(|e| e.starts_with("Connection lost")));

        let states: Vec<ConnectionState> = client
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::ConnectionChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Open,
                ConnectionState::Reconnecting {
                    delay: Duration::from_secs(3)
                },
            ]
        );
        assert_eq!(client.activity().stats().reconnects_scheduled, 1);
    }

    #[test]
    fn test_decode_failure_keeps_connection() {
        let mut client = client();
        client.start(Duration::ZERO);
        let attempt = client.connection().current_attempt();
        client.handle_transport(TransportEvent::opened(attempt), Duration::ZERO);

        client.handle_transport(TransportEvent::frame(attempt, "{not json"), Duration::ZERO);
        client.handle_transport(
            TransportEvent::frame(attempt, r#"{"message":"no type"}"#),
            Duration::ZERO,
        );

        assert!(client.connection().is_open());
        assert_eq!(client.activity().stats().decode_failures, 2);
        assert_eq!(client.activity().stats().frames_received, 2);
    }

    #[test]
    fn test_recording_events() {
        let mut client = client();
        client.start(Duration::ZERO);
        let attempt = client.connection().current_attempt();
        client.handle_transport(TransportEvent::opened(attempt), Duration::ZERO);
        client.take_events();

        client.handle_transport(
            TransportEvent::frame(attempt, r#"{"type":"state_sync","is_recording":true}"#),
            Duration::ZERO,
        );
        assert_eq!(client.take_events(), vec![ClientEvent::RecordingChanged(true)]);
        assert_eq!(client.dashboard().status(), "Recording...");
    }

    #[test]
    fn test_config_subset() {
        let config = Config {
            retry_interval: Duration::from_secs(7),
            buffer_capacity: 10,
            ..Config::default()
        };
        let client_config = ClientConfig::from(&config);
        assert_eq!(client_config.retry_interval, Duration::from_secs(7));
        assert_eq!(client_config.liveness_interval, Duration::from_secs(3));
        assert_eq!(client_config.buffer_capacity, 10);
    }
}
