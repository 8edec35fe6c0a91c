//! Connection lifecycle management.
//!
//! Owns the single logical connection to the streaming endpoint. Two
//! producers can start a connection attempt:
//!
//! 1. the close handler, which schedules a reconnect after a fixed interval;
//! 2. a periodic liveness check, which restarts a connection that is down
//!    when no attempt or reconnect timer is pending.
//!
//! Both go through the same guard, so at most one attempt is in flight and
//! at most one reconnect timer is pending at any instant. Retries are
//! unlimited; only [`ConnectionManager::stop`] suppresses them.

use crate::core::scheduler::{TimerId, TimerKind, Timers};
use crate::error::ClientError;
use crate::protocol::OutboundCommand;
use crate::transport::{Transport, TransportEvent, TransportEventKind};
use std::time::Duration;

/// Default delay before reconnecting after a close.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Default period of the liveness check.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(3);

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// A reconnect is scheduled after `delay`
    Reconnecting { delay: Duration },
    /// The last attempt could not be started
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Reconnecting { delay } => {
                write!(f, "reconnecting in {}ms", delay.as_millis())
            }
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Retry bookkeeping shared by both reconnect producers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconnectState {
    /// Attempts since the last successful open
    pub attempt_count: u32,
    pub pending_timer: Option<TimerId>,
    pub is_connecting: bool,
}

/// Manages connect, retry and close for one transport.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    reconnect: ReconnectState,
    /// Id of the current attempt; transport events from other attempts are stale
    attempt_id: u64,
    stopped: bool,
    liveness_timer: Option<TimerId>,
    retry_interval: Duration,
    liveness_interval: Duration,
    last_close_reason: Option<String>,
    transitions: Vec<ConnectionState>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, retry_interval: Duration, liveness_interval: Duration) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            reconnect: ReconnectState::default(),
            attempt_id: 0,
            stopped: false,
            liveness_timer: None,
            retry_interval,
            liveness_interval,
            last_close_reason: None,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn reconnect_state(&self) -> &ReconnectState {
        &self.reconnect
    }

    /// Id of the most recent connection attempt.
    pub fn current_attempt(&self) -> u64 {
        self.attempt_id
    }

    pub fn liveness_timer(&self) -> Option<TimerId> {
        self.liveness_timer
    }

    pub fn last_close_reason(&self) -> Option<&str> {
        self.last_close_reason.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take every state transition recorded since the last call, in order.
    pub fn take_transitions(&mut self) -> Vec<ConnectionState> {
        std::mem::take(&mut self.transitions)
    }

    /// The guard both reconnect producers share.
    pub fn attempt_or_timer_pending(&self) -> bool {
        self.reconnect.is_connecting || self.reconnect.pending_timer.is_some()
    }

    /// Start connecting.
    ///
    /// No-op when an attempt is in flight or the connection is open. A
    /// pending reconnect timer is replaced by an immediate attempt. Returns
    /// whether an attempt was made.
    pub fn start(&mut self, now: Duration, timers: &mut Timers) -> bool {
        self.stopped = false;
        self.arm_liveness(now, timers);

        if self.reconnect.is_connecting || self.is_open() {
            tracing::debug!(state = %self.state, "start ignored, connection already active");
            return false;
        }

        if let Some(id) = self.reconnect.pending_timer.take() {
            timers.cancel(id);
        }
        self.attempt(now, timers);
        true
    }

    /// Deliberately close the connection and suppress automatic reconnects.
    pub fn stop(&mut self, timers: &mut Timers) {
        self.stopped = true;

        if let Some(id) = self.reconnect.pending_timer.take() {
            timers.cancel(id);
        }
        if let Some(id) = self.liveness_timer.take() {
            timers.cancel(id);
        }

        self.reconnect.is_connecting = false;
        self.reconnect.attempt_count = 0;
        // Anything the closed socket still reports belongs to a dead attempt.
        self.attempt_id += 1;
        self.transport.close();

        tracing::info!("connection stopped");
        self.transition(ConnectionState::Disconnected);
    }

    /// Send a command on the open connection.
    ///
    /// When the connection is not open this fails with
    /// [`ClientError::NotConnected`] and starts a connection attempt.
    pub fn send(
        &mut self,
        command: &OutboundCommand,
        now: Duration,
        timers: &mut Timers,
    ) -> Result<(), ClientError> {
        if !self.is_open() {
            tracing::warn!(?command, state = %self.state, "cannot send, connection not open");
            self.start(now, timers);
            return Err(ClientError::NotConnected);
        }

        let frame = command
            .encode()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        self.transport.send(&frame)?;
        tracing::debug!(%frame, "command sent");
        Ok(())
    }

    /// Apply a transport event. Returns the text of an inbound frame.
    pub fn on_transport_event(
        &mut self,
        event: TransportEvent,
        now: Duration,
        timers: &mut Timers,
    ) -> Option<String> {
        if event.attempt != self.attempt_id {
            tracing::trace!(
                attempt = event.attempt,
                current = self.attempt_id,
                "ignoring event from stale connection attempt"
            );
            return None;
        }

        match event.kind {
            TransportEventKind::Opened => {
                self.on_open(timers);
                None
            }
            TransportEventKind::Frame(text) => Some(text),
            TransportEventKind::Closed { reason } => {
                self.on_close(reason, now, timers);
                None
            }
            TransportEventKind::Error(message) => {
                tracing::debug!(%message, "socket error");
                self.on_close(Some(message), now, timers);
                None
            }
        }
    }

    /// Handle the reconnect timer firing.
    pub fn on_reconnect_timer(&mut self, id: TimerId, now: Duration, timers: &mut Timers) {
        if self.reconnect.pending_timer != Some(id) {
            return;
        }
        self.reconnect.pending_timer = None;

        if self.stopped || self.reconnect.is_connecting || self.is_open() {
            return;
        }
        self.attempt(now, timers);
    }

    /// Handle the liveness check firing.
    pub fn on_liveness_check(&mut self, id: TimerId, now: Duration, timers: &mut Timers) {
        if self.liveness_timer != Some(id) {
            return;
        }
        self.liveness_timer = None;

        if self.stopped {
            return;
        }
        self.arm_liveness(now, timers);

        if !self.is_open() && !self.attempt_or_timer_pending() {
            tracing::info!(state = %self.state, "liveness check found connection down");
            self.start(now, timers);
        }
    }

    fn arm_liveness(&mut self, now: Duration, timers: &mut Timers) {
        if self.liveness_timer.is_none() {
            self.liveness_timer =
                Some(timers.schedule(now, self.liveness_interval, TimerKind::LivenessCheck));
        }
    }

    fn attempt(&mut self, now: Duration, timers: &mut Timers) {
        self.attempt_id += 1;
        self.reconnect.attempt_count += 1;
        self.reconnect.is_connecting = true;

        tracing::info!(
            attempt = self.reconnect.attempt_count,
            "connecting to telemetry endpoint"
        );
        self.transition(ConnectionState::Connecting);

        if let Err(e) = self.transport.connect(self.attempt_id) {
            tracing::warn!(error = %e, "connection attempt failed to start");
            self.reconnect.is_connecting = false;
            self.last_close_reason = Some(e.to_string());
            self.transition(ConnectionState::Failed);
            self.schedule_reconnect(now, timers);
        }
    }

    fn on_open(&mut self, timers: &mut Timers) {
        self.reconnect.is_connecting = false;
        self.reconnect.attempt_count = 0;
        if let Some(id) = self.reconnect.pending_timer.take() {
            timers.cancel(id);
        }
        self.last_close_reason = None;

        tracing::info!("telemetry connection open");
        self.transition(ConnectionState::Open);
    }

    fn on_close(&mut self, reason: Option<String>, now: Duration, timers: &mut Timers) {
        let was_open = self.is_open();
        self.reconnect.is_connecting = false;
        self.transport.close();
        if reason.is_some() {
            self.last_close_reason = reason;
        }

        if self.stopped {
            self.transition(ConnectionState::Disconnected);
            return;
        }

        if was_open {
            tracing::warn!(reason = ?self.last_close_reason, "telemetry connection lost");
        }
        self.schedule_reconnect(now, timers);
    }

    fn schedule_reconnect(&mut self, now: Duration, timers: &mut Timers) {
        if self.reconnect.pending_timer.is_some() {
            tracing::debug!("reconnect already scheduled");
            return;
        }

        let delay = self.retry_interval;
        self.reconnect.pending_timer = Some(timers.schedule(now, delay, TimerKind::Reconnect));
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.transition(ConnectionState::Reconnecting { delay });
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.transitions.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[derive(Default)]
    struct ScriptedTransport {
        connects: Vec<u64>,
        sent: Vec<String>,
        closes: u32,
        refuse: bool,
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self, attempt: u64) -> Result<(), TransportError> {
            if self.refuse {
                return Err(TransportError::InvalidEndpoint("refused".into()));
            }
            self.connects.push(attempt);
            Ok(())
        }

        fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            self.sent.push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn manager() -> ConnectionManager<ScriptedTransport> {
        ConnectionManager::new(
            ScriptedTransport::default(),
            DEFAULT_RETRY_INTERVAL,
            DEFAULT_LIVENESS_INTERVAL,
        )
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut timers = Timers::new();
        let mut conn = manager();

        assert!(conn.start(ms(0), &mut timers));
        assert!(!conn.start(ms(10), &mut timers));
        assert_eq!(conn.transport().connects.len(), 1);

        let attempt = conn.current_attempt();
        conn.on_transport_event(TransportEvent::opened(attempt), ms(20), &mut timers);
        assert!(!conn.start(ms(30), &mut timers));
        assert_eq!(conn.transport().connects.len(), 1);
        assert_eq!(
            conn.take_transitions(),
            vec![ConnectionState::Connecting, ConnectionState::Open]
        );
    }

    #[test]
    fn test_open_resets_attempts() {
        let mut timers = Timers::new();
        let mut conn = manager();
        conn.start(ms(0), &mut timers);
        conn.on_transport_event(TransportEvent::closed(1), ms(5), &mut timers);
        while let Some(fired) = timers.pop_due(ms(3005)) {
            match fired.kind {
                TimerKind::Reconnect => {
                    conn.on_reconnect_timer(fired.id, fired.deadline, &mut timers)
                }
                TimerKind::LivenessCheck => {
                    conn.on_liveness_check(fired.id, fired.deadline, &mut timers)
                }
                _ => {}
            }
        }
        assert_eq!(conn.reconnect_state().attempt_count, 2);
        assert_eq!(conn.transport().connects, vec![1, 2]);

        let attempt = conn.current_attempt();
        conn.on_transport_event(TransportEvent::opened(attempt), ms(3010), &mut timers);
        assert_eq!(conn.reconnect_state().attempt_count, 0);
        assert!(conn.reconnect_state().pending_timer.is_none());
    }

    #[test]
    fn test_second_close_does_not_add_timer() {
        let mut timers = Timers::new();
        let mut conn = manager();
        conn.start(ms(0), &mut timers);
        let attempt = conn.current_attempt();
        conn.on_transport_event(TransportEvent::opened(attempt), ms(1), &mut timers);

        conn.on_transport_event(TransportEvent::error(attempt, "reset"), ms(100), &mut timers);
        conn.on_transport_event(TransportEvent::closed(attempt), ms(101), &mut timers);

        assert_eq!(timers.pending(|k| matches!(k, TimerKind::Reconnect)), 1);
        assert_eq!(conn.last_close_reason(), Some("reset"));
        assert_eq!(
            conn.state(),
            ConnectionState::Reconnecting {
                delay: DEFAULT_RETRY_INTERVAL
            }
        );
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut timers = Timers::new();
        let mut conn = manager();
        conn.start(ms(0), &mut timers);
        conn.stop(&mut timers);
        conn.take_transitions();

        conn.on_transport_event(TransportEvent::opened(1), ms(5), &mut timers);
        conn.on_transport_event(TransportEvent::closed(1), ms(6), &mut timers);

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.take_transitions().is_empty());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_synchronous_failure_schedules_retry() {
        let mut timers = Timers::new();
        let mut conn = manager();
        conn.transport_mut().refuse = true;

        assert!(conn.start(ms(0), &mut timers));
        assert!(!conn.reconnect_state().is_connecting);
        assert!(conn.reconnect_state().pending_timer.is_some());
        assert_eq!(
            conn.take_transitions(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Failed,
                ConnectionState::Reconnecting {
                    delay: DEFAULT_RETRY_INTERVAL
                },
            ]
        );
    }

    #[test]
    fn test_send_requires_open_connection() {
        let mut timers = Timers::new();
        let mut conn = manager();

        let result = conn.send(&OutboundCommand::StartRecording, ms(0), &mut timers);
        assert_eq!(result, Err(ClientError::NotConnected));
        assert_eq!(conn.transport().connects.len(), 1);
        assert!(conn.transport().sent.is_empty());

        let attempt = conn.current_attempt();
        conn.on_transport_event(TransportEvent::opened(attempt), ms(1), &mut timers);
        conn.send(&OutboundCommand::StopRecording, ms(2), &mut timers)
            .unwrap();
        assert_eq!(conn.transport().sent, vec![r#"{"type":"stop_recording"}"#]);
    }

    #[test]
    fn test_stop_suppresses_reconnect() {
        let mut timers = Timers::new();
        let mut conn = manager();
        conn.start(ms(0), &mut timers);
        let attempt = conn.current_attempt();
        conn.on_transport_event(TransportEvent::opened(attempt), ms(1), &mut timers);

        conn.stop(&mut timers);
        assert!(timers.is_empty());
        assert!(conn.liveness_timer().is_none());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.transport().closes >= 1);
    }
}
