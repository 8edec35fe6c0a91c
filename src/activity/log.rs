//! Persistent activity counters.
//!
//! Counters are lock-free so the log can be shared between the event loop
//! and whatever reports on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current and previous runs.
#[derive(Debug)]
pub struct ActivityLog {
    /// Inbound frames handed to the router
    frames_received: AtomicU64,
    /// Frames dropped because they could not be decoded
    decode_failures: AtomicU64,
    connection_attempts: AtomicU64,
    reconnects_scheduled: AtomicU64,
    sessions_started: AtomicU64,
    sessions_auto_closed: AtomicU64,
    sessions_dismissed: AtomicU64,
    notifications_sent: AtomicU64,
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_auto_closed: AtomicU64::new(0),
            sessions_dismissed: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous activity stats");
        }

        log
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_auto_closed(&self) {
        self.sessions_auto_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_dismissed(&self) {
        self.sessions_dismissed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_auto_closed: self.sessions_auto_closed.load(Ordering::Relaxed),
            sessions_dismissed: self.sessions_dismissed.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Activity:\n\
             - Frames received: {}\n\
             - Frames dropped (undecodable): {}\n\
             - Connection attempts: {}\n\
             - Reconnects scheduled: {}\n\
             \n\
             Breathing sessions:\n\
             - Started: {}\n\
             - Completed automatically: {}\n\
             - Dismissed: {}\n\
             - System notifications sent: {}\n\
             \n\
             Session duration: {} seconds",
            stats.frames_received,
            stats.decode_failures,
            stats.connection_attempts,
            stats.reconnects_scheduled,
            stats.sessions_started,
            stats.sessions_auto_closed,
            stats.sessions_dismissed,
            stats.notifications_sent,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk. No-op without a persistence path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_received: stats.frames_received,
                decode_failures: stats.decode_failures,
                connection_attempts: stats.connection_attempts,
                reconnects_scheduled: stats.reconnects_scheduled,
                sessions_started: stats.sessions_started,
                sessions_auto_closed: stats.sessions_auto_closed,
                sessions_dismissed: stats.sessions_dismissed,
                notifications_sent: stats.notifications_sent,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_received
                    .store(persisted.frames_received, Ordering::Relaxed);
                self.decode_failures
                    .store(persisted.decode_failures, Ordering::Relaxed);
                self.connection_attempts
                    .store(persisted.connection_attempts, Ordering::Relaxed);
                self.reconnects_scheduled
                    .store(persisted.reconnects_scheduled, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.sessions_auto_closed
                    .store(persisted.sessions_auto_closed, Ordering::Relaxed);
                self.sessions_dismissed
                    .store(persisted.sessions_dismissed, Ordering::Relaxed);
                self.notifications_sent
                    .store(persisted.notifications_sent, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.decode_failures,
            &self.connection_attempts,
            &self.reconnects_scheduled,
            &self.sessions_started,
            &self.sessions_auto_closed,
            &self.sessions_dismissed,
            &self.notifications_sent,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStats {
    pub frames_received: u64,
    pub decode_failures: u64,
    pub connection_attempts: u64,
    pub reconnects_scheduled: u64,
    pub sessions_started: u64,
    pub sessions_auto_closed: u64,
    pub sessions_dismissed: u64,
    pub notifications_sent: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    frames_received: u64,
    #[serde(default)]
    decode_failures: u64,
    #[serde(default)]
    connection_attempts: u64,
    #[serde(default)]
    reconnects_scheduled: u64,
    #[serde(default)]
    sessions_started: u64,
    #[serde(default)]
    sessions_auto_closed: u64,
    #[serde(default)]
    sessions_dismissed: u64,
    #[serde(default)]
    notifications_sent: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_log_counting() {
        let log = ActivityLog::new();

        log.record_frame();
        log.record_frame();
        log.record_decode_failure();
        log.record_session_started();

        let stats = log.stats();
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.sessions_dismissed, 0);
    }

    #[test]
    fn test_activity_log_reset() {
        let log = ActivityLog::new();

        log.record_connection_attempt();
        log.record_reconnect_scheduled();
        log.record_notification_sent();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.connection_attempts, 0);
        assert_eq!(stats.reconnects_scheduled, 0);
        assert_eq!(stats.notifications_sent, 0);
    }

    #[test]
    fn test_summary_format() {
        let log = ActivityLog::new();
        let summary = log.summary();

        assert!(summary.contains("Frames received"));
        assert!(summary.contains("Reconnects scheduled"));
        assert!(summary.contains("Breathing sessions"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "calmwave-activity-{}-{}.json",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let log = ActivityLog::with_persistence(path.clone());
        log.record_frame();
        log.record_session_auto_closed();
        log.save().unwrap();

        let restored = ActivityLog::with_persistence(path.clone());
        let stats = restored.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.sessions_auto_closed, 1);

        let _ = std::fs::remove_file(path);
    }
}
