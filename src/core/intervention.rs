//! Guided breathing sessions.
//!
//! A session cycles through inhale, hold, exhale and pause until it is
//! closed, either automatically after a random 15-20 s or by the user.
//! Every session gets a fresh id; its timers carry that id so a timer left
//! over from an ended session is recognised and ignored.

use crate::core::scheduler::{TimerId, TimerKind, Timers};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::time::Duration;

/// Lower bound (inclusive) of the auto-close delay.
pub const AUTO_CLOSE_MIN: Duration = Duration::from_secs(15);

/// Upper bound (exclusive) of the auto-close delay.
pub const AUTO_CLOSE_MAX: Duration = Duration::from_secs(20);

/// How long an encouraging message stays on screen.
pub const ENCOURAGEMENT_DISPLAY: Duration = Duration::from_secs(5);

/// Shown after a session ends on its own.
pub const ENCOURAGING_MESSAGES: [&str; 6] = [
    "Nice work. You took a moment for yourself.",
    "Well done. Your breathing is steadier now.",
    "Great job staying with it.",
    "That's the way. Carry this calm with you.",
    "You did it. Feel the difference?",
    "Good reset. Back to it when you're ready.",
];

/// Phase of the breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreathPhase {
    Inhale,
    Hold,
    Exhale,
    Pause,
}

impl BreathPhase {
    pub fn duration(&self) -> Duration {
        match self {
            BreathPhase::Inhale | BreathPhase::Exhale => Duration::from_secs(4),
            BreathPhase::Hold | BreathPhase::Pause => Duration::from_secs(2),
        }
    }

    pub fn next(&self) -> Self {
        match self {
            BreathPhase::Inhale => BreathPhase::Hold,
            BreathPhase::Hold => BreathPhase::Exhale,
            BreathPhase::Exhale => BreathPhase::Pause,
            BreathPhase::Pause => BreathPhase::Inhale,
        }
    }

    /// Prompt shown to the user during this phase.
    pub fn instruction(&self) -> &'static str {
        match self {
            BreathPhase::Inhale => "Breathe in",
            BreathPhase::Hold => "Hold",
            BreathPhase::Exhale => "Breathe out",
            BreathPhase::Pause => "Rest",
        }
    }
}

impl std::fmt::Display for BreathPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BreathPhase::Inhale => "inhale",
            BreathPhase::Hold => "hold",
            BreathPhase::Exhale => "exhale",
            BreathPhase::Pause => "pause",
        };
        write!(f, "{name}")
    }
}

/// A live breathing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterventionSession {
    pub id: u64,
    pub phase: BreathPhase,
    /// Starts at 1, bumped each time the cycle returns to inhale
    pub cycle_count: u32,
    pub started_at: Duration,
    pub manually_closed: bool,
    /// Drawn once per session from [AUTO_CLOSE_MIN, AUTO_CLOSE_MAX)
    pub auto_close_after: Duration,
    phase_timer: Option<TimerId>,
    auto_close_timer: Option<TimerId>,
}

impl InterventionSession {
    pub fn phase_timer(&self) -> Option<TimerId> {
        self.phase_timer
    }

    pub fn auto_close_timer(&self) -> Option<TimerId> {
        self.auto_close_timer
    }

    fn cancel_timers(&mut self, timers: &mut Timers) {
        if let Some(id) = self.phase_timer.take() {
            timers.cancel(id);
        }
        if let Some(id) = self.auto_close_timer.take() {
            timers.cancel(id);
        }
    }
}

/// A displayed encouraging message awaiting removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encouragement {
    pub message: &'static str,
    pub token: u64,
    clear_timer: Option<TimerId>,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    AutoClosed,
    Dismissed,
    /// The client was stopped
    TornDown,
}

/// Result of an auto-close firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoClose {
    pub session: InterventionSession,
    pub message: &'static str,
}

/// Runs at most one breathing session at a time.
#[derive(Debug, Default)]
pub struct InterventionController {
    session: Option<InterventionSession>,
    encouragement: Option<Encouragement>,
    next_session: u64,
    next_token: u64,
}

impl InterventionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&InterventionSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn encouragement(&self) -> Option<&Encouragement> {
        self.encouragement.as_ref()
    }

    /// Open a session, arming its phase and auto-close timers.
    ///
    /// Returns the new session id, or `None` if a session is already live.
    pub fn begin(
        &mut self,
        now: Duration,
        timers: &mut Timers,
        rng: &mut dyn RngCore,
    ) -> Option<u64> {
        if let Some(live) = &self.session {
            tracing::debug!(session = live.id, "session already live, trigger ignored");
            return None;
        }

        self.next_session += 1;
        let id = self.next_session;

        let min = AUTO_CLOSE_MIN.as_millis() as u64;
        let max = AUTO_CLOSE_MAX.as_millis() as u64;
        let auto_close_after = Duration::from_millis(rng.gen_range(min..max));

        let phase = BreathPhase::Inhale;
        let phase_timer = timers.schedule(
            now,
            phase.duration(),
            TimerKind::PhaseAdvance { session: id },
        );
        let auto_close_timer =
            timers.schedule(now, auto_close_after, TimerKind::AutoClose { session: id });

        self.session = Some(InterventionSession {
            id,
            phase,
            cycle_count: 1,
            started_at: now,
            manually_closed: false,
            auto_close_after,
            phase_timer: Some(phase_timer),
            auto_close_timer: Some(auto_close_timer),
        });

        tracing::info!(
            session = id,
            auto_close_ms = auto_close_after.as_millis() as u64,
            "breathing session started"
        );
        Some(id)
    }

    /// Advance to the next phase. Returns the new phase and cycle count.
    pub fn on_phase_timer(
        &mut self,
        id: TimerId,
        session_id: u64,
        now: Duration,
        timers: &mut Timers,
    ) -> Option<(BreathPhase, u32)> {
        let session = self.session.as_mut()?;
        if session.id != session_id || session.phase_timer != Some(id) {
            return None;
        }

        session.phase = session.phase.next();
        if session.phase == BreathPhase::Inhale {
            session.cycle_count += 1;
        }
        session.phase_timer = Some(timers.schedule(
            now,
            session.phase.duration(),
            TimerKind::PhaseAdvance { session: session_id },
        ));

        tracing::debug!(
            session = session_id,
            phase = %session.phase,
            cycle = session.cycle_count,
            "breathing phase advanced"
        );
        Some((session.phase, session.cycle_count))
    }

    /// End the session on its auto-close timer and display an encouraging
    /// message for [`ENCOURAGEMENT_DISPLAY`].
    pub fn on_auto_close(
        &mut self,
        id: TimerId,
        session_id: u64,
        now: Duration,
        timers: &mut Timers,
        rng: &mut dyn RngCore,
    ) -> Option<AutoClose> {
        let live = self.session.as_ref()?;
        if live.id != session_id || live.auto_close_timer != Some(id) || live.manually_closed {
            return None;
        }

        let mut session = self.session.take()?;
        session.auto_close_timer = None;
        session.cancel_timers(timers);

        let message = ENCOURAGING_MESSAGES
            .choose(rng)
            .copied()
            .unwrap_or(ENCOURAGING_MESSAGES[0]);
        self.show_encouragement(message, now, timers);

        tracing::info!(
            session = session.id,
            cycles = session.cycle_count,
            "breathing session auto-closed"
        );
        Some(AutoClose { session, message })
    }

    /// Dismiss the live session. Returns the ended session.
    pub fn close_manually(&mut self, timers: &mut Timers) -> Option<InterventionSession> {
        let mut session = self.session.take()?;
        session.manually_closed = true;
        session.cancel_timers(timers);

        tracing::info!(session = session.id, "breathing session dismissed");
        Some(session)
    }

    /// Cancel every timer this controller owns, ending any live session.
    pub fn teardown(&mut self, timers: &mut Timers) -> Option<InterventionSession> {
        if let Some(encouragement) = self.encouragement.take() {
            if let Some(id) = encouragement.clear_timer {
                timers.cancel(id);
            }
        }

        let mut session = self.session.take()?;
        session.cancel_timers(timers);
        tracing::debug!(session = session.id, "breathing session torn down");
        Some(session)
    }

    /// Remove the displayed message. Returns false for a stale timer.
    pub fn on_clear_encouragement(&mut self, id: TimerId, token: u64) -> bool {
        match &self.encouragement {
            Some(shown) if shown.token == token && shown.clear_timer == Some(id) => {
                self.encouragement = None;
                true
            }
            _ => false,
        }
    }

    fn show_encouragement(&mut self, message: &'static str, now: Duration, timers: &mut Timers) {
        if let Some(previous) = self.encouragement.take() {
            if let Some(id) = previous.clear_timer {
                timers.cancel(id);
            }
        }

        self.next_token += 1;
        let token = self.next_token;
        let clear_timer = timers.schedule(
            now,
            ENCOURAGEMENT_DISPLAY,
            TimerKind::ClearEncouragement { token },
        );
        self.encouragement = Some(Encouragement {
            message,
            token,
            clear_timer: Some(clear_timer),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_phase_cycle() {
        let mut phase = BreathPhase::Inhale;
        let mut total = Duration::ZERO;
        for _ in 0..4 {
            total += phase.duration();
            phase = phase.next();
        }
        assert_eq!(phase, BreathPhase::Inhale);
        assert_eq!(total, secs(12));
    }

    #[test]
    fn test_begin_arms_two_timers() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(7);
        let mut controller = InterventionController::new();

        let id = controller.begin(secs(0), &mut timers, &mut rng).unwrap();
        let session = controller.session().unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.phase, BreathPhase::Inhale);
        assert_eq!(session.cycle_count, 1);
        assert!(!session.manually_closed);
        assert!(session.auto_close_after >= AUTO_CLOSE_MIN);
        assert!(session.auto_close_after < AUTO_CLOSE_MAX);

        assert_eq!(timers.pending(|k| matches!(k, TimerKind::PhaseAdvance { .. })), 1);
        assert_eq!(timers.pending(|k| matches!(k, TimerKind::AutoClose { .. })), 1);

        assert!(controller.begin(secs(1), &mut timers, &mut rng).is_none());
        assert_eq!(timers.len(), 2);
    }

    #[test]
    fn test_phase_advance_reaches_cycle_two() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut controller = InterventionController::new();
        let session = controller.begin(secs(0), &mut timers, &mut rng).unwrap();

        let mut last = None;
        while let Some(fired) = timers.pop_due(secs(12)) {
            if let TimerKind::PhaseAdvance { session: s } = fired.kind {
                last = controller.on_phase_timer(fired.id, s, fired.deadline, &mut timers);
            }
        }

        assert_eq!(last, Some((BreathPhase::Inhale, 2)));
        assert_eq!(controller.session().unwrap().id, session);
        assert_eq!(timers.pending(|k| matches!(k, TimerKind::PhaseAdvance { .. })), 1);
    }

    #[test]
    fn test_manual_close_cancels_timers() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut controller = InterventionController::new();
        controller.begin(secs(0), &mut timers, &mut rng);

        let ended = controller.close_manually(&mut timers).unwrap();
        assert!(ended.manually_closed);
        assert!(ended.phase_timer().is_none());
        assert!(ended.auto_close_timer().is_none());
        assert!(timers.is_empty());
        assert!(controller.encouragement().is_none());
        assert!(controller.close_manually(&mut timers).is_none());
    }

    #[test]
    fn test_auto_close_shows_message() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut controller = InterventionController::new();
        controller.begin(secs(0), &mut timers, &mut rng);

        let mut closed = None;
        while let Some(fired) = timers.pop_due(secs(20)) {
            match fired.kind {
                TimerKind::PhaseAdvance { session } => {
                    controller.on_phase_timer(fired.id, session, fired.deadline, &mut timers);
                }
                TimerKind::AutoClose { session } => {
                    closed = controller.on_auto_close(
                        fired.id,
                        session,
                        fired.deadline,
                        &mut timers,
                        &mut rng,
                    );
                }
                _ => {}
            }
        }

        let closed = closed.unwrap();
        assert!(ENCOURAGING_MESSAGES.contains(&closed.message));
        assert!(controller.session().is_none());
        assert_eq!(controller.encouragement().unwrap().message, closed.message);
        assert_eq!(timers.pending(|k| matches!(k, TimerKind::ClearEncouragement { .. })), 1);
        assert_eq!(timers.len(), 1);

        let fired = timers.pop_due(secs(60)).unwrap();
        assert_eq!(
            fired.deadline,
            closed.session.started_at + closed.session.auto_close_after + ENCOURAGEMENT_DISPLAY
        );
        let TimerKind::ClearEncouragement { token } = fired.kind else {
            panic!("expected clear timer, got {:?}", fired.kind);
        };
        assert!(controller.on_clear_encouragement(fired.id, token));
        assert!(controller.encouragement().is_none());
    }

    #[test]
    fn test_stale_session_timer_is_ignored() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(5);
        let mut controller = InterventionController::new();
        let first = controller.begin(secs(0), &mut timers, &mut rng).unwrap();
        let stale_phase = controller.session().unwrap().phase_timer().unwrap();
        controller.close_manually(&mut timers);

        let second = controller.begin(secs(1), &mut timers, &mut rng).unwrap();
        assert!(second > first);
        assert!(controller
            .on_phase_timer(stale_phase, first, secs(4), &mut timers)
            .is_none());
        assert_eq!(controller.session().unwrap().phase, BreathPhase::Inhale);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let mut timers = Timers::new();
        let mut rng = StdRng::seed_from_u64(9);
        let mut controller = InterventionController::new();
        controller.begin(secs(0), &mut timers, &mut rng);

        assert!(controller.teardown(&mut timers).is_some());
        assert!(timers.is_empty());
        assert!(controller.teardown(&mut timers).is_none());
    }
}
