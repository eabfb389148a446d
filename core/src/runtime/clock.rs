//! Pausable elapsed-time tracking shared by step timers, windows and counters

use std::time::{Duration, Instant};

/// Wall-clock span that can be paused. Paused time does not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PausableSpan {
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PausableSpan {
    pub fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Running time up to `now`, net of pauses.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    /// Start over at `at`, keeping the paused state.
    pub fn restart(&mut self, at: Instant) {
        let paused = self.is_paused();
        *self = Self::new(at);
        if paused {
            self.paused_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pause_excludes_time() {
        let t0 = Instant::now();
        let mut span = PausableSpan::new(t0);
        span.pause(t0 + ms(100));
        assert_eq!(span.elapsed(t0 + ms(500)), ms(100), "frozen while paused");
        span.resume(t0 + ms(600));
        assert_eq!(span.elapsed(t0 + ms(700)), ms(200));
    }

    #[test]
    fn test_double_pause_and_resume_are_idempotent() {
        let t0 = Instant::now();
        let mut span = PausableSpan::new(t0);
        span.pause(t0 + ms(10));
        span.pause(t0 + ms(50));
        span.resume(t0 + ms(60));
        span.resume(t0 + ms(90));
        assert_eq!(span.elapsed(t0 + ms(100)), ms(50));
    }

    #[test]
    fn test_restart_keeps_pause() {
        let t0 = Instant::now();
        let mut span = PausableSpan::new(t0);
        span.pause(t0 + ms(10));
        span.restart(t0 + ms(20));
        assert!(span.is_paused());
        assert_eq!(span.elapsed(t0 + ms(80)), Duration::ZERO);
    }

    #[test]
    fn test_time_before_start_is_zero() {
        let t0 = Instant::now();
        let span = PausableSpan::new(t0 + ms(100));
        assert_eq!(span.elapsed(t0), Duration::ZERO);
    }
}
