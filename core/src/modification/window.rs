//! Rule-managed time spans: windows and tick counters

use std::time::{Duration, Instant};

use crate::runtime::PausableSpan;

/// A span that gates overrides and tooltips. `None` duration stays open
/// until closed.
#[derive(Debug, Clone)]
pub struct TimingWindow {
    span: PausableSpan,
    duration: Option<Duration>,
    closed: bool,
}

impl TimingWindow {
    pub fn open(now: Instant, duration: Option<Duration>) -> Self {
        Self {
            span: PausableSpan::new(now),
            duration,
            closed: false,
        }
    }

    pub fn opened_at(&self) -> Instant {
        self.span.started_at()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn is_paused(&self) -> bool {
        self.span.is_paused()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.span.elapsed(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.closed || self.duration.is_some_and(|d| self.span.elapsed(now) >= d)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        !self.is_expired(now)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn pause(&mut self, now: Instant) {
        self.span.pause(now);
    }

    pub fn resume(&mut self, now: Instant) {
        self.span.resume(now);
    }
}

/// Counts down whole ticks of running time.
#[derive(Debug, Clone)]
pub struct TickCounter {
    tick: Duration,
    total_ticks: u32,
    span: PausableSpan,
}

impl TickCounter {
    pub fn start(now: Instant, tick: Duration, total_ticks: u32) -> Self {
        Self {
            tick,
            total_ticks,
            span: PausableSpan::new(now),
        }
    }

    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    pub fn elapsed_ticks(&self, now: Instant) -> u32 {
        if self.tick.is_zero() {
            return self.total_ticks;
        }
        let ticks = self.span.elapsed(now).as_millis() / self.tick.as_millis().max(1);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    pub fn remaining_ticks(&self, now: Instant) -> u32 {
        self.total_ticks.saturating_sub(self.elapsed_ticks(now))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining_ticks(now) == 0
    }

    pub fn is_paused(&self) -> bool {
        self.span.is_paused()
    }

    pub fn pause(&mut self, now: Instant) {
        self.span.pause(now);
    }

    pub fn resume(&mut self, now: Instant) {
        self.span.resume(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_window_expires_net_of_pause() {
        let t0 = Instant::now();
        let mut window = TimingWindow::open(t0, Some(ms(1000)));
        window.pause(t0 + ms(400));
        assert!(window.is_active(t0 + ms(5000)));
        window.resume(t0 + ms(5000));
        assert!(window.is_active(t0 + ms(5599)));
        assert!(window.is_expired(t0 + ms(5600)));
    }

    #[test]
    fn test_open_ended_window_until_closed() {
        let t0 = Instant::now();
        let mut window = TimingWindow::open(t0, None);
        assert!(window.is_active(t0 + ms(3_600_000)));
        window.close();
        assert!(window.is_expired(t0));
    }

    #[test]
    fn test_counter_counts_whole_ticks() {
        let t0 = Instant::now();
        let mut counter = TickCounter::start(t0, ms(600), 3);
        assert_eq!(counter.remaining_ticks(t0 + ms(599)), 3);
        assert_eq!(counter.remaining_ticks(t0 + ms(600)), 2);
        counter.pause(t0 + ms(1300));
        assert_eq!(counter.remaining_ticks(t0 + ms(9000)), 1);
        counter.resume(t0 + ms(9000));
        assert!(!counter.is_expired(t0 + ms(9499)));
        assert!(counter.is_expired(t0 + ms(9500)));
    }

    #[test]
    fn test_zero_tick_counter_is_expired() {
        let t0 = Instant::now();
        assert!(TickCounter::start(t0, ms(600), 0).is_expired(t0));
        assert!(TickCounter::start(t0, Duration::ZERO, 5).is_expired(t0));
    }
}
