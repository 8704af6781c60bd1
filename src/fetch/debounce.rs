//! Debounce with a maximum wait, driven by explicit instants

use std::time::{Duration, Instant};

/// Coalesces a burst of signals into one firing.
///
/// Fires `wait` after the last signal, or `max_wait` after the first signal
/// of the burst, whichever comes first.
#[derive(Debug, Clone)]
pub struct Debouncer {
    wait: Duration,
    max_wait: Duration,
    first: Option<Instant>,
    last: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer. `max_wait` is raised to `wait` if smaller.
    pub fn new(wait: Duration, max_wait: Duration) -> Self {
        Self {
            wait,
            max_wait: max_wait.max(wait),
            first: None,
            last: None,
        }
    }

    /// Record a signal.
    pub fn signal(&mut self, now: Instant) {
        self.first.get_or_insert(now);
        self.last = Some(now);
    }

    /// Returns true once per burst, when the burst is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        let (Some(first), Some(last)) = (self.first, self.last) else {
            return false;
        };
        let due = now.saturating_duration_since(last) >= self.wait
            || now.saturating_duration_since(first) >= self.max_wait;
        if due {
            self.cancel();
        }
        due
    }

    /// True while a burst is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.first.is_some()
    }

    /// Earliest instant at which [`poll`](Self::poll) will fire.
    pub fn deadline(&self) -> Option<Instant> {
        let (first, last) = (self.first?, self.last?);
        Some((last + self.wait).min(first + self.max_wait))
    }

    /// Drop any pending burst.
    pub fn cancel(&mut self) {
        self.first = None;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn idle_debouncer_never_fires() {
        let mut d = Debouncer::new(ms(50), ms(100));
        assert!(!d.poll(Instant::now()));
        assert!(!d.is_pending());
    }

    #[test]
    fn fires_after_quiet_period() {
        let mut d = Debouncer::new(ms(50), ms(100));
        let t0 = Instant::now();
        d.signal(t0);
        assert!(!d.poll(t0 + ms(30)));
        assert!(d.poll(t0 + ms(50)));
        assert!(!d.poll(t0 + ms(60)));
    }

    #[test]
    fn continuous_signals_fire_at_max_wait() {
        let mut d = Debouncer::new(ms(50), ms(100));
        let t0 = Instant::now();
        for step in 0..5 {
            d.signal(t0 + ms(step * 20));
        }
        assert!(!d.poll(t0 + ms(90)));
        assert!(d.poll(t0 + ms(100)));
    }

    #[test]
    fn deadline_is_min_of_both_timers() {
        let mut d = Debouncer::new(ms(75), ms(1000));
        let t0 = Instant::now();
        d.signal(t0);
        d.signal(t0 + ms(10));
        assert_eq!(d.deadline(), Some(t0 + ms(85)));
    }

    #[test]
    fn max_wait_is_at_least_wait() {
        let mut d = Debouncer::new(ms(50), ms(10));
        let t0 = Instant::now();
        d.signal(t0);
        assert!(!d.poll(t0 + ms(20)));
        assert!(d.poll(t0 + ms(50)));
    }
}
