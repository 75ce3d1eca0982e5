use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub chars_completed: usize,
    pub chars_expected_total: usize,
    /// Seconds spent typing; paused time is excluded.
    pub active_elapsed_seconds: f64,
    pub current_lap: u32,
    pub total_laps: u32,
}

impl ProgressSnapshot {
    pub fn chars_per_minute(&self) -> f64 {
        if self.active_elapsed_seconds <= 0.0 {
            return 0.0;
        }
        self.chars_completed as f64 / self.active_elapsed_seconds * 60.0
    }

    pub fn wpm(&self) -> f64 {
        self.chars_per_minute() / 5.0
    }

    /// Seconds remaining at the current rate; `None` until there is a rate.
    pub fn etr_seconds(&self) -> Option<f64> {
        let cpm = self.chars_per_minute();
        if cpm <= 0.0 {
            return None;
        }
        let remaining = self
            .chars_expected_total
            .saturating_sub(self.chars_completed) as f64;
        Some(remaining / cpm * 60.0)
    }

    pub fn fraction(&self) -> f64 {
        if self.chars_expected_total == 0 {
            return 1.0;
        }
        self.chars_completed as f64 / self.chars_expected_total as f64
    }
}

pub fn format_etr(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("ETR: {:02}:{:02}", total / 60, total % 60)
}

/// Counts emitted characters and active time for one run.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    completed: usize,
    expected_total: usize,
    current_lap: u32,
    total_laps: u32,
    started: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total: Duration,
    last_push: Option<Instant>,
    throttle: Duration,
}

impl ProgressTracker {
    pub fn new(expected_total: usize, total_laps: u32, throttle: Duration) -> Self {
        Self {
            completed: 0,
            expected_total,
            current_lap: 0,
            total_laps,
            started: None,
            paused_since: None,
            paused_total: Duration::ZERO,
            last_push: None,
            throttle,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started.get_or_insert(now);
    }

    pub fn set_lap(&mut self, lap: u32) {
        self.current_lap = lap;
    }

    /// Count `n` emitted characters, never past the expected total.
    pub fn advance(&mut self, n: usize) {
        self.completed = (self.completed + n).min(self.expected_total);
    }

    pub fn complete(&mut self) {
        self.completed = self.expected_total;
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }

    fn active_elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let mut paused = self.paused_total;
        if let Some(since) = self.paused_since {
            paused += now.saturating_duration_since(since);
        }
        now.saturating_duration_since(started).saturating_sub(paused)
    }

    pub fn snapshot(&self, now: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            chars_completed: self.completed,
            chars_expected_total: self.expected_total,
            active_elapsed_seconds: self.active_elapsed(now).as_secs_f64(),
            current_lap: self.current_lap,
            total_laps: self.total_laps,
        }
    }

    /// True at most once per throttle window.
    pub fn should_push(&mut self, now: Instant) -> bool {
        let due = self
            .last_push
            .map_or(true, |last| now.saturating_duration_since(last) >= self.throttle);
        if due {
            self.last_push = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_time_is_excluded() {
        let t0 = Instant::now();
        let mut p = ProgressTracker::new(100, 1, Duration::from_millis(50));
        p.start(t0);
        p.advance(10);
        p.pause(t0 + Duration::from_secs(2));
        p.resume(t0 + Duration::from_secs(10));
        let snap = p.snapshot(t0 + Duration::from_secs(12));
        assert!((snap.active_elapsed_seconds - 4.0).abs() < 1e-6);
        assert!((snap.chars_per_minute() - 150.0).abs() < 1e-6);
        assert!((snap.wpm() - 30.0).abs() < 1e-6);
        assert!((snap.etr_seconds().unwrap() - 36.0).abs() < 1e-6);
    }

    #[test]
    fn throttle_limits_pushes() {
        let t0 = Instant::now();
        let mut p = ProgressTracker::new(10, 1, Duration::from_millis(50));
        assert!(p.should_push(t0));
        assert!(!p.should_push(t0 + Duration::from_millis(10)));
        assert!(p.should_push(t0 + Duration::from_millis(60)));
    }

    #[test]
    fn advance_never_overshoots() {
        let mut p = ProgressTracker::new(3, 1, Duration::ZERO);
        p.advance(5);
        assert_eq!(p.completed(), 3);
    }

    #[test]
    fn etr_needs_a_rate() {
        let snap = ProgressSnapshot {
            chars_expected_total: 10,
            ..Default::default()
        };
        assert_eq!(snap.etr_seconds(), None);
        assert_eq!(format_etr(125.4), "ETR: 02:05");
    }
}
