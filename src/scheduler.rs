use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(300);

/// Timer-gated gate that folds a burst of triggers into a single emission.
///
/// Every `trigger` pushes the deadline out to `now + window`; `take_ready`
/// reports `true` once the burst has been quiet for a full window and then
/// disarms until the next trigger. Callers pass the clock in so the event loop
/// and tests share one notion of time.
#[derive(Debug, Clone)]
pub struct Coalescer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn take_ready(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// How long the event loop may sleep before the next emission is due.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
