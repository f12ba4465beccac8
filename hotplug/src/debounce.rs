use std::time::{Duration, Instant};

/// Suppresses edges that arrive within a refractory window of the last
/// accepted one. Mechanical card contacts chatter on insertion; one accepted
/// edge arms the window and everything inside it is discarded.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            last_accepted: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Gate an edge against the wall clock.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Deterministic variant for callers that own timekeeping.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        if let Some(previous) = self.last_accepted {
            if now.duration_since(previous) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}
