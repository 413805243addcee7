//! Startup silence window
//!
//! The gateway may replay a burst of stale event files while both processes
//! boot. Events that arrive before the window has elapsed are discarded.

use std::time::{Duration, Instant};

/// Process start time plus the silence window. Copied into the watcher at
/// construction, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct StartupGuard {
    started: Instant,
    window: Duration,
}

impl StartupGuard {
    /// Start the window now
    pub fn new(window: Duration) -> Self {
        Self::starting_at(Instant::now(), window)
    }

    pub fn starting_at(started: Instant, window: Duration) -> Self {
        Self { started, window }
    }

    /// A guard that never silences anything
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_silenced(&self) -> bool {
        self.is_silenced_at(Instant::now())
    }

    pub fn is_silenced_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) < self.window
    }
}
