use chrono::{DateTime, Utc};
use shared::protocol::TimerPulse;

/// Smooth elapsed-time clock for presenter and display surfaces. Pulses set
/// the base; between pulses the value is extrapolated from the local clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerFeed {
    base_elapsed: f64,
    base_at: Option<DateTime<Utc>>,
    running: bool,
}

impl TimerFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pulse(&mut self, pulse: TimerPulse, now: DateTime<Utc>) {
        self.base_elapsed = pulse.elapsed_seconds;
        self.base_at = Some(now);
        self.running = pulse.is_running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frozen at the last pulse unless the authority reported the clock running.
    pub fn elapsed(&self, now: DateTime<Utc>) -> f64 {
        match (self.running, self.base_at) {
            (true, Some(base_at)) => {
                let since = (now - base_at).num_milliseconds().max(0) as f64 / 1000.0;
                self.base_elapsed + since
            }
            _ => self.base_elapsed,
        }
    }
}
