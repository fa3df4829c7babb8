use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub const DEFAULT_STALENESS_WINDOW_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionRejected {
    #[error("action from {origin} is not newer than last processed {last_processed}")]
    Duplicate {
        origin: DateTime<Utc>,
        last_processed: DateTime<Utc>,
    },
    #[error("action is {age_ms}ms old, past the staleness window")]
    Stale { age_ms: i64 },
    #[error("action is {ahead_ms}ms ahead of the authority clock")]
    Future { ahead_ms: i64 },
}

/// Accepts each follower action at most once and never late.
#[derive(Debug, Clone)]
pub struct ActionGate {
    last_processed: Option<DateTime<Utc>>,
    window: Duration,
}

impl Default for ActionGate {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_STALENESS_WINDOW_MS))
    }
}

impl ActionGate {
    pub fn new(window: Duration) -> Self {
        Self {
            last_processed: None,
            window,
        }
    }

    pub fn last_processed(&self) -> Option<DateTime<Utc>> {
        self.last_processed
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records `origin` as processed when the action is admitted; a rejected
    /// action leaves the gate untouched. Origins more than one window ahead
    /// of `now` are refused so a skewed clock cannot lock out later actions.
    pub fn admit(&mut self, origin: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ActionRejected> {
        let ahead = origin - now;
        if ahead > self.window {
            return Err(ActionRejected::Future {
                ahead_ms: ahead.num_milliseconds(),
            });
        }
        if let Some(last_processed) = self.last_processed {
            if origin <= last_processed {
                return Err(ActionRejected::Duplicate {
                    origin,
                    last_processed,
                });
            }
        }
        let age = now - origin;
        if age > self.window {
            return Err(ActionRejected::Stale {
                age_ms: age.num_milliseconds(),
            });
        }
        self.last_processed = Some(origin);
        Ok(())
    }
}
