//! Timing and threshold knobs shared by every dispatch.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning parameters. Every field has a default, so a config only needs to
/// name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tuning {
    /// Wait after injecting, before checking the send button.
    pub settle_delay_ms: u64,
    /// Interval between response samples.
    pub poll_interval_ms: u64,
    /// Identical samples (after the first) needed to call a reply complete.
    pub stable_threshold: u32,
    /// Samples before giving up.
    pub max_attempts: u32,
    /// Emit a partial update every this many attempts while text changes.
    pub partial_every: u32,
    /// Timeout for a pre-navigation load.
    pub load_timeout_ms: u64,
    /// Wait after a pre-navigation load completes.
    pub post_load_delay_ms: u64,
    /// Wait after clicking a new-conversation control.
    pub new_chat_delay_ms: u64,
    /// Timeout for loading a freshly opened tab.
    pub open_timeout_ms: u64,
    /// Wait after a freshly opened tab has loaded.
    pub open_settle_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1500,
            poll_interval_ms: 1000,
            stable_threshold: 4,
            max_attempts: 60,
            partial_every: 3,
            load_timeout_ms: 10_000,
            post_load_delay_ms: 1000,
            new_chat_delay_ms: 1500,
            open_timeout_ms: 25_000,
            open_settle_ms: 3000,
        }
    }
}

impl Tuning {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn post_load_delay(&self) -> Duration {
        Duration::from_millis(self.post_load_delay_ms)
    }

    pub fn new_chat_delay(&self) -> Duration {
        Duration::from_millis(self.new_chat_delay_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    /// Reject values that would make polling meaningless.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let counts = [
            ("stable_threshold", self.stable_threshold as u64),
            ("max_attempts", self.max_attempts as u64),
            ("partial_every", self.partial_every as u64),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(format!("tuning.{} must be at least 1", name));
            }
        }
        Ok(())
    }
}
