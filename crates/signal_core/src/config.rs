use std::time::Duration;

use shared::domain::clamp_configured_seconds;

pub const DEFAULT_GREEN_SECONDS: u32 = 8;
pub const DEFAULT_SECOND_MILLIS: u64 = 1000;
const DEFAULT_COMMAND_CAPACITY: usize = 16;
const DEFAULT_EVENT_CAPACITY: usize = 64;
const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// Wall-clock length of the simulated units a timer waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub second: Duration,
}

impl CycleTiming {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            second: Duration::from_millis(millis.max(1)),
        }
    }

    /// One green tick.
    pub fn tick(&self) -> Duration {
        self.second
    }

    /// Half of a yellow blink unit (lit or unlit).
    pub fn blink_half(&self) -> Duration {
        self.second / 2
    }
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::from_millis(DEFAULT_SECOND_MILLIS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectionConfig {
    pub green_secs: u32,
    pub timing: CycleTiming,
    pub command_capacity: usize,
    pub event_capacity: usize,
    pub notice_capacity: usize,
}

impl IntersectionConfig {
    pub fn with_green_secs(mut self, secs: u32) -> Self {
        self.green_secs = clamp_configured_seconds(secs);
        self
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            green_secs: DEFAULT_GREEN_SECONDS,
            timing: CycleTiming::default(),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
        }
    }
}
