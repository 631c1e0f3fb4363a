//! The fixed green → blinking-yellow → red schedule one lane runs per start.

use std::time::Duration;

use shared::domain::{Phase, MIN_CYCLE_SECONDS};

use crate::config::CycleTiming;

/// Green ticks stop once this many seconds remain; yellow takes over from there.
const YELLOW_HANDOVER_SECS: u32 = 2;
const BLINK_UNITS: u32 = 2;

/// One emission plus how long the timer waits before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    pub phase: Phase,
    pub hold: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Green { remaining: u32 },
    Yellow { remaining: u32, lit: bool },
    Red,
    Done,
}

/// Iterator over the beats of a single cycle.
///
/// The green leg is configurable and may be shorter than the yellow leg; the
/// yellow leg always runs `BLINK_UNITS` full lit/unlit units.
#[derive(Debug, Clone)]
pub struct Cycle {
    timing: CycleTiming,
    step: Step,
}

impl Cycle {
    pub fn new(duration_secs: u32, timing: CycleTiming) -> Self {
        Self {
            timing,
            step: Step::Green {
                remaining: duration_secs.max(MIN_CYCLE_SECONDS),
            },
        }
    }

    /// Total time from the first emission to the red emission.
    pub fn total_hold(&self) -> Duration {
        self.clone().map(|beat| beat.hold).sum()
    }
}

impl Iterator for Cycle {
    type Item = Beat;

    fn next(&mut self) -> Option<Beat> {
        let (phase, hold, next) = match self.step {
            Step::Green { remaining } if remaining > YELLOW_HANDOVER_SECS => (
                Phase::Green { remaining },
                self.timing.tick(),
                Step::Green {
                    remaining: remaining - 1,
                },
            ),
            Step::Green { remaining } => (
                Phase::Green { remaining },
                Duration::ZERO,
                Step::Yellow {
                    remaining: BLINK_UNITS,
                    lit: true,
                },
            ),
            Step::Yellow { remaining, lit } => {
                let next = if lit {
                    Step::Yellow {
                        remaining,
                        lit: false,
                    }
                } else if remaining > 1 {
                    Step::Yellow {
                        remaining: remaining - 1,
                        lit: true,
                    }
                } else {
                    Step::Red
                };
                (
                    Phase::YellowBlink { remaining, lit },
                    self.timing.blink_half(),
                    next,
                )
            }
            Step::Red => (Phase::Red, Duration::ZERO, Step::Done),
            Step::Done => return None,
        };
        self.step = next;
        Some(Beat { phase, hold })
    }
}

#[cfg(test)]
#[path = "tests/cycle_tests.rs"]
mod tests;
