use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Number of signal positions at the intersection.
pub const LANE_COUNT: usize = 4;

/// Shortest green the operator may configure, in seconds.
pub const MIN_CONFIGURED_SECONDS: u32 = 5;

/// Shortest green a timer will ever run, in seconds.
pub const MIN_CYCLE_SECONDS: u32 = 1;

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);
    };
}

id_newtype!(LaneId, usize);
id_newtype!(CycleTicket, u64);

impl LaneId {
    pub const FIRST: LaneId = LaneId(0);

    pub fn new(index: usize) -> Result<Self, SignalError> {
        if index < LANE_COUNT {
            Ok(Self(index))
        } else {
            Err(SignalError::InvalidLane(index))
        }
    }

    /// Next lane in clockwise order, wrapping back to lane 0.
    pub fn next(self) -> Self {
        Self((self.0 + 1) % LANE_COUNT)
    }

    pub fn all() -> impl Iterator<Item = LaneId> {
        (0..LANE_COUNT).map(LaneId)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CycleTicket {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for CycleTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One step of a lane's signal cycle, as reported by its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    Green {
        remaining: u32,
    },
    YellowBlink {
        remaining: u32,
        lit: bool,
    },
    Red,
}

impl Phase {
    /// Countdown value carried by the phase, if any.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Phase::Green { remaining } | Phase::YellowBlink { remaining, .. } => Some(*remaining),
            Phase::Red => None,
        }
    }

    pub fn is_red(&self) -> bool {
        matches!(self, Phase::Red)
    }
}

/// What an observer sees on a lane's signal head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "light", rename_all = "snake_case")]
pub enum LightReading {
    Red,
    Yellow { lit: bool },
    Green,
}

impl From<Phase> for LightReading {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Green { .. } => LightReading::Green,
            Phase::YellowBlink { lit, .. } => LightReading::Yellow { lit },
            Phase::Red => LightReading::Red,
        }
    }
}

impl fmt::Display for LightReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightReading::Red => f.write_str("red"),
            LightReading::Yellow { lit: true } => f.write_str("yellow"),
            LightReading::Yellow { lit: false } => f.write_str("yellow(off)"),
            LightReading::Green => f.write_str("green"),
        }
    }
}

/// Clamps an operator-supplied green duration to the configurable floor.
pub fn clamp_configured_seconds(seconds: u32) -> u32 {
    seconds.max(MIN_CONFIGURED_SECONDS)
}
