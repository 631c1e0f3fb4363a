use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LaneId, LANE_COUNT};

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("lane {0} is out of range (expected 0..{max})", max = LANE_COUNT)]
    InvalidLane(usize),
    #[error("timer for lane {lane} is no longer accepting commands")]
    LaneUnavailable { lane: LaneId },
    #[error("command queue for lane {lane} is full")]
    LaneBacklogged { lane: LaneId },
    #[error("coordinator has shut down")]
    CoordinatorClosed,
    #[error("timer for lane {lane} faulted: {message}")]
    ActorFault { lane: LaneId, message: String },
}

/// A fault attributed to one lane, kept for operator display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneFault {
    pub lane: LaneId,
    pub message: String,
}

impl LaneFault {
    pub fn new(lane: LaneId, message: impl Into<String>) -> Self {
        Self {
            lane,
            message: message.into(),
        }
    }
}

impl From<LaneFault> for SignalError {
    fn from(value: LaneFault) -> Self {
        SignalError::ActorFault {
            lane: value.lane,
            message: value.message,
        }
    }
}

impl SignalError {
    /// The lane-level fault this error represents, if it concerns a lane.
    pub fn lane_fault(&self) -> Option<LaneFault> {
        match self {
            SignalError::LaneUnavailable { lane } | SignalError::LaneBacklogged { lane } => {
                Some(LaneFault::new(*lane, self.to_string()))
            }
            SignalError::ActorFault { lane, message } => Some(LaneFault::new(*lane, message.clone())),
            SignalError::InvalidLane(_) | SignalError::CoordinatorClosed => None,
        }
    }
}
