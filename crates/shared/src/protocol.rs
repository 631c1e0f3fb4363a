use serde::{Deserialize, Serialize};

use crate::{
    domain::{CycleTicket, LaneId, LightReading, Phase, LANE_COUNT},
    error::LaneFault,
};

/// Commands the coordinator sends to a single lane timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LaneCommand {
    StartGreen {
        duration_secs: u32,
        ticket: CycleTicket,
    },
    ForceRed,
    Stop,
}

impl LaneCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LaneCommand::StartGreen { .. } => "start_green",
            LaneCommand::ForceRed => "force_red",
            LaneCommand::Stop => "stop",
        }
    }
}

/// Events a lane timer reports back to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaneEvent {
    Phase {
        lane: LaneId,
        #[serde(flatten)]
        phase: Phase,
    },
    Completed {
        lane: LaneId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cycle: Option<CycleTicket>,
    },
    Error {
        lane: LaneId,
        message: String,
    },
}

impl LaneEvent {
    pub fn lane(&self) -> LaneId {
        match self {
            LaneEvent::Phase { lane, .. }
            | LaneEvent::Completed { lane, .. }
            | LaneEvent::Error { lane, .. } => *lane,
        }
    }
}

/// Point-in-time view of the intersection for an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionSnapshot {
    pub running: bool,
    pub active_lane: LaneId,
    pub configured_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_secs: Option<u32>,
    pub countdown: u32,
    pub lanes: [LightReading; LANE_COUNT],
    pub handoffs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fault: Option<LaneFault>,
}

impl IntersectionSnapshot {
    /// Idle intersection with lane 0 shown as the ready lane.
    pub fn idle(configured_secs: u32) -> Self {
        let mut lanes = [LightReading::Red; LANE_COUNT];
        lanes[LaneId::FIRST.index()] = LightReading::Green;
        Self {
            running: false,
            active_lane: LaneId::FIRST,
            configured_secs,
            pending_secs: None,
            countdown: configured_secs,
            lanes,
            handoffs: 0,
            last_fault: None,
        }
    }

    pub fn reading(&self, lane: LaneId) -> LightReading {
        self.lanes[lane.index()]
    }

    pub fn all_red(&self) -> bool {
        self.lanes.iter().all(|l| *l == LightReading::Red)
    }
}

/// Operator-facing notices broadcast by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notice {
    Started {
        lane: LaneId,
        duration_secs: u32,
    },
    Stopped,
    Handoff {
        from: LaneId,
        to: LaneId,
    },
    DurationChanged {
        secs: u32,
        deferred: bool,
    },
    Fault(LaneFault),
}
