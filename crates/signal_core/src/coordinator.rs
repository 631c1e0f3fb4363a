//! Single owner of the round-robin pointer and the lane display cache.
//!
//! Every mutation happens inside [`Coordinator::run`], one control message or
//! lane event at a time. Outbound lane commands never block: a full or closed
//! lane queue is recorded as a fault and the lane is left as it is. A force-red
//! that could not be queued at stop is retried on the next start, since the
//! lane would otherwise keep its old cycle and ignore the new green.

use shared::{
    domain::{clamp_configured_seconds, CycleTicket, LaneId, LightReading, Phase, LANE_COUNT},
    error::{LaneFault, SignalError},
    protocol::{IntersectionSnapshot, LaneCommand, LaneEvent, Notice},
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Result of a duration change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationUpdate {
    pub secs: u32,
    /// Set while running: the value is held until the next stop.
    pub deferred: bool,
}

pub(crate) enum Control {
    Start,
    Stop,
    SetDuration {
        secs: u32,
        reply: oneshot::Sender<DurationUpdate>,
    },
    Snapshot(oneshot::Sender<IntersectionSnapshot>),
    Shutdown,
}

pub struct Coordinator {
    lanes: Vec<mpsc::Sender<LaneCommand>>,
    running: bool,
    active: LaneId,
    configured_secs: u32,
    pending_secs: Option<u32>,
    display: [LightReading; LANE_COUNT],
    countdown: u32,
    issued: Option<CycleTicket>,
    unforced: [bool; LANE_COUNT],
    next_ticket: CycleTicket,
    handoffs: u64,
    last_fault: Option<LaneFault>,
    notices: broadcast::Sender<Notice>,
    snapshots: watch::Sender<IntersectionSnapshot>,
}

impl Coordinator {
    pub fn new(
        lanes: Vec<mpsc::Sender<LaneCommand>>,
        green_secs: u32,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        let configured_secs = clamp_configured_seconds(green_secs);
        let idle = IntersectionSnapshot::idle(configured_secs);
        let (snapshots, _) = watch::channel(idle.clone());
        Self {
            lanes,
            running: false,
            active: idle.active_lane,
            configured_secs,
            pending_secs: None,
            display: idle.lanes,
            countdown: idle.countdown,
            issued: None,
            unforced: [false; LANE_COUNT],
            next_ticket: CycleTicket(1),
            handoffs: 0,
            last_fault: None,
            notices,
            snapshots,
        }
    }

    pub fn watch(&self) -> watch::Receiver<IntersectionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn active_lane(&self) -> LaneId {
        self.active
    }

    pub fn snapshot(&self) -> IntersectionSnapshot {
        IntersectionSnapshot {
            running: self.running,
            active_lane: self.active,
            configured_secs: self.configured_secs,
            pending_secs: self.pending_secs,
            countdown: self.countdown,
            lanes: self.display,
            handoffs: self.handoffs,
            last_fault: self.last_fault.clone(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut control: mpsc::Receiver<Control>,
        mut events: mpsc::Receiver<LaneEvent>,
    ) {
        info!(
            lanes = self.lanes.len(),
            green_secs = self.configured_secs,
            "coordinator: ready"
        );
        loop {
            tokio::select! {
                biased;
                message = control.recv() => match message {
                    Some(Control::Shutdown) | None => {
                        self.shutdown_lanes();
                        break;
                    }
                    Some(message) => self.apply(message),
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("coordinator: every lane timer has exited");
                        break;
                    }
                },
            }
            self.publish();
        }
        self.publish();
        info!(handoffs = self.handoffs, "coordinator: stopped");
    }

    fn apply(&mut self, message: Control) {
        match message {
            Control::Start => self.start(),
            Control::Stop => self.stop(),
            Control::SetDuration { secs, reply } => {
                let _ = reply.send(self.set_duration(secs));
            }
            Control::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Control::Shutdown => self.shutdown_lanes(),
        }
    }

    pub fn start(&mut self) {
        if self.running {
            debug!("coordinator: start ignored, already running");
            return;
        }
        self.running = true;
        self.countdown = self.configured_secs;
        info!(
            lane = self.active.0,
            green_secs = self.configured_secs,
            "coordinator: rotation started"
        );
        let _ = self.notices.send(Notice::Started {
            lane: self.active,
            duration_secs: self.configured_secs,
        });
        for lane in LaneId::all() {
            if self.unforced[lane.index()] {
                debug!(lane = lane.0, "coordinator: retrying force-red");
                self.force_red(lane);
            }
        }
        self.issue_start(self.active);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.issued = None;
        for lane in LaneId::all() {
            self.force_red(lane);
        }
        self.display = [LightReading::Red; LANE_COUNT];
        self.countdown = 0;
        self.active = LaneId::FIRST;
        if let Some(secs) = self.pending_secs.take() {
            info!(green_secs = secs, "coordinator: deferred duration applied");
            self.configured_secs = secs;
        }
        info!("coordinator: rotation stopped, all lanes forced red");
        let _ = self.notices.send(Notice::Stopped);
    }

    pub fn set_duration(&mut self, secs: u32) -> DurationUpdate {
        let clamped = clamp_configured_seconds(secs);
        if clamped != secs {
            debug!(requested = secs, clamped, "coordinator: duration clamped");
        }
        let update = if self.running {
            self.pending_secs = Some(clamped);
            DurationUpdate {
                secs: clamped,
                deferred: true,
            }
        } else {
            self.configured_secs = clamped;
            self.pending_secs = None;
            DurationUpdate {
                secs: clamped,
                deferred: false,
            }
        };
        info!(
            green_secs = update.secs,
            deferred = update.deferred,
            "coordinator: duration set"
        );
        let _ = self.notices.send(Notice::DurationChanged {
            secs: update.secs,
            deferred: update.deferred,
        });
        update
    }

    pub fn handle_event(&mut self, event: LaneEvent) {
        match event {
            LaneEvent::Error { lane, message } => self.record_fault(LaneFault::new(lane, message)),
            LaneEvent::Phase { lane, phase } if !self.running => {
                if phase.is_red() {
                    self.show(lane, LightReading::Red);
                } else {
                    debug!(lane = lane.0, ?phase, "coordinator: stale phase dropped");
                }
            }
            LaneEvent::Completed { lane, cycle } if !self.running => {
                debug!(lane = lane.0, ?cycle, "coordinator: stale completion dropped");
            }
            LaneEvent::Phase { lane, phase } if lane != self.active && !phase.is_red() => {
                debug!(lane = lane.0, ?phase, "coordinator: phase from inactive lane dropped");
            }
            LaneEvent::Phase { lane, phase } => {
                self.show(lane, phase.into());
                if lane == self.active {
                    self.countdown = match phase {
                        Phase::Red => 0,
                        _ => phase.remaining().unwrap_or(self.configured_secs),
                    };
                }
            }
            LaneEvent::Completed { lane, cycle } => self.complete(lane, cycle),
        }
    }

    fn complete(&mut self, lane: LaneId, cycle: Option<CycleTicket>) {
        if lane != self.active || cycle.is_none() || cycle != self.issued {
            debug!(
                lane = lane.0,
                active = self.active.0,
                ?cycle,
                issued = ?self.issued,
                "coordinator: completion does not match active cycle"
            );
            return;
        }
        let next = lane.next();
        self.active = next;
        self.countdown = self.configured_secs;
        self.handoffs += 1;
        info!(from = lane.0, to = next.0, "coordinator: handoff");
        let _ = self.notices.send(Notice::Handoff {
            from: lane,
            to: next,
        });
        self.issue_start(next);
    }

    fn issue_start(&mut self, lane: LaneId) {
        let ticket = self.next_ticket;
        self.next_ticket = ticket.next();
        self.issued = Some(ticket);
        let _ = self.dispatch(
            lane,
            LaneCommand::StartGreen {
                duration_secs: self.configured_secs,
                ticket,
            },
        );
    }

    fn force_red(&mut self, lane: LaneId) {
        let delivered = self.dispatch(lane, LaneCommand::ForceRed).is_ok();
        if let Some(slot) = self.unforced.get_mut(lane.index()) {
            *slot = !delivered;
        }
    }

    fn show(&mut self, lane: LaneId, reading: LightReading) {
        match self.display.get_mut(lane.index()) {
            Some(slot) => *slot = reading,
            None => warn!(lane = lane.0, "coordinator: event for unknown lane"),
        }
    }

    fn dispatch(&mut self, lane: LaneId, command: LaneCommand) -> Result<(), SignalError> {
        let name = command.name();
        let result = match self.lanes.get(lane.index()) {
            Some(tx) => tx.try_send(command).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SignalError::LaneBacklogged { lane },
                mpsc::error::TrySendError::Closed(_) => SignalError::LaneUnavailable { lane },
            }),
            None => Err(SignalError::InvalidLane(lane.index())),
        };
        match &result {
            Ok(()) => debug!(lane = lane.0, command = name, "coordinator: queued lane command"),
            Err(err) => {
                warn!(lane = lane.0, command = name, %err, "coordinator: lane command not delivered");
                if let Some(fault) = err.lane_fault() {
                    self.record_fault(fault);
                }
            }
        }
        result
    }

    fn record_fault(&mut self, fault: LaneFault) {
        warn!(lane = fault.lane.0, reason = %fault.message, "coordinator: lane fault");
        let _ = self.notices.send(Notice::Fault(fault.clone()));
        self.last_fault = Some(fault);
    }

    fn shutdown_lanes(&mut self) {
        self.running = false;
        self.issued = None;
        for lane in LaneId::all() {
            let _ = self.dispatch(lane, LaneCommand::Stop);
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
