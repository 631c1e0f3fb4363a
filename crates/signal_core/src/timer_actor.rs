//! One timer task per lane. The task owns its cycle exclusively and reacts only
//! to commands addressed to its lane.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use shared::{
    domain::{CycleTicket, LaneId, Phase},
    error::SignalError,
    protocol::{LaneCommand, LaneEvent},
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, trace};

use crate::{config::CycleTiming, cycle::Cycle};

struct ActiveCycle {
    ticket: CycleTicket,
    beats: Cycle,
    emitted: usize,
    resume_at: Instant,
}

pub struct TimerActor {
    lane: LaneId,
    timing: CycleTiming,
    commands: mpsc::Receiver<LaneCommand>,
    events: mpsc::Sender<LaneEvent>,
    active: Option<ActiveCycle>,
    #[cfg(test)]
    fault_at_beat: Option<usize>,
}

impl TimerActor {
    pub fn new(
        lane: LaneId,
        timing: CycleTiming,
        commands: mpsc::Receiver<LaneCommand>,
        events: mpsc::Sender<LaneEvent>,
    ) -> Self {
        Self {
            lane,
            timing,
            commands,
            events,
            active: None,
            #[cfg(test)]
            fault_at_beat: None,
        }
    }

    /// Makes the next cycle panic before emitting the given beat.
    #[cfg(test)]
    pub(crate) fn fail_at_beat(mut self, beat: usize) -> Self {
        self.fault_at_beat = Some(beat);
        self
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Serves commands until the coordinator drops the command sender or stops
    /// listening for events.
    pub async fn run(&mut self) -> Result<(), SignalError> {
        loop {
            let resume_at = self.active.as_ref().map(|cycle| cycle.resume_at);
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await?,
                    None => {
                        debug!(lane = self.lane.0, "timer: command channel closed");
                        return Ok(());
                    }
                },
                () = sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() => {
                    self.resume().await?;
                }
            }
        }
    }

    async fn handle(&mut self, command: LaneCommand) -> Result<(), SignalError> {
        trace!(lane = self.lane.0, command = command.name(), "timer: command");
        match command {
            LaneCommand::StartGreen {
                duration_secs,
                ticket,
            } => {
                if let Some(current) = &self.active {
                    debug!(
                        lane = self.lane.0,
                        current = current.ticket.0,
                        ignored = ticket.0,
                        "timer: start ignored, cycle already in flight"
                    );
                    return Ok(());
                }
                self.active = Some(ActiveCycle {
                    ticket,
                    beats: Cycle::new(duration_secs, self.timing),
                    emitted: 0,
                    resume_at: Instant::now(),
                });
                self.resume().await
            }
            LaneCommand::ForceRed => {
                let aborted = self.abort();
                self.emit(LaneEvent::Phase {
                    lane: self.lane,
                    phase: Phase::Red,
                })
                .await?;
                self.emit(LaneEvent::Completed {
                    lane: self.lane,
                    cycle: aborted,
                })
                .await
            }
            LaneCommand::Stop => {
                self.abort();
                Ok(())
            }
        }
    }

    /// Drops the in-flight cycle so none of its remaining beats are emitted.
    fn abort(&mut self) -> Option<CycleTicket> {
        let aborted = self.active.take().map(|cycle| cycle.ticket);
        if let Some(ticket) = aborted {
            debug!(lane = self.lane.0, ticket = ticket.0, "timer: cycle aborted");
        }
        aborted
    }

    /// Emits beats until the next non-zero wait, or finishes the cycle.
    async fn resume(&mut self) -> Result<(), SignalError> {
        loop {
            let Some(cycle) = self.active.as_mut() else {
                return Ok(());
            };
            match cycle.beats.next() {
                Some(beat) => {
                    #[cfg(test)]
                    if self.fault_at_beat == Some(cycle.emitted) {
                        self.fault_at_beat = None;
                        panic!("lane {} faulted at beat {}", self.lane, cycle.emitted);
                    }
                    cycle.emitted += 1;
                    let resume_at = Instant::now() + beat.hold;
                    cycle.resume_at = resume_at;
                    self.emit(LaneEvent::Phase {
                        lane: self.lane,
                        phase: beat.phase,
                    })
                    .await?;
                    if !beat.hold.is_zero() {
                        return Ok(());
                    }
                }
                None => {
                    let ticket = cycle.ticket;
                    let beats = cycle.emitted;
                    self.active = None;
                    debug!(lane = self.lane.0, ticket = ticket.0, beats, "timer: cycle complete");
                    return self
                        .emit(LaneEvent::Completed {
                            lane: self.lane,
                            cycle: Some(ticket),
                        })
                        .await;
                }
            }
        }
    }

    async fn emit(&self, event: LaneEvent) -> Result<(), SignalError> {
        self.events
            .send(event)
            .await
            .map_err(|_| SignalError::CoordinatorClosed)
    }
}

/// Spawns a lane timer under a supervisor that reports panics as error events
/// and keeps the lane serving commands afterwards.
pub fn spawn_supervised(mut actor: TimerActor) -> JoinHandle<()> {
    tokio::spawn(async move {
        let lane = actor.lane();
        loop {
            match AssertUnwindSafe(actor.run()).catch_unwind().await {
                Ok(Ok(())) => break,
                Ok(Err(err)) => {
                    debug!(lane = lane.0, %err, "timer: exiting");
                    break;
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(lane = lane.0, %reason, "timer: cycle panicked");
                    actor.abort();
                    if report_fault(&actor, reason).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

async fn report_fault(actor: &TimerActor, message: String) -> Result<(), SignalError> {
    actor
        .emit(LaneEvent::Error {
            lane: actor.lane,
            message,
        })
        .await
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "timer task panicked".to_string()
    }
}

#[cfg(test)]
#[path = "tests/timer_actor_tests.rs"]
mod tests;
