use std::time::Duration;

use shared::domain::{CycleTicket, LaneId, Phase};
use shared::protocol::{LaneCommand, LaneEvent};
use tokio::{
    sync::mpsc,
    time::{sleep, Instant},
};

use super::*;
use crate::config::CycleTiming;

struct Harness {
    commands: mpsc::Sender<LaneCommand>,
    events: mpsc::Receiver<LaneEvent>,
    started: Instant,
    handle: JoinHandle<()>,
}

fn spawn_lane(lane: usize) -> Harness {
    spawn_lane_with(lane, |actor| actor)
}

fn spawn_lane_with(lane: usize, setup: impl FnOnce(TimerActor) -> TimerActor) -> Harness {
    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, event_rx) = mpsc::channel(64);
    let actor = setup(TimerActor::new(
        LaneId(lane),
        CycleTiming::default(),
        command_rx,
        event_tx,
    ));
    Harness {
        commands: command_tx,
        events: event_rx,
        started: Instant::now(),
        handle: spawn_supervised(actor),
    }
}

impl Harness {
    async fn send(&self, command: LaneCommand) {
        self.commands.send(command).await.expect("lane accepts command");
    }

    async fn start(&self, duration_secs: u32, ticket: u64) {
        self.send(LaneCommand::StartGreen {
            duration_secs,
            ticket: CycleTicket(ticket),
        })
        .await;
    }

    async fn next(&mut self) -> (Duration, LaneEvent) {
        let event = self.events.recv().await.expect("event");
        (self.started.elapsed(), event)
    }

    /// Collects events up to and including the first completion.
    async fn until_completed(&mut self) -> Vec<(Duration, LaneEvent)> {
        let mut seen = Vec::new();
        loop {
            let (at, event) = self.next().await;
            let done = matches!(event, LaneEvent::Completed { .. });
            seen.push((at, event));
            if done {
                return seen;
            }
        }
    }
}

fn phase_of(event: &LaneEvent) -> Option<Phase> {
    match event {
        LaneEvent::Phase { phase, .. } => Some(*phase),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn five_second_cycle_emits_expected_sequence_and_timing() {
    let mut lane = spawn_lane(0);
    lane.start(5, 1).await;

    let seen = lane.until_completed().await;
    let phases: Vec<Phase> = seen.iter().filter_map(|(_, e)| phase_of(e)).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Green { remaining: 5 },
            Phase::Green { remaining: 4 },
            Phase::Green { remaining: 3 },
            Phase::Green { remaining: 2 },
            Phase::YellowBlink {
                remaining: 2,
                lit: true
            },
            Phase::YellowBlink {
                remaining: 2,
                lit: false
            },
            Phase::YellowBlink {
                remaining: 1,
                lit: true
            },
            Phase::YellowBlink {
                remaining: 1,
                lit: false
            },
            Phase::Red,
        ]
    );

    let offsets: Vec<u128> = seen.iter().map(|(at, _)| at.as_millis()).collect();
    assert_eq!(
        offsets,
        vec![0, 1000, 2000, 3000, 3000, 3500, 4000, 4500, 5000, 5000]
    );
    assert_eq!(
        seen.last().map(|(_, e)| e.clone()),
        Some(LaneEvent::Completed {
            lane: LaneId(0),
            cycle: Some(CycleTicket(1)),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn one_second_green_still_runs_full_yellow() {
    let mut lane = spawn_lane(2);
    lane.start(1, 7).await;

    let seen = lane.until_completed().await;
    let greens = seen
        .iter()
        .filter(|(_, e)| matches!(phase_of(e), Some(Phase::Green { .. })))
        .count();
    let yellows = seen
        .iter()
        .filter(|(_, e)| matches!(phase_of(e), Some(Phase::YellowBlink { .. })))
        .count();
    assert_eq!(greens, 1);
    assert_eq!(yellows, 4);
    assert_eq!(seen.last().map(|(at, _)| *at), Some(Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn force_red_mid_green_emits_red_and_completion_once() {
    let mut lane = spawn_lane(1);
    lane.start(8, 3).await;
    assert_eq!(
        phase_of(&lane.next().await.1),
        Some(Phase::Green { remaining: 8 })
    );
    assert_eq!(
        phase_of(&lane.next().await.1),
        Some(Phase::Green { remaining: 7 })
    );

    lane.send(LaneCommand::ForceRed).await;
    let (_, red) = lane.next().await;
    assert_eq!(phase_of(&red), Some(Phase::Red));
    let (_, done) = lane.next().await;
    assert_eq!(
        done,
        LaneEvent::Completed {
            lane: LaneId(1),
            cycle: Some(CycleTicket(3)),
        }
    );

    sleep(Duration::from_secs(20)).await;
    assert!(lane.events.try_recv().is_err(), "aborted cycle kept emitting");
}

#[tokio::test(start_paused = true)]
async fn force_red_mid_yellow_stops_blinking() {
    let mut lane = spawn_lane(3);
    lane.start(2, 1).await;
    // green{2}, yellow lit
    lane.next().await;
    lane.next().await;

    lane.send(LaneCommand::ForceRed).await;
    assert_eq!(phase_of(&lane.next().await.1), Some(Phase::Red));
    assert!(matches!(
        lane.next().await.1,
        LaneEvent::Completed {
            cycle: Some(CycleTicket(1)),
            ..
        }
    ));

    sleep(Duration::from_secs(5)).await;
    assert!(lane.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn force_red_on_idle_lane_reports_no_cycle() {
    let mut lane = spawn_lane(0);
    lane.send(LaneCommand::ForceRed).await;
    assert_eq!(phase_of(&lane.next().await.1), Some(Phase::Red));
    assert_eq!(
        lane.next().await.1,
        LaneEvent::Completed {
            lane: LaneId(0),
            cycle: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_silently() {
    let mut lane = spawn_lane(0);
    lane.start(6, 1).await;
    lane.next().await;

    lane.send(LaneCommand::Stop).await;
    sleep(Duration::from_secs(10)).await;
    assert!(lane.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn overlapping_start_is_ignored() {
    let mut lane = spawn_lane(0);
    lane.start(3, 1).await;
    lane.start(9, 2).await;

    let seen = lane.until_completed().await;
    assert_eq!(
        phase_of(&seen[0].1),
        Some(Phase::Green { remaining: 3 })
    );
    assert_eq!(
        seen.last().map(|(_, e)| e.clone()),
        Some(LaneEvent::Completed {
            lane: LaneId(0),
            cycle: Some(CycleTicket(1)),
        })
    );
    sleep(Duration::from_secs(15)).await;
    assert!(lane.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn lane_restarts_after_force_red() {
    let mut lane = spawn_lane(0);
    lane.start(5, 1).await;
    lane.next().await;
    lane.send(LaneCommand::ForceRed).await;
    lane.next().await;
    lane.next().await;

    lane.started = Instant::now();
    lane.start(3, 2).await;
    let seen = lane.until_completed().await;
    assert_eq!(
        phase_of(&seen[0].1),
        Some(Phase::Green { remaining: 3 })
    );
    assert_eq!(seen.last().map(|(at, _)| *at), Some(Duration::from_secs(3)));
}

#[tokio::test(start_paused = true)]
async fn actor_exits_when_commands_close() {
    let lane = spawn_lane(0);
    let Harness {
        commands, handle, ..
    } = lane;
    drop(commands);
    handle.await.expect("timer task joins cleanly");
}

#[tokio::test(start_paused = true)]
async fn panicking_cycle_reports_error_and_lane_keeps_serving() {
    let mut lane = spawn_lane_with(1, |actor| actor.fail_at_beat(2));
    lane.start(5, 1).await;
    assert_eq!(
        phase_of(&lane.next().await.1),
        Some(Phase::Green { remaining: 5 })
    );
    assert_eq!(
        phase_of(&lane.next().await.1),
        Some(Phase::Green { remaining: 4 })
    );

    let (at, fault) = lane.next().await;
    assert_eq!(at, Duration::from_secs(2));
    assert_eq!(
        fault,
        LaneEvent::Error {
            lane: LaneId(1),
            message: "lane 1 faulted at beat 2".into(),
        }
    );

    sleep(Duration::from_secs(20)).await;
    assert!(lane.events.try_recv().is_err(), "faulted cycle kept emitting");

    lane.started = Instant::now();
    lane.start(5, 2).await;
    let seen = lane.until_completed().await;
    assert_eq!(seen.len(), 10);
    assert_eq!(
        phase_of(&seen[0].1),
        Some(Phase::Green { remaining: 5 })
    );
    assert_eq!(
        seen.last().cloned(),
        Some((
            Duration::from_secs(5),
            LaneEvent::Completed {
                lane: LaneId(1),
                cycle: Some(CycleTicket(2)),
            }
        ))
    );
}
