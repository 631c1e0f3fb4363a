use shared::{
    domain::{LaneId, LANE_COUNT},
    error::SignalError,
    protocol::{IntersectionSnapshot, Notice},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::IntersectionConfig,
    coordinator::{Control, Coordinator, DurationUpdate},
    timer_actor::{spawn_supervised, TimerActor},
};

/// Operator handle over a running intersection: four lane timers plus the
/// coordinator that rotates them.
pub struct Intersection {
    control: mpsc::Sender<Control>,
    snapshots: watch::Receiver<IntersectionSnapshot>,
    notices: broadcast::Sender<Notice>,
    coordinator: JoinHandle<()>,
    timers: Vec<JoinHandle<()>>,
}

impl Intersection {
    /// Spawns the lane timers and coordinator on the current tokio runtime.
    pub fn spawn(config: IntersectionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let mut lanes = Vec::with_capacity(LANE_COUNT);
        let mut timers = Vec::with_capacity(LANE_COUNT);
        for lane in LaneId::all() {
            let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
            let actor = TimerActor::new(lane, config.timing, command_rx, event_tx.clone());
            timers.push(spawn_supervised(actor));
            lanes.push(command_tx);
        }
        drop(event_tx);

        let (notices, _) = broadcast::channel(config.notice_capacity);
        let coordinator = Coordinator::new(lanes, config.green_secs, notices.clone());
        let snapshots = coordinator.watch();
        let (control, control_rx) = mpsc::channel(config.command_capacity);
        let coordinator = tokio::spawn(coordinator.run(control_rx, event_rx));
        info!(
            green_secs = config.green_secs,
            second_ms = config.timing.second.as_millis() as u64,
            "intersection: spawned"
        );

        Self {
            control,
            snapshots,
            notices,
            coordinator,
            timers,
        }
    }

    pub async fn start(&self) -> Result<(), SignalError> {
        self.send(Control::Start).await
    }

    pub async fn stop(&self) -> Result<(), SignalError> {
        self.send(Control::Stop).await
    }

    pub async fn set_duration(&self, secs: u32) -> Result<DurationUpdate, SignalError> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::SetDuration { secs, reply }).await?;
        rx.await.map_err(|_| SignalError::CoordinatorClosed)
    }

    /// Snapshot taken after every control message sent before this call.
    pub async fn snapshot(&self) -> Result<IntersectionSnapshot, SignalError> {
        let (reply, rx) = oneshot::channel();
        self.send(Control::Snapshot(reply)).await?;
        rx.await.map_err(|_| SignalError::CoordinatorClosed)
    }

    /// Last published snapshot, without a round trip to the coordinator.
    pub fn current(&self) -> IntersectionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<IntersectionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Silently stops every lane and waits for all tasks to finish.
    pub async fn shutdown(self) -> Result<(), SignalError> {
        let _ = self.control.send(Control::Shutdown).await;
        drop(self.control);
        if let Err(err) = self.coordinator.await {
            warn!(%err, "intersection: coordinator task failed");
        }
        for (lane, timer) in self.timers.into_iter().enumerate() {
            if let Err(err) = timer.await {
                warn!(lane, %err, "intersection: timer task failed");
            }
        }
        info!("intersection: shut down");
        Ok(())
    }

    async fn send(&self, message: Control) -> Result<(), SignalError> {
        self.control
            .send(message)
            .await
            .map_err(|_| SignalError::CoordinatorClosed)
    }
}
