use std::time::Duration;

use shared::{
    domain::{LaneId, LightReading},
    protocol::Notice,
};
use signal_core::{Intersection, IntersectionConfig};
use tokio::{
    sync::broadcast,
    time::{sleep, Instant},
};

async fn next_handoff(notices: &mut broadcast::Receiver<Notice>) -> (LaneId, LaneId) {
    loop {
        match notices.recv().await.expect("notice stream open") {
            Notice::Handoff { from, to } => return (from, to),
            _ => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn rotation_visits_lanes_in_order_one_cycle_apart() {
    let intersection = Intersection::spawn(IntersectionConfig::default().with_green_secs(5));
    let mut notices = intersection.subscribe();
    let started = Instant::now();
    intersection.start().await.expect("start");

    let mut order = Vec::new();
    for n in 1..=6u64 {
        let (from, to) = next_handoff(&mut notices).await;
        assert_eq!(started.elapsed(), Duration::from_secs(5 * n), "handoff {n}");
        order.push((from.index(), to.index()));
    }
    assert_eq!(
        order,
        vec![(0, 1), (1, 2), (2, 3), (3, 0), (0, 1), (1, 2)]
    );

    intersection.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn only_the_active_lane_is_lit_while_running() {
    let intersection = Intersection::spawn(IntersectionConfig::default().with_green_secs(5));
    let mut watch = intersection.watch();
    intersection.start().await.expect("start");

    let deadline = Instant::now() + Duration::from_secs(22);
    while Instant::now() < deadline {
        tokio::select! {
            changed = watch.changed() => changed.expect("coordinator alive"),
            () = sleep(Duration::from_millis(250)) => {}
        }
        let snapshot = watch.borrow_and_update().clone();
        let lit: Vec<usize> = LaneId::all()
            .filter(|lane| snapshot.reading(*lane) != LightReading::Red)
            .map(LaneId::index)
            .collect();
        assert!(lit.len() <= 1, "more than one lane lit: {snapshot:?}");
        if let Some(lane) = lit.first() {
            assert_eq!(*lane, snapshot.active_lane.index());
        }
    }

    intersection.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn start_then_immediate_stop_leaves_everything_red() {
    let intersection = Intersection::spawn(IntersectionConfig::default());
    intersection.start().await.expect("start");
    intersection.stop().await.expect("stop");

    let snapshot = intersection.snapshot().await.expect("snapshot");
    assert!(!snapshot.running);
    assert!(snapshot.all_red());
    assert_eq!(snapshot.countdown, 0);
    assert_eq!(snapshot.active_lane, LaneId(0));

    sleep(Duration::from_secs(30)).await;
    let snapshot = intersection.snapshot().await.expect("snapshot");
    assert!(snapshot.all_red());
    assert_eq!(snapshot.countdown, 0);
    assert_eq!(snapshot.handoffs, 0);

    intersection.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn stop_mid_rotation_then_restart_begins_at_lane_zero() {
    let intersection = Intersection::spawn(IntersectionConfig::default().with_green_secs(5));
    let mut notices = intersection.subscribe();
    intersection.start().await.expect("start");
    next_handoff(&mut notices).await;
    sleep(Duration::from_millis(2500)).await;

    intersection.stop().await.expect("stop");
    intersection.start().await.expect("restart");
    let started = Instant::now();

    let snapshot = intersection.snapshot().await.expect("snapshot");
    assert!(snapshot.running);
    assert_eq!(snapshot.active_lane, LaneId(0));

    let (from, to) = next_handoff(&mut notices).await;
    assert_eq!((from, to), (LaneId(0), LaneId(1)));
    assert_eq!(started.elapsed(), Duration::from_secs(5));

    intersection.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn countdown_tracks_active_lane() {
    let intersection = Intersection::spawn(IntersectionConfig::default().with_green_secs(6));
    intersection.start().await.expect("start");
    assert_eq!(intersection.snapshot().await.expect("snapshot").countdown, 6);

    sleep(Duration::from_millis(2100)).await;
    let snapshot = intersection.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.countdown, 4);
    assert_eq!(snapshot.reading(LaneId(0)), LightReading::Green);

    sleep(Duration::from_millis(2000)).await;
    let snapshot = intersection.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.reading(LaneId(0)), LightReading::Yellow { lit: true });

    intersection.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn duration_change_while_stopped_applies_to_next_start() {
    let intersection = Intersection::spawn(IntersectionConfig::default());
    let update = intersection.set_duration(2).await.expect("set duration");
    assert_eq!(update.secs, 5);
    assert!(!update.deferred);

    let mut notices = intersection.subscribe();
    let started = Instant::now();
    intersection.start().await.expect("start");
    next_handoff(&mut notices).await;
    assert_eq!(started.elapsed(), Duration::from_secs(5));

    intersection.shutdown().await.expect("shutdown");
}
