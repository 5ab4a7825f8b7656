use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use wardsim_engine::clock::{ClockEvent, ClockHandle, ClockMode, SessionClock};

fn drain(events: &mut UnboundedReceiver<ClockEvent>) -> Vec<ClockEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn countdown_emits_time_up_once_and_stops_at_zero() {
    let mut clock = SessionClock::countdown(Duration::from_secs(3));
    assert_eq!(clock.start(), Some(ClockEvent::Started));

    assert!(matches!(clock.tick(), Some(ClockEvent::Tick { remaining_secs: Some(2), .. })));
    assert!(matches!(clock.tick(), Some(ClockEvent::Tick { remaining_secs: Some(1), .. })));
    assert_eq!(clock.tick(), Some(ClockEvent::TimeUp));

    for _ in 0..5 {
        assert_eq!(clock.tick(), None);
    }
    assert_eq!(clock.remaining_secs(), Some(0));
    assert!(clock.is_time_up());
    assert!(!clock.is_running());
    // A finished countdown does not restart without a reset.
    assert_eq!(clock.start(), None);
}

#[test]
fn stopwatch_counts_up_without_limit() {
    let mut clock = SessionClock::stopwatch();
    clock.start();
    for _ in 0..125 {
        clock.tick();
    }
    assert_eq!(clock.elapsed_secs(), 125);
    assert_eq!(clock.remaining_secs(), None);
    assert_eq!(clock.display(), "02:05");
}

#[test]
fn pause_and_reset_are_idempotent() {
    let mut clock = SessionClock::countdown(Duration::from_secs(300));
    assert_eq!(clock.pause(), None);
    assert_eq!(clock.reset(), None);

    clock.start();
    clock.tick();
    assert_eq!(clock.pause(), Some(ClockEvent::Paused));
    assert_eq!(clock.pause(), None);
    assert_eq!(clock.tick(), None);
    assert_eq!(clock.display(), "04:59");

    assert_eq!(clock.reset(), Some(ClockEvent::Reset));
    assert_eq!(clock.reset(), None);
    assert_eq!(clock.remaining_secs(), Some(300));
}

#[test]
fn mode_switch_clears_time_up() {
    let mut clock = SessionClock::countdown(Duration::from_secs(1));
    clock.start();
    assert_eq!(clock.tick(), Some(ClockEvent::TimeUp));

    let event = clock.set_mode(ClockMode::Countdown { duration_secs: 10 });
    assert_eq!(event, ClockEvent::ModeChanged(ClockMode::Countdown { duration_secs: 10 }));
    assert!(!clock.is_time_up());
    assert_eq!(clock.elapsed_secs(), 0);
    assert_eq!(clock.start(), Some(ClockEvent::Started));
}

#[tokio::test(start_paused = true)]
async fn driven_countdown_fires_time_up_at_five_seconds() {
    let (clock, mut events) = ClockHandle::spawn(SessionClock::countdown(Duration::from_secs(5)), None);
    clock.start();

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    let early = drain(&mut events);
    assert!(!early.contains(&ClockEvent::TimeUp));
    assert_eq!(clock.snapshot().remaining_secs, Some(1));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    let late = drain(&mut events);
    assert_eq!(late.iter().filter(|e| **e == ClockEvent::TimeUp).count(), 1);

    let snapshot = clock.snapshot();
    assert_eq!(snapshot.remaining_secs, Some(0));
    assert!(snapshot.time_up);
    assert!(!snapshot.running);
}

#[tokio::test(start_paused = true)]
async fn auto_start_waits_for_the_grace_period() {
    let (clock, mut events) = ClockHandle::spawn(
        SessionClock::countdown(Duration::from_secs(300)),
        Some(Duration::from_millis(1_500)),
    );

    tokio::time::sleep(Duration::from_millis(1_400)).await;
    assert!(!clock.snapshot().running);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(clock.snapshot().running);
    assert_eq!(drain(&mut events).first(), Some(&ClockEvent::Started));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(clock.snapshot().remaining_secs, Some(290));
}

#[tokio::test(start_paused = true)]
async fn auto_start_leaves_a_paused_clock_alone() {
    let (clock, mut events) = ClockHandle::spawn(
        SessionClock::countdown(Duration::from_secs(300)),
        Some(Duration::from_millis(1_500)),
    );
    clock.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    clock.pause();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = clock.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.remaining_secs, Some(300));
    assert_eq!(drain(&mut events), [ClockEvent::Started, ClockEvent::Paused]);
}

#[tokio::test(start_paused = true)]
async fn driven_pause_holds_the_time() {
    let (clock, _events) = ClockHandle::spawn(SessionClock::stopwatch(), None);
    clock.start();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    clock.pause();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let snapshot = clock.snapshot();
    assert_eq!(snapshot.elapsed_secs, 3);
    assert!(!snapshot.running);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_the_driver() {
    let (clock, _events) = ClockHandle::spawn(SessionClock::stopwatch(), None);
    clock.stop();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(clock.is_finished());
}
