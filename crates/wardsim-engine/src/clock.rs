//! Stopwatch and countdown clock for a case session.
//!
//! [`SessionClock`] is a plain state machine advanced one second per
//! [`SessionClock::tick`]; [`ClockHandle`] drives it from a tokio task so
//! tests can run it on a paused clock. The countdown does not cancel
//! anything when it runs out: it reports [`ClockEvent::TimeUp`] once and
//! leaves gating input to the caller.

use std::future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClockMode {
    Stopwatch,
    Countdown { duration_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Started,
    Paused,
    Reset,
    ModeChanged(ClockMode),
    Tick {
        elapsed_secs: u64,
        remaining_secs: Option<u64>,
    },
    TimeUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClock {
    mode: ClockMode,
    elapsed_secs: u64,
    running: bool,
    time_up: bool,
}

impl SessionClock {
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            elapsed_secs: 0,
            running: false,
            time_up: false,
        }
    }

    pub fn stopwatch() -> Self {
        Self::new(ClockMode::Stopwatch)
    }

    pub fn countdown(duration: Duration) -> Self {
        Self::new(ClockMode::Countdown {
            duration_secs: duration.as_secs(),
        })
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Seconds left in countdown mode; `None` for a stopwatch.
    pub fn remaining_secs(&self) -> Option<u64> {
        match self.mode {
            ClockMode::Stopwatch => None,
            ClockMode::Countdown { duration_secs } => {
                Some(duration_secs.saturating_sub(self.elapsed_secs))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_time_up(&self) -> bool {
        self.time_up
    }

    /// `MM:SS` of the value the learner should see.
    pub fn display(&self) -> String {
        let secs = self.remaining_secs().unwrap_or(self.elapsed_secs);
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn start(&mut self) -> Option<ClockEvent> {
        if self.running || self.time_up {
            return None;
        }
        if self.remaining_secs() == Some(0) {
            self.time_up = true;
            return Some(ClockEvent::TimeUp);
        }
        self.running = true;
        Some(ClockEvent::Started)
    }

    pub fn pause(&mut self) -> Option<ClockEvent> {
        if !self.running {
            return None;
        }
        self.running = false;
        Some(ClockEvent::Paused)
    }

    pub fn reset(&mut self) -> Option<ClockEvent> {
        if !self.running && !self.time_up && self.elapsed_secs == 0 {
            return None;
        }
        self.running = false;
        self.time_up = false;
        self.elapsed_secs = 0;
        Some(ClockEvent::Reset)
    }

    /// Switch modes, discarding elapsed time and any time-up state.
    pub fn set_mode(&mut self, mode: ClockMode) -> ClockEvent {
        *self = Self::new(mode);
        ClockEvent::ModeChanged(mode)
    }

    /// Advance one second.
    pub fn tick(&mut self) -> Option<ClockEvent> {
        if !self.running {
            return None;
        }
        self.elapsed_secs += 1;

        if self.remaining_secs() == Some(0) {
            self.running = false;
            self.time_up = true;
            return Some(ClockEvent::TimeUp);
        }
        Some(ClockEvent::Tick {
            elapsed_secs: self.elapsed_secs,
            remaining_secs: self.remaining_secs(),
        })
    }

    fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            mode: self.mode,
            elapsed_secs: self.elapsed_secs,
            remaining_secs: self.remaining_secs(),
            running: self.running,
            time_up: self.time_up,
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub mode: ClockMode,
    pub elapsed_secs: u64,
    pub remaining_secs: Option<u64>,
    pub running: bool,
    pub time_up: bool,
}

#[derive(Debug, Clone, Copy)]
enum ClockCommand {
    Start,
    Pause,
    Reset,
    SetMode(ClockMode),
}

pub struct ClockHandle {
    commands: mpsc::UnboundedSender<ClockCommand>,
    snapshot: watch::Receiver<ClockSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ClockHandle {
    /// Drive `clock` on a background task. With `auto_start`, the clock
    /// starts by itself after that delay unless a command arrived first.
    pub fn spawn(
        clock: SessionClock,
        auto_start: Option<Duration>,
    ) -> (Self, mpsc::UnboundedReceiver<ClockEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(clock.snapshot());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(drive(
            clock,
            auto_start,
            command_rx,
            event_tx,
            snapshot_tx,
            cancel.clone(),
        ));

        (
            Self {
                commands,
                snapshot,
                cancel,
                task,
            },
            events,
        )
    }

    pub fn start(&self) {
        let _ = self.commands.send(ClockCommand::Start);
    }

    pub fn pause(&self) {
        let _ = self.commands.send(ClockCommand::Pause);
    }

    pub fn reset(&self) {
        let _ = self.commands.send(ClockCommand::Reset);
    }

    pub fn set_mode(&self, mode: ClockMode) {
        let _ = self.commands.send(ClockCommand::SetMode(mode));
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.snapshot.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    mut clock: SessionClock,
    auto_start: Option<Duration>,
    mut commands: mpsc::UnboundedReceiver<ClockCommand>,
    events: mpsc::UnboundedSender<ClockEvent>,
    snapshot: watch::Sender<ClockSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut auto_pending = auto_start.is_some();
    // Any command from the learner cancels the auto-start.
    let mut touched = false;
    let auto = async {
        match auto_start {
            Some(delay) => tokio::time::sleep(delay).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(auto);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut auto, if auto_pending => {
                auto_pending = false;
                if touched {
                    None
                } else {
                    debug!("clock auto-start");
                    start(&mut clock, &mut ticker)
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                touched = true;
                match command {
                    ClockCommand::Start => start(&mut clock, &mut ticker),
                    ClockCommand::Pause => clock.pause(),
                    ClockCommand::Reset => clock.reset(),
                    ClockCommand::SetMode(mode) => Some(clock.set_mode(mode)),
                }
            }
            _ = ticker.tick(), if clock.is_running() => clock.tick(),
        };

        if let Some(event) = event {
            if event == ClockEvent::TimeUp {
                info!(mode = ?clock.mode(), "time up");
            }
            snapshot.send_replace(clock.snapshot());
            let _ = events.send(event);
        }
    }
}

fn start(clock: &mut SessionClock, ticker: &mut tokio::time::Interval) -> Option<ClockEvent> {
    let event = clock.start();
    if event == Some(ClockEvent::Started) {
        ticker.reset();
    }
    event
}
