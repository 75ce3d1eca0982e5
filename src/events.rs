use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::engine::progress::ProgressSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    User,
    FocusLost,
    Compliance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CountingDown,
    AwaitingTargetFocus,
    Locked(String),
    Typing,
    Paused(PauseReason),
    /// Paused on focus loss or a blocked app, with the auto-resume watcher running.
    AutoResumeWaiting(PauseReason),
    Completed,
    StoppedByUser,
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::StoppedByUser | RunState::Failed(_)
        )
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, RunState::Paused(_) | RunState::AutoResumeWaiting(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    StoppedByUser,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::StoppedByUser => f.write_str("stopped"),
            Outcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Status(String),
    State(RunState),
    Progress(ProgressSnapshot),
    Speed { wpm: f64 },
    Etr(String),
    Lap { current: u32, total: u32 },
    Paused,
    Resumed,
    Finished(Outcome),
}

/// Receives everything a run reports to its caller.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

impl<F> StatusSink for F
where
    F: Fn(RunEvent) + Send + Sync,
{
    fn emit(&self, event: RunEvent) {
        self(event)
    }
}

/// Forwards events over a channel; a dropped receiver is ignored.
pub struct ChannelSink(Mutex<Sender<RunEvent>>);

impl ChannelSink {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self(Mutex::new(tx))
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        let tx = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let _ = tx.send(event);
    }
}

pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}
