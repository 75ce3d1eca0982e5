use std::io::Write as _;
use std::sync::{Mutex, PoisonError};

use crate::engine::ProgressSnapshot;
use crate::events::{Outcome, PauseReason, RunEvent, RunState, StatusSink};

const RESET: &str = "\x1b[0m";
const BLUE: &str = "\x1b[34m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";

/// The line a discrete event prints as, if any. Progress, speed and ETR
/// events are folded into [`progress_line`] instead.
pub fn event_line(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::Status(text) => Some(text.clone()),
        RunEvent::Lap { current, total } if *total > 1 => Some(format!("Lap {current}/{total}")),
        RunEvent::Paused => Some("Paused".to_string()),
        RunEvent::Resumed => Some("Resumed".to_string()),
        RunEvent::State(RunState::AutoResumeWaiting(reason)) => Some(match reason {
            PauseReason::Compliance => "Waiting for the blocked app to lose focus...".to_string(),
            _ => "Waiting for the target window to regain focus...".to_string(),
        }),
        RunEvent::Finished(outcome) => Some(match outcome {
            Outcome::Completed => "Finished: completed".to_string(),
            Outcome::StoppedByUser => "Finished: stopped".to_string(),
            Outcome::Failed(reason) => format!("Finished: failed ({reason})"),
        }),
        _ => None,
    }
}

pub fn progress_line(snapshot: &ProgressSnapshot, etr: Option<&str>) -> String {
    let mut line = format!(
        "{}/{} chars ({:.0}%)  {:.1} WPM",
        snapshot.chars_completed,
        snapshot.chars_expected_total,
        snapshot.fraction() * 100.0,
        snapshot.wpm()
    );
    if snapshot.total_laps > 1 {
        line = format!("[lap {}/{}] {line}", snapshot.current_lap, snapshot.total_laps);
    }
    if let Some(etr) = etr {
        line.push_str("  ");
        line.push_str(etr);
    }
    line
}

/// Colour the leading lifecycle word of `line` for a terminal.
pub fn colorize(line: &str) -> String {
    let prefixes: &[(&str, &str)] = &[
        ("Typing completed", GREEN),
        ("Finished: completed", GREEN),
        ("Typing Error", RED),
        ("Finished: failed", RED),
        ("Typing", BLUE),
        ("Resum", BLUE),
        ("Paused", YELLOW),
        ("Compliance", YELLOW),
        ("Focus", YELLOW),
        ("Macro ignored", YELLOW),
        ("Paste failed", YELLOW),
    ];
    for (prefix, colour) in prefixes {
        if let Some(rest) = line.strip_prefix(prefix) {
            return format!("{colour}{prefix}{RESET}{rest}");
        }
    }
    line.to_string()
}

#[derive(Debug, Default)]
struct ConsoleState {
    etr: Option<String>,
    progress_visible: bool,
}

/// Writes the event stream to stderr: status lines scroll, the progress line
/// is redrawn in place.
pub struct ConsoleSink {
    color: bool,
    show_progress: bool,
    state: Mutex<ConsoleState>,
}

impl ConsoleSink {
    pub fn new(color: bool, show_progress: bool) -> Self {
        Self {
            color,
            show_progress,
            state: Mutex::new(ConsoleState::default()),
        }
    }
}

impl StatusSink for ConsoleSink {
    fn emit(&self, event: RunEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut err = std::io::stderr().lock();

        match &event {
            RunEvent::Etr(etr) => state.etr = Some(etr.clone()),
            RunEvent::Progress(snapshot) if self.show_progress => {
                let line = progress_line(snapshot, state.etr.as_deref());
                let _ = write!(err, "\r\x1b[2K{line}");
                let _ = err.flush();
                state.progress_visible = true;
            }
            _ => {}
        }

        if let Some(line) = event_line(&event) {
            if state.progress_visible {
                let _ = write!(err, "\r\x1b[2K");
                state.progress_visible = false;
            }
            let line = if self.color { colorize(&line) } else { line };
            let _ = writeln!(err, "{line}");
        }
    }
}

pub fn escape_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
