use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;

use super::control::RunControl;
use super::progress::{format_etr, ProgressTracker};
use super::watcher::{WatchContext, Watcher};
use super::{jitter, rng_from_seed, EngineError, EngineOptions};
use crate::classify::{self, classify_window_title, WindowKind};
use crate::config::{EngineTiming, RunConfiguration};
use crate::events::{Outcome, PauseReason, RunEvent, RunState, StatusSink};
use crate::host::{HostAutomation, HostError};
use crate::macros::{self, Macro, MacroContext};
use crate::policy::{self, Unit};
use crate::text::Document;
use crate::timing::TimingModel;

/// Why the emission loop stopped early.
enum Halt {
    Stopped,
    Failed(EngineError),
}

type Step = Result<(), Halt>;

pub(super) struct Scheduler {
    document: Document,
    config: Arc<RunConfiguration>,
    host: Arc<dyn HostAutomation>,
    sink: Arc<dyn StatusSink>,
    control: Arc<RunControl>,
    timing: EngineTiming,
    controller_title: Option<String>,
    rng: StdRng,
    model: TimingModel,
    state: RunState,
    locked_title: String,
    window_kind: WindowKind,
    progress: ProgressTracker,
    watcher: Option<Watcher>,
    jitter: Option<JoinHandle<()>>,
    prev_char: Option<char>,
    indent_level: usize,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Scheduler {
    pub(super) fn new(
        document: Document,
        config: RunConfiguration,
        host: Arc<dyn HostAutomation>,
        sink: Arc<dyn StatusSink>,
        control: Arc<RunControl>,
        options: EngineOptions,
    ) -> Self {
        let model = TimingModel::new(&config);
        let laps = config.laps;
        Self {
            document,
            config: Arc::new(config),
            host,
            sink,
            control,
            timing: options.timing,
            controller_title: options.controller_title,
            rng: rng_from_seed(options.seed),
            model,
            state: RunState::Idle,
            locked_title: String::new(),
            window_kind: WindowKind::Unknown,
            progress: ProgressTracker::new(0, laps, options.timing.progress_throttle),
            watcher: None,
            jitter: None,
            prev_char: None,
            indent_level: 0,
        }
    }

    pub(super) fn run(mut self) -> Outcome {
        tracing::info!("run started ({} chars)", self.document.char_count());
        let result = catch_unwind(AssertUnwindSafe(|| self.execute()));
        let outcome = match result {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(Halt::Stopped)) => Outcome::StoppedByUser,
            Ok(Err(Halt::Failed(err))) => Outcome::Failed(err.to_string()),
            Err(payload) => {
                let err = EngineError::Internal(panic_message(payload));
                Outcome::Failed(err.to_string())
            }
        };
        self.finish(outcome)
    }

    fn finish(mut self, outcome: Outcome) -> Outcome {
        self.control.mark_finished();
        if let Some(watcher) = self.watcher.take() {
            watcher.cancel();
        }
        if let Some(jitter) = self.jitter.take() {
            let _ = jitter.join();
        }
        self.control.set_paused(false);

        let (state, status) = match &outcome {
            Outcome::Completed => (
                RunState::Completed,
                "Typing completed successfully!".to_string(),
            ),
            Outcome::StoppedByUser => (RunState::StoppedByUser, "Typing stopped by user.".to_string()),
            Outcome::Failed(reason) => (RunState::Failed(reason.clone()), format!("Typing Error: {reason}")),
        };
        match &outcome {
            Outcome::Failed(reason) => tracing::warn!("run failed: {reason}"),
            other => tracing::info!("run finished: {other}"),
        }
        self.status(status);
        self.set_state(state);
        self.sink.emit(RunEvent::Finished(outcome.clone()));
        outcome
    }

    fn status(&self, text: impl Into<String>) {
        self.sink.emit(RunEvent::Status(text.into()));
    }

    fn set_state(&mut self, state: RunState) {
        tracing::debug!("state -> {state:?}");
        self.state = state.clone();
        self.sink.emit(RunEvent::State(state));
    }

    fn check_stop(&self) -> Step {
        if self.control.is_stopped() {
            return Err(Halt::Stopped);
        }
        Ok(())
    }

    fn sleep(&self, duration: Duration) -> Step {
        if !self.control.sleep(duration) {
            self.check_stop()?;
        }
        Ok(())
    }

    fn random_between(&mut self, lo: Duration, hi: Duration) -> Duration {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    /// Report a host action outcome. Permission denial ends the run; other
    /// failures are reported and `Ok(false)` is returned.
    fn host_result(&self, what: &str, result: Result<(), HostError>) -> Result<bool, Halt> {
        match result {
            Ok(()) => Ok(true),
            Err(HostError::PermissionDenied(msg)) => {
                Err(Halt::Failed(EngineError::PermissionDenied(msg)))
            }
            Err(err) => {
                tracing::warn!("{what} failed: {err}");
                self.status(format!("{what} failed: {err}"));
                Ok(false)
            }
        }
    }

    fn focused_title(&self) -> Result<String, Halt> {
        match self.host.focused_window_title() {
            Ok(title) => Ok(title),
            Err(HostError::PermissionDenied(msg)) => {
                Err(Halt::Failed(EngineError::PermissionDenied(msg)))
            }
            Err(err) => {
                tracing::debug!("could not read focused title: {err}");
                Ok(String::new())
            }
        }
    }

    fn execute(&mut self) -> Step {
        if self.document.char_count() == 0 {
            self.status("Nothing to type.");
            self.report(true);
            return Ok(());
        }

        if self.config.background_pointer_jitter {
            let seed = self.rng.gen();
            self.jitter = jitter::spawn(self.host.clone(), self.control.clone(), seed);
        }

        self.countdown()?;
        self.acquire_target()?;
        self.optimize_for_target();

        let known_keys = self.host.known_key_names();
        let ctx = MacroContext {
            known_keys: &known_keys,
            screen_bounds: self.host.screen_bounds(),
        };
        let plan = policy::transform(&self.document, &self.config, &ctx);
        for diagnostic in &plan.diagnostics {
            self.status(format!("Macro ignored: {}", diagnostic.error));
        }
        if plan.join_skipped {
            tracing::info!("document looks like code; paragraph joining skipped");
        }

        let laps = self.config.laps;
        self.progress = ProgressTracker::new(
            plan.expected_chars * laps as usize,
            laps,
            self.timing.progress_throttle,
        );
        self.progress.start(Instant::now());
        self.set_state(RunState::Typing);

        for lap in 1..=laps {
            self.check_stop()?;
            self.progress.set_lap(lap);
            self.sink.emit(RunEvent::Lap {
                current: lap,
                total: laps,
            });
            self.prev_char = None;
            self.indent_level = 0;

            for unit in &plan.units {
                self.run_unit(unit)?;
            }

            if lap < laps {
                self.sleep(self.timing.lap_pause)?;
            }
        }

        self.progress.complete();
        self.report(true);
        Ok(())
    }

    fn countdown(&mut self) -> Step {
        self.set_state(RunState::CountingDown);
        for remaining in (1..=self.config.start_delay_seconds).rev() {
            self.check_stop()?;
            self.status(format!("Starting in {remaining}..."));
            self.sleep(self.timing.countdown_tick)?;
        }
        self.check_stop()
    }

    fn acquire_target(&mut self) -> Step {
        self.set_state(RunState::AwaitingTargetFocus);
        let mut hinted: Option<String> = None;

        let title = loop {
            self.check_stop()?;
            let title = self.focused_title()?;

            let hint = if self.controller_title.as_deref() == Some(title.as_str()) {
                Some("Switch to the target window to begin...".to_string())
            } else if self.config.is_blocked(&title) {
                Some(format!(
                    "Compliance mode: '{title}' is blocked. Waiting for another window..."
                ))
            } else {
                None
            };

            match hint {
                None => break title,
                Some(hint) => {
                    if hinted.as_deref() != Some(hint.as_str()) {
                        self.status(hint.clone());
                        hinted = Some(hint);
                    }
                }
            }
            self.sleep(self.timing.acquire_poll)?;
        };

        self.window_kind = classify_window_title(&title);
        self.locked_title = title.clone();
        self.status(format!("Typing locked on: {title}"));
        self.set_state(RunState::Locked(title));
        Ok(())
    }

    fn optimize_for_target(&mut self) {
        if !self.config.auto_optimize {
            return;
        }
        let content = if self.config.macros_enabled {
            classify::classify(&macros::strip_macros(self.document.as_str()))
        } else {
            classify::classify(self.document.as_str())
        };
        let mut config = (*self.config).clone();
        if !classify::auto_optimize(&mut config, self.window_kind, content) {
            return;
        }

        self.status(format!(
            "Auto-optimized for {}: mode={}, esc={}, shift+enter={}, tabs={}, mistakes={}",
            self.window_kind,
            config.newline_mode,
            config.dismiss_popup_before_enter,
            config.use_alt_newline_key,
            config.preserve_tabs,
            config.inject_mistakes,
        ));
        self.model = TimingModel::new(&config);
        self.config = Arc::new(config);
    }

    /// Popup dismissal sends Escape, which cancels navigation in browsers.
    fn dismiss_allowed(&self) -> bool {
        self.config.dismiss_popup_before_enter && self.window_kind != WindowKind::Browser
    }

    fn report(&mut self, force: bool) {
        let now = Instant::now();
        if !self.progress.should_push(now) && !force {
            return;
        }
        let snapshot = self.progress.snapshot(now);
        self.sink.emit(RunEvent::Progress(snapshot));
        self.sink.emit(RunEvent::Speed {
            wpm: snapshot.wpm(),
        });
        if let Some(etr) = snapshot.etr_seconds() {
            self.sink.emit(RunEvent::Etr(format_etr(etr)));
        }
    }

    // ----- pause / resume gate -----

    fn gate(&mut self) -> Step {
        loop {
            self.check_stop()?;

            if self.control.take_pause_request() {
                match self.state {
                    RunState::Typing => self.enter_pause(PauseReason::User),
                    RunState::AutoResumeWaiting(_) => {
                        // An explicit pause overrides the watcher.
                        if let Some(watcher) = self.watcher.take() {
                            watcher.cancel();
                        }
                        self.set_state(RunState::Paused(PauseReason::User));
                    }
                    _ => {}
                }
            }

            if self.state.is_paused() {
                if self.control.take_resume_request() {
                    self.leave_pause()?;
                } else {
                    self.control.wait_for_request();
                }
                continue;
            }

            // A resume with nothing to resume is stale.
            self.control.take_resume_request();

            let title = self.focused_title()?;
            if self.config.is_blocked(&title) {
                self.status("Compliance mode: blocked app active. Pausing...");
                self.enter_pause(PauseReason::Compliance);
                continue;
            }
            if title != self.locked_title {
                self.status(format!(
                    "Focus moved away from '{}'. Pausing...",
                    self.locked_title
                ));
                self.enter_pause(PauseReason::FocusLost);
                continue;
            }

            return Ok(());
        }
    }

    fn enter_pause(&mut self, reason: PauseReason) {
        self.progress.pause(Instant::now());
        self.control.set_paused(true);
        self.sink.emit(RunEvent::Paused);

        if reason == PauseReason::User {
            self.set_state(RunState::Paused(reason));
            return;
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.cancel();
        }
        self.watcher = Some(Watcher::spawn(WatchContext {
            host: self.host.clone(),
            control: self.control.clone(),
            sink: self.sink.clone(),
            config: self.config.clone(),
            timing: self.timing,
            locked_title: self.locked_title.clone(),
        }));
        self.set_state(RunState::AutoResumeWaiting(reason));
    }

    fn leave_pause(&mut self) -> Step {
        if let Some(watcher) = self.watcher.take() {
            watcher.cancel();
        }
        self.progress.resume(Instant::now());
        self.control.set_paused(false);
        self.sink.emit(RunEvent::Resumed);
        self.set_state(RunState::Typing);

        self.sleep(self.timing.resume_settle)?;
        if self.dismiss_allowed() {
            let result = self.host.press_key("esc");
            self.host_result("Popup dismissal", result)?;
        }
        Ok(())
    }

    // ----- emission -----

    fn run_unit(&mut self, unit: &Unit) -> Step {
        match unit {
            Unit::Text(text) => {
                if self.config.prefer_paste_over_keystrokes {
                    self.gate()?;
                    self.paste_span(text)?;
                    let pause =
                        self.random_between(self.timing.paste_pause_min, self.timing.paste_pause_max);
                    self.sleep(pause)
                } else {
                    text.chars().try_for_each(|ch| self.type_char(ch))
                }
            }
            Unit::Macro(m) => {
                self.gate()?;
                self.run_macro(m)
            }
            Unit::LineStart { indent_level } => self.line_start(*indent_level),
            Unit::LineEnd => {
                self.gate()?;
                if self.dismiss_allowed() {
                    let result = self.host.press_key("esc");
                    self.host_result("Popup dismissal", result)?;
                    self.sleep(self.timing.list_dismiss_pause)?;
                }
                self.commit()?;
                self.progress.advance(1);
                self.report(false);
                self.prev_char = Some('\n');
                self.sleep(self.timing.list_commit_pause)
            }
            Unit::Paste(line) => {
                self.gate()?;
                self.paste_span(line)?;
                let pause =
                    self.random_between(self.timing.paste_pause_min, self.timing.paste_pause_max);
                self.sleep(pause)
            }
        }
    }

    /// Compensate for editor auto-indent when a list line sits shallower than the last one.
    fn line_start(&mut self, level: usize) -> Step {
        if level < self.indent_level {
            self.gate()?;
            for _ in level..self.indent_level {
                let result = self.host.press_key_combo(&["shift", "tab"]);
                self.host_result("Outdent", result)?;
            }
        }
        self.indent_level = level;
        Ok(())
    }

    fn run_macro(&mut self, m: &Macro) -> Step {
        match m {
            Macro::Pause { seconds } => {
                tracing::debug!("macro pause {seconds}s");
                self.sleep(Duration::from_secs_f64(*seconds))
            }
            Macro::Press { key } => {
                let result = self.host.press_key(key);
                self.host_result("Macro PRESS", result).map(drop)
            }
            Macro::Click { x, y } => {
                let result = self.host.click_at(*x, *y);
                self.host_result("Macro CLICK", result).map(drop)
            }
            Macro::Comment { text } => {
                tracing::debug!("macro comment: {text}");
                Ok(())
            }
        }
    }

    fn type_char(&mut self, ch: char) -> Step {
        self.gate()?;

        if let Some(mistake) = self.model.mistake_for(ch, &mut self.rng) {
            let result = self.host.type_character(mistake.wrong, self.timing.key_gap);
            if self.host_result("Typing", result)? {
                // Once the wrong key is out it is always taken back, even on stop.
                let held = self.sleep(mistake.hold);
                let result = self.host.press_key("backspace");
                self.host_result("Correction", result)?;
                held?;
                self.sleep(mistake.after_fix)?;
            }
        }

        self.emit_char(ch)?;
        self.progress.advance(1);
        self.report(false);

        let delay = self.model.delay_for(self.prev_char, ch, &mut self.rng);
        self.prev_char = Some(ch);
        self.sleep(delay)
    }

    /// Send one character with no humanized timing.
    fn emit_char(&mut self, ch: char) -> Step {
        match ch {
            '\n' => return self.commit(),
            '\t' => {
                let result = self.host.press_key("tab");
                return self.host_result("Tab", result).map(drop);
            }
            _ => {}
        }

        if !ch.is_ascii() && self.config.unicode_escape_typing {
            return self.unicode_entry(ch);
        }

        match self.host.type_character(ch, self.timing.key_gap) {
            Err(HostError::Unsupported(reason)) if !ch.is_ascii() => {
                tracing::debug!("no keystroke for {ch:?} ({reason}); pasting it");
                let result = self.paste_text(&ch.to_string());
                self.host_result("Typing", result).map(drop)
            }
            result => self.host_result("Typing", result).map(drop),
        }
    }

    fn commit(&mut self) -> Step {
        let result = if self.config.use_alt_newline_key {
            self.host.press_key_combo(&["shift", "enter"])
        } else {
            self.host.press_key("enter")
        };
        self.host_result("Newline", result).map(drop)
    }

    /// Ctrl+Shift+U, the code point in hex, then Space.
    fn unicode_entry(&mut self, ch: char) -> Step {
        let result = self.host.press_key_combo(&["ctrl", "shift", "u"]);
        if !self.host_result("Unicode entry", result)? {
            return Ok(());
        }
        for digit in format!("{:x}", ch as u32).chars() {
            let result = self.host.type_character(digit, self.timing.key_gap);
            self.host_result("Unicode entry", result)?;
        }
        let result = self.host.press_key("space");
        self.host_result("Unicode entry", result).map(drop)
    }

    /// Copy, paste, restore the previous clipboard.
    fn paste_text(&mut self, text: &str) -> Result<(), HostError> {
        let previous = self.host.copy_to_clipboard(text)?;
        let pasted = self.host.paste_from_clipboard();
        if let Some(previous) = previous {
            // Give the target a moment to read the clipboard before restoring it.
            let _ = self.control.sleep(self.timing.paste_pause_min);
            if let Err(err) = self.host.copy_to_clipboard(&previous) {
                tracing::debug!("failed to restore clipboard: {err}");
            }
        }
        pasted
    }

    /// Paste `text`, falling back to typing it when the paste fails.
    ///
    /// The fallback goes through [`Scheduler::type_char`], so every character
    /// is gated on the locked window and paced like ordinary typing.
    fn paste_span(&mut self, text: &str) -> Step {
        match self.paste_text(text) {
            Ok(()) => {
                self.progress.advance(text.chars().count());
                self.prev_char = text.chars().last();
                self.report(false);
                Ok(())
            }
            Err(HostError::PermissionDenied(msg)) => {
                Err(Halt::Failed(EngineError::PermissionDenied(msg)))
            }
            Err(err) => {
                tracing::warn!("paste failed: {err}");
                self.status("Paste failed; fell back to typing.");
                text.chars().try_for_each(|ch| self.type_char(ch))
            }
        }
    }
}
