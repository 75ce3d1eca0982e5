use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::control::RunControl;
use crate::config::{EngineTiming, RunConfiguration};
use crate::events::{RunEvent, StatusSink};
use crate::host::HostAutomation;

/// Everything the auto-resume watcher needs, shared with the scheduler.
#[derive(Clone)]
pub struct WatchContext {
    pub host: Arc<dyn HostAutomation>,
    pub control: Arc<RunControl>,
    pub sink: Arc<dyn StatusSink>,
    pub config: Arc<RunConfiguration>,
    pub timing: EngineTiming,
    pub locked_title: String,
}

impl WatchContext {
    fn target_is_back(&self) -> bool {
        match self.host.focused_window_title() {
            Ok(title) => title == self.locked_title && !self.config.is_blocked(&title),
            Err(err) => {
                tracing::debug!("watcher could not read focused title: {err}");
                false
            }
        }
    }
}

/// A running auto-resume watcher. Dropping it cancels and joins the thread.
pub struct Watcher {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn spawn(ctx: WatchContext) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread = {
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name("auto-resume".to_string())
                .spawn(move || watch(&ctx, &cancel))
                .map_err(|err| tracing::warn!("failed to spawn auto-resume watcher: {err}"))
                .ok()
        };
        Self { cancel, thread }
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch(ctx: &WatchContext, cancel: &AtomicBool) {
    let cancelled = || cancel.load(Ordering::SeqCst);
    tracing::debug!("auto-resume watcher started for {:?}", ctx.locked_title);

    if !ctx.control.sleep_unless(ctx.timing.watcher_initial_delay, cancelled) {
        return;
    }

    'wait: loop {
        if !ctx.target_is_back() {
            if !ctx.control.sleep_unless(ctx.timing.watcher_poll, cancelled) {
                return;
            }
            continue;
        }

        for remaining in (1..=ctx.config.resume_grace_seconds).rev() {
            ctx.sink
                .emit(RunEvent::Status(format!("Focus restored. Resuming in {remaining}...")));
            if !ctx.control.sleep_unless(ctx.timing.grace_tick, cancelled) {
                return;
            }
            if !ctx.target_is_back() {
                tracing::debug!("focus left again during resume grace");
                ctx.sink
                    .emit(RunEvent::Status("Focus lost again. Waiting...".to_string()));
                continue 'wait;
            }
        }

        if cancelled() || ctx.control.is_halted() {
            return;
        }
        tracing::debug!("auto-resume watcher resuming run");
        ctx.control.request_resume();
        return;
    }
}
