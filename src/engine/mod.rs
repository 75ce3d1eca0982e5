pub mod control;
pub mod jitter;
pub mod progress;
mod scheduler;
pub mod watcher;

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

pub use control::{Controller, RunControl};
pub use progress::{format_etr, ProgressSnapshot, ProgressTracker};

use crate::config::{EngineTiming, RunConfiguration};
use crate::events::{Outcome, StatusSink};
use crate::host::HostAutomation;
use crate::text::Document;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{0}. Grant input-injection access to this session and start the run again.")]
    PermissionDenied(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub timing: EngineTiming,
    pub seed: Option<u64>,
    /// Title of the window that started the run. Target acquisition waits
    /// until focus has moved away from it.
    pub controller_title: Option<String>,
}

pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// A run executing on its own thread.
pub struct RunHandle {
    controller: Controller,
    thread: JoinHandle<Outcome>,
}

impl RunHandle {
    pub fn controller(&self) -> Controller {
        self.controller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Outcome {
        self.thread
            .join()
            .unwrap_or_else(|_| Outcome::Failed("run thread panicked".to_string()))
    }
}

/// Validate `config` and start replaying `document` into `host` on a new thread.
pub fn start(
    document: Document,
    config: RunConfiguration,
    host: Arc<dyn HostAutomation>,
    sink: Arc<dyn StatusSink>,
    options: EngineOptions,
) -> Result<RunHandle> {
    config.validate()?;

    let control = RunControl::new(options.timing.wait_slice);
    let controller = Controller::new(control.clone());
    let scheduler = scheduler::Scheduler::new(document, config, host, sink, control, options);

    let thread = std::thread::Builder::new()
        .name("typereplay-run".to_string())
        .spawn(move || scheduler.run())
        .context("failed to spawn run thread")?;

    Ok(RunHandle { controller, thread })
}
