use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::control::RunControl;
use crate::host::{HostAutomation, HostError};

const NUDGE_DURATION: Duration = Duration::from_millis(100);

/// Nudge the pointer by at most one pixel at random 0.5-3 s intervals until
/// the run halts or the pointer enters a fail-safe corner.
pub fn spawn(
    host: Arc<dyn HostAutomation>,
    control: Arc<RunControl>,
    seed: u64,
) -> Option<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("pointer-jitter".to_string())
        .spawn(move || run(host.as_ref(), &control, StdRng::seed_from_u64(seed)))
        .map_err(|err| tracing::warn!("failed to spawn pointer jitter: {err}"))
        .ok()
}

fn run(host: &dyn HostAutomation, control: &RunControl, mut rng: StdRng) {
    tracing::debug!("pointer jitter started");
    while !control.is_halted() {
        let dx = rng.gen_range(-1..=1);
        let dy = rng.gen_range(-1..=1);
        match host.move_pointer(dx, dy, NUDGE_DURATION) {
            Ok(()) => {}
            Err(HostError::FailSafe) => {
                tracing::info!("pointer in fail-safe corner; jitter stopped");
                return;
            }
            Err(err) => tracing::debug!("pointer jitter move failed: {err}"),
        }
        let wait = Duration::from_secs_f64(rng.gen_range(0.5..3.0));
        if !control.sleep(wait) {
            break;
        }
    }
    tracing::debug!("pointer jitter stopped");
}
