use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Flags shared between a run and the tasks that steer it.
///
/// Other threads only *request* transitions; the scheduler consumes the
/// requests on its own thread. Every wait is a condvar wait bounded by
/// `slice`, and request setters notify, so a stop wakes any sleeper at once.
#[derive(Debug)]
pub struct RunControl {
    stop: AtomicBool,
    finished: AtomicBool,
    pause_requested: AtomicBool,
    resume_requested: AtomicBool,
    paused: AtomicBool,
    slice: Duration,
    wake: Mutex<()>,
    signal: Condvar,
}

impl RunControl {
    pub fn new(slice: Duration) -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            resume_requested: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            slice: slice.max(Duration::from_millis(1)),
            wake: Mutex::new(()),
            signal: Condvar::new(),
        })
    }

    fn notify(&self) {
        let _guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        self.signal.notify_all();
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn request_resume(&self) {
        self.resume_requested.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.notify();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Stopped by the user or finished for any reason.
    pub fn is_halted(&self) -> bool {
        self.is_stopped() || self.is_finished()
    }

    pub fn take_pause_request(&self) -> bool {
        self.pause_requested.swap(false, Ordering::SeqCst)
    }

    pub fn take_resume_request(&self) -> bool {
        self.resume_requested.swap(false, Ordering::SeqCst)
    }

    pub fn has_pending_request(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst) || self.resume_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn slice(&self) -> Duration {
        self.slice
    }

    /// Sleep for `duration` unless the run halts first. Returns `false` if halted.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.sleep_unless(duration, || false)
    }

    /// Like [`RunControl::sleep`], also cut short when `cancelled` turns true.
    pub fn sleep_unless(&self, duration: Duration, cancelled: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_halted() || cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(self.slice);
            let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = self
                .signal
                .wait_timeout(guard, step)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most one slice, returning early on any request.
    pub fn wait_for_request(&self) {
        if self.is_halted() || self.has_pending_request() {
            return;
        }
        let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .signal
            .wait_timeout(guard, self.slice)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Cloneable handle for steering a run from another thread.
#[derive(Debug, Clone)]
pub struct Controller {
    control: Arc<RunControl>,
}

impl Controller {
    pub(crate) fn new(control: Arc<RunControl>) -> Self {
        Self { control }
    }

    pub fn pause(&self) {
        self.control.request_pause();
    }

    pub fn resume(&self) {
        self.control.request_resume();
    }

    /// Request a stop; no further host action is issued once the scheduler sees it.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }
}
