use std::ffi::OsString;
use std::sync::{Mutex, OnceLock};

use typereplay::host::{resolve_backend, HostBackend};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

const VARS: [&str; 3] = ["WAYLAND_DISPLAY", "WAYLAND_SOCKET", "DISPLAY"];

struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn snapshot() -> Self {
        Self {
            saved: VARS.iter().map(|name| (*name, std::env::var_os(name))).collect(),
        }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        // SAFETY: modifying the process environment is not thread-safe in general.
        // These tests serialize all env var mutations via the `env_lock()` mutex.
        for (name, value) in &self.saved {
            match value {
                Some(v) => unsafe { std::env::set_var(name, v) },
                None => unsafe { std::env::remove_var(name) },
            }
        }
    }
}

fn unset(name: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::remove_var(name) };
}

fn set(name: &str, value: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::set_var(name, value) };
}

#[test]
fn auto_uses_x11_when_display_is_set_even_under_wayland() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("WAYLAND_SOCKET");
    set("WAYLAND_DISPLAY", "wayland-1");
    set("DISPLAY", ":0");

    #[cfg(feature = "x11")]
    {
        let resolved = resolve_backend(HostBackend::Auto).expect("should resolve");
        assert_eq!(resolved, HostBackend::X11);
    }

    #[cfg(not(feature = "x11"))]
    {
        let err = resolve_backend(HostBackend::Auto).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("disabled"), "got: {msg}");
    }
}

#[test]
fn auto_rejects_wayland_without_display() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    unset("WAYLAND_SOCKET");
    unset("DISPLAY");
    set("WAYLAND_DISPLAY", "wayland-1");

    let err = resolve_backend(HostBackend::Auto).unwrap_err();
    let msg = format!("{err:#}");
    assert!(
        msg.contains("Wayland session detected"),
        "expected Wayland wording, got: {msg}"
    );
    assert!(
        msg.contains("WAYLAND_DISPLAY is set"),
        "expected environment summary, got: {msg}"
    );
}

#[test]
fn auto_errors_without_any_display() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    for name in VARS {
        unset(name);
    }

    let err = resolve_backend(HostBackend::Auto).unwrap_err();
    let msg = format!("{err:#}");
    assert!(
        msg.contains("No supported host backend detected"),
        "expected missing-backend wording, got: {msg}"
    );
}

#[test]
fn explicit_x11_is_rejected_or_accepted() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();

    for name in VARS {
        unset(name);
    }

    #[cfg(feature = "x11")]
    {
        let resolved = resolve_backend(HostBackend::X11).expect("should resolve");
        assert_eq!(resolved, HostBackend::X11);
    }

    #[cfg(not(feature = "x11"))]
    {
        let err = resolve_backend(HostBackend::X11).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("X11"));
        assert!(msg.contains("disabled"));
    }
}
