#[cfg(feature = "x11")]
pub mod x11;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Input injection is not permitted: {0}")]
    PermissionDenied(String),

    #[error("Not supported by this host: {0}")]
    Unsupported(String),

    #[error("Pointer entered a fail-safe corner of the screen")]
    FailSafe,

    #[error("{0}")]
    Failed(String),
}

/// The primitive input and window capabilities the engine drives.
///
/// Implementations are shared between the scheduler, the pointer jitter task
/// and the auto-resume watcher, so every method takes `&self`.
pub trait HostAutomation: Send + Sync {
    fn focused_window_title(&self) -> Result<String, HostError>;

    /// Press and release the key(s) for `ch`, waiting `inter_gap` while held.
    fn type_character(&self, ch: char, inter_gap: Duration) -> Result<(), HostError>;

    fn press_key(&self, name: &str) -> Result<(), HostError>;

    /// Hold `names` down in order, then release them in reverse.
    fn press_key_combo(&self, names: &[&str]) -> Result<(), HostError>;

    fn move_pointer(&self, dx: i32, dy: i32, duration: Duration) -> Result<(), HostError>;

    fn click_at(&self, x: i32, y: i32) -> Result<(), HostError>;

    fn screen_bounds(&self) -> Option<(u32, u32)>;

    /// Replace the clipboard with `text`, returning what it held before.
    fn copy_to_clipboard(&self, text: &str) -> Result<Option<String>, HostError>;

    fn paste_from_clipboard(&self) -> Result<(), HostError>;

    fn known_key_names(&self) -> HashSet<String> {
        crate::keyboard::known_key_names()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBackend {
    Auto,
    X11,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn wayland_session() -> bool {
    env_is_set("WAYLAND_DISPLAY") || env_is_set("WAYLAND_SOCKET")
}

pub fn backend_unavailable_message() -> String {
    let xdg_session_type = std::env::var("XDG_SESSION_TYPE").unwrap_or_default();

    let mut parts = Vec::new();
    if env_is_set("WAYLAND_DISPLAY") {
        parts.push("WAYLAND_DISPLAY is set".to_string());
    }
    if env_is_set("WAYLAND_SOCKET") {
        parts.push("WAYLAND_SOCKET is set".to_string());
    }
    if env_is_set("DISPLAY") {
        parts.push("DISPLAY is set".to_string());
    }
    if !xdg_session_type.is_empty() {
        parts.push(format!("XDG_SESSION_TYPE={xdg_session_type}"));
    }

    if parts.is_empty() {
        "No display session detected (expected X11 environment variables).".to_string()
    } else {
        format!("Detected environment: {}", parts.join(", "))
    }
}

fn auto_backend() -> Result<HostBackend> {
    if env_is_set("DISPLAY") {
        if wayland_session() {
            // Through XWayland only X11 clients receive XTEST input.
            tracing::warn!("Wayland session with DISPLAY set; only XWayland windows can be typed into");
        }
        return Ok(HostBackend::X11);
    }

    if wayland_session() {
        return Err(anyhow!(
            "Wayland session detected without an X display. Input injection needs an X11 session \
             (or an XWayland DISPLAY). {}",
            backend_unavailable_message()
        ));
    }

    Err(anyhow!(
        "No supported host backend detected. {}",
        backend_unavailable_message()
    ))
}

pub fn resolve_backend(requested: HostBackend) -> Result<HostBackend> {
    let resolved = match requested {
        HostBackend::Auto => auto_backend()?,
        other => other,
    };

    match resolved {
        HostBackend::X11 if cfg!(feature = "x11") => Ok(resolved),
        HostBackend::X11 => {
            let how = match requested {
                HostBackend::Auto => "detected",
                HostBackend::X11 => "requested",
            };
            Err(anyhow!(
                "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.) {}",
                backend_unavailable_message()
            ))
        }
        HostBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}

pub fn open_host(requested: HostBackend) -> Result<Box<dyn HostAutomation>> {
    match resolve_backend(requested)? {
        HostBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Box::new(x11::X11Host::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        HostBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}
