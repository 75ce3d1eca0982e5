use std::io::Write as _;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, AtomEnum, ConnectionExt as _};
use x11rb::protocol::xtest::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use super::{HostAutomation, HostError};
use crate::keyboard::{keystroke_for_name, keystroke_for_output_char, KeyStroke};

/// Side length, in pixels, of the fail-safe square in each screen corner.
const FAIL_SAFE_CORNER: i32 = 2;
const TITLE_MAX_WORDS: u32 = 1024;

fn failed<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> HostError {
    move |err| HostError::Failed(format!("{what}: {err}"))
}

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8, HostError> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| HostError::Failed("evdev keycode overflow".to_string()))?;
    u8::try_from(x11).map_err(|_| {
        HostError::Failed(format!(
            "evdev keycode {evdev_keycode} out of range for X11"
        ))
    })
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 input injection requires the XTEST extension (not present on this X server)"
        ));
    }

    let _ = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());

    Ok(())
}

fn keysym_for_keycode(conn: &impl Connection, keycode: u8, index: usize) -> Result<xproto::Keysym> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    Ok(reply
        .keysyms
        .get(index)
        .copied()
        .unwrap_or(x11rb::NO_SYMBOL))
}

fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    // (evdev, unshifted, shifted); Latin-1 keysyms equal the character code.
    let checks: &[(u32, char, char)] = &[
        (crate::keyboard::KEY_A, 'a', 'A'),
        (crate::keyboard::KEY_Q, 'q', 'Q'),
        (crate::keyboard::KEY_1, '1', '!'),
        (crate::keyboard::KEY_MINUS, '-', '_'),
        (crate::keyboard::KEY_APOSTROPHE, '\'', '"'),
        (crate::keyboard::KEY_LEFTBRACE, '[', '{'),
    ];

    for (evdev, unshifted, shifted) in checks {
        let keycode = evdev_to_x11_keycode(*evdev)?;
        let got0 = keysym_for_keycode(conn, keycode, 0)?;
        let got1 = keysym_for_keycode(conn, keycode, 1)?;

        if got0 == x11rb::NO_SYMBOL || got1 == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "could not validate the X server keymap (keycode {keycode}: got {got0:#x}/{got1:#x}). \
                 Keycodes are assumed to be evdev+8 with a US layout."
            ));
        }
        if got0 != *unshifted as u32 || got1 != *shifted as u32 {
            return Err(anyhow!(
                "a US keyboard layout is required, but the X server keymap does not match \
                 (keycode {keycode}: got {got0:#x}/{got1:#x}). Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

struct Atoms {
    net_active_window: xproto::Atom,
    net_wm_name: xproto::Atom,
    utf8_string: xproto::Atom,
}

impl Atoms {
    fn intern(conn: &impl Connection) -> Result<Self> {
        let atom = |name: &[u8]| -> Result<xproto::Atom> {
            Ok(conn
                .intern_atom(false, name)
                .context("failed to intern atom")?
                .reply()
                .context("failed to read atom reply")?
                .atom)
        };
        Ok(Self {
            net_active_window: atom(b"_NET_ACTIVE_WINDOW")?,
            net_wm_name: atom(b"_NET_WM_NAME")?,
            utf8_string: atom(b"UTF8_STRING")?,
        })
    }
}

pub struct X11Host {
    conn: RustConnection,
    root: xproto::Window,
    width: u16,
    height: u16,
    atoms: Atoms,
}

impl X11Host {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;
        let atoms = Atoms::intern(&conn)?;

        let (root, width, height) = {
            let screen = conn
                .setup()
                .roots
                .get(screen_num)
                .ok_or_else(|| anyhow!("invalid X11 screen index"))?;
            (screen.root, screen.width_in_pixels, screen.height_in_pixels)
        };

        let host = Self {
            conn,
            root,
            width,
            height,
            atoms,
        };
        // A previous aborted run may have left a modifier held.
        host.reset_common_modifiers_best_effort();
        tracing::debug!("connected to X11 screen {screen_num} ({width}x{height})");
        Ok(host)
    }

    fn fake_input(&self, type_: u8, detail: u8, x: i16, y: i16) -> Result<(), HostError> {
        self.conn
            .xtest_fake_input(type_, detail, x11rb::CURRENT_TIME, self.root, x, y, 0)
            .map_err(failed("failed to send XTEST fake input"))?;
        Ok(())
    }

    fn key(&self, keycode: u32, pressed: bool) -> Result<(), HostError> {
        let type_ = if pressed {
            xproto::KEY_PRESS_EVENT
        } else {
            xproto::KEY_RELEASE_EVENT
        };
        self.fake_input(type_, evdev_to_x11_keycode(keycode)?, 0, 0)
    }

    fn flush(&self) -> Result<(), HostError> {
        self.conn
            .flush()
            .map_err(failed("failed to flush X11 connection"))
    }

    fn stroke(&self, stroke: KeyStroke, hold: Duration) -> Result<(), HostError> {
        if stroke.shift {
            self.key(crate::keyboard::KEY_LEFTSHIFT, true)?;
        }
        self.key(stroke.keycode, true)?;
        self.flush()?;
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        self.key(stroke.keycode, false)?;
        if stroke.shift {
            self.key(crate::keyboard::KEY_LEFTSHIFT, false)?;
        }
        self.flush()
    }

    fn reset_common_modifiers_best_effort(&self) {
        for keycode in [
            crate::keyboard::KEY_LEFTSHIFT,
            crate::keyboard::KEY_RIGHTSHIFT,
            crate::keyboard::KEY_LEFTCTRL,
            crate::keyboard::KEY_RIGHTCTRL,
            crate::keyboard::KEY_LEFTALT,
            crate::keyboard::KEY_RIGHTALT,
        ] {
            let _ = self.key(keycode, false);
        }
        let _ = self.conn.flush();
    }

    fn active_window(&self) -> Result<xproto::Window, HostError> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .map_err(failed("failed to request _NET_ACTIVE_WINDOW"))?
            .reply()
            .map_err(failed("failed to read _NET_ACTIVE_WINDOW"))?;

        if let Some(window) = reply
            .value32()
            .and_then(|mut v| v.next())
            .filter(|w| *w != x11rb::NONE)
        {
            return Ok(window);
        }

        // No EWMH window manager: fall back to the core input focus.
        let focus = self
            .conn
            .get_input_focus()
            .map_err(failed("failed to request input focus"))?
            .reply()
            .map_err(failed("failed to read input focus reply"))?;
        Ok(focus.focus)
    }

    fn text_property(
        &self,
        window: xproto::Window,
        property: xproto::Atom,
        type_: xproto::Atom,
    ) -> Result<String, HostError> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, TITLE_MAX_WORDS)
            .map_err(failed("failed to request window title"))?
            .reply()
            .map_err(failed("failed to read window title"))?;
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn pointer_position(&self) -> Result<(i32, i32), HostError> {
        let reply = self
            .conn
            .query_pointer(self.root)
            .map_err(failed("failed to query pointer"))?
            .reply()
            .map_err(failed("failed to read pointer position"))?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    fn in_fail_safe_corner(&self, x: i32, y: i32) -> bool {
        let w = i32::from(self.width);
        let h = i32::from(self.height);
        let near_x = x < FAIL_SAFE_CORNER || x >= w - FAIL_SAFE_CORNER;
        let near_y = y < FAIL_SAFE_CORNER || y >= h - FAIL_SAFE_CORNER;
        near_x && near_y
    }

    fn check_fail_safe(&self) -> Result<(), HostError> {
        let (x, y) = self.pointer_position()?;
        if self.in_fail_safe_corner(x, y) {
            return Err(HostError::FailSafe);
        }
        Ok(())
    }
}

impl Drop for X11Host {
    fn drop(&mut self) {
        self.reset_common_modifiers_best_effort();
    }
}

fn resolve_key(name: &str) -> Result<KeyStroke, HostError> {
    keystroke_for_name(name).ok_or_else(|| HostError::Unsupported(format!("unknown key '{name}'")))
}

fn run_xclip(args: &[&str], input: Option<&str>) -> Result<Option<String>, HostError> {
    let mut child = Command::new("xclip")
        .args(["-selection", "clipboard"])
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(if input.is_some() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostError::Unsupported(
                    "xclip not found. Install it (e.g. `sudo apt install xclip`) to use paste modes."
                        .to_string(),
                )
            } else {
                HostError::Failed(format!("failed to run xclip: {e}"))
            }
        })?;

    if let Some(text) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(failed("failed to write to xclip"))?;
        }
        let status = child.wait().map_err(failed("failed to wait for xclip"))?;
        if !status.success() {
            return Err(HostError::Failed("xclip exited with error".to_string()));
        }
        return Ok(None);
    }

    let output = child
        .wait_with_output()
        .map_err(failed("failed to read from xclip"))?;
    // An empty clipboard makes `xclip -o` fail; that is not an error here.
    Ok(output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned()))
}

impl HostAutomation for X11Host {
    fn focused_window_title(&self) -> Result<String, HostError> {
        let window = self.active_window()?;
        if window == x11rb::NONE || window == self.root {
            return Ok(String::new());
        }

        let title = self.text_property(window, self.atoms.net_wm_name, self.atoms.utf8_string)?;
        if !title.is_empty() {
            return Ok(title);
        }
        self.text_property(window, AtomEnum::WM_NAME.into(), AtomEnum::STRING.into())
    }

    fn type_character(&self, ch: char, inter_gap: Duration) -> Result<(), HostError> {
        let stroke = keystroke_for_output_char(ch)
            .ok_or_else(|| HostError::Unsupported(format!("no US keystroke for {ch:?}")))?;
        self.stroke(stroke, inter_gap)
    }

    fn press_key(&self, name: &str) -> Result<(), HostError> {
        self.stroke(resolve_key(name)?, Duration::ZERO)
    }

    fn press_key_combo(&self, names: &[&str]) -> Result<(), HostError> {
        let strokes = names
            .iter()
            .map(|name| resolve_key(name))
            .collect::<Result<Vec<_>, _>>()?;

        for stroke in &strokes {
            self.key(stroke.keycode, true)?;
        }
        self.flush()?;
        for stroke in strokes.iter().rev() {
            self.key(stroke.keycode, false)?;
        }
        self.flush()
    }

    fn move_pointer(&self, dx: i32, dy: i32, duration: Duration) -> Result<(), HostError> {
        self.check_fail_safe()?;

        let span = dx.abs().max(dy.abs()).max(1);
        let steps = (duration.as_millis() / 10).clamp(1, span as u128) as i32;
        let pause = duration / steps as u32;
        let (mut moved_x, mut moved_y) = (0, 0);
        for step in 1..=steps {
            let x = dx * step / steps;
            let y = dy * step / steps;
            let to_i16 = |v: i32| i16::try_from(v).unwrap_or(0);
            // detail 1 = relative motion
            self.fake_input(
                xproto::MOTION_NOTIFY_EVENT,
                1,
                to_i16(x - moved_x),
                to_i16(y - moved_y),
            )?;
            self.flush()?;
            moved_x = x;
            moved_y = y;
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }

        self.check_fail_safe()
    }

    fn click_at(&self, x: i32, y: i32) -> Result<(), HostError> {
        let to_i16 = |v: i32| {
            i16::try_from(v).map_err(|_| HostError::Failed(format!("click coordinate {v} out of range")))
        };
        self.fake_input(xproto::MOTION_NOTIFY_EVENT, 0, to_i16(x)?, to_i16(y)?)?;
        self.fake_input(xproto::BUTTON_PRESS_EVENT, 1, 0, 0)?;
        self.fake_input(xproto::BUTTON_RELEASE_EVENT, 1, 0, 0)?;
        self.flush()
    }

    fn screen_bounds(&self) -> Option<(u32, u32)> {
        Some((u32::from(self.width), u32::from(self.height)))
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<Option<String>, HostError> {
        let previous = run_xclip(&["-o"], None)?;
        run_xclip(&["-i"], Some(text))?;
        Ok(previous)
    }

    fn paste_from_clipboard(&self) -> Result<(), HostError> {
        self.press_key_combo(&["ctrl", "v"])
    }
}
