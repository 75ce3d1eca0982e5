use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::host::{HostAutomation, HostError};
use crate::keyboard::known_key_names;

/// One host action as observed by [`SimHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Char(char),
    Key(String),
    Combo(Vec<String>),
    Move { dx: i32, dy: i32 },
    Click { x: i32, y: i32 },
    Copy(String),
    Paste(String),
}

#[derive(Debug, Default)]
struct SimState {
    buf: Vec<char>,
    clipboard: Option<String>,
    title: String,
    events: Vec<(Instant, HostEvent)>,
    /// Hex digits collected after Ctrl+Shift+U, committed by Space.
    unicode_entry: Option<String>,
    fail_paste: bool,
    deny_input: bool,
    fail_safe: bool,
}

impl SimState {
    fn insert(&mut self, c: char) {
        if let Some(hex) = self.unicode_entry.as_mut() {
            if c.is_ascii_hexdigit() {
                hex.push(c);
                return;
            }
        }
        self.buf.push(c);
    }

    fn commit_unicode_entry(&mut self) -> bool {
        let Some(hex) = self.unicode_entry.take() else {
            return false;
        };
        if let Some(c) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            self.buf.push(c);
        }
        true
    }

    fn key(&mut self, name: &str) {
        match name {
            "enter" | "return" => self.buf.push('\n'),
            "tab" => self.buf.push('\t'),
            "space" => {
                if !self.commit_unicode_entry() {
                    self.buf.push(' ');
                }
            }
            "backspace" => {
                self.buf.pop();
            }
            _ => {}
        }
    }
}

/// In-memory host: an append-only editor buffer, a clipboard and a settable
/// focused-window title. Records every action it receives.
#[derive(Debug)]
pub struct SimHost {
    state: Mutex<SimState>,
    bounds: Option<(u32, u32)>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new("Editor")
    }
}

impl SimHost {
    pub fn new(title: &str) -> Self {
        Self {
            state: Mutex::new(SimState {
                title: title.to_string(),
                ..Default::default()
            }),
            bounds: Some((1920, 1080)),
        }
    }

    pub fn with_bounds(mut self, bounds: Option<(u32, u32)>) -> Self {
        self.bounds = bounds;
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, state: &mut SimState, event: HostEvent) {
        state.events.push((Instant::now(), event));
    }

    fn gate(state: &SimState) -> Result<(), HostError> {
        if state.deny_input {
            return Err(HostError::PermissionDenied(
                "simulated host refuses input".to_string(),
            ));
        }
        Ok(())
    }

    pub fn set_focused_title(&self, title: &str) {
        self.state().title = title.to_string();
    }

    pub fn set_clipboard(&self, text: Option<&str>) {
        self.state().clipboard = text.map(str::to_string);
    }

    pub fn clipboard(&self) -> Option<String> {
        self.state().clipboard.clone()
    }

    pub fn set_fail_paste(&self, fail: bool) {
        self.state().fail_paste = fail;
    }

    pub fn set_deny_input(&self, deny: bool) {
        self.state().deny_input = deny;
    }

    pub fn set_fail_safe(&self, tripped: bool) {
        self.state().fail_safe = tripped;
    }

    /// The editor contents.
    pub fn text(&self) -> String {
        self.state().buf.iter().collect()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.state().events.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Every recorded action with the instant it arrived.
    pub fn timed_events(&self) -> Vec<(Instant, HostEvent)> {
        self.state().events.clone()
    }

    pub fn events_after(&self, instant: Instant) -> Vec<HostEvent> {
        self.state()
            .events
            .iter()
            .filter(|(at, _)| *at > instant)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }
}

impl HostAutomation for SimHost {
    fn focused_window_title(&self) -> Result<String, HostError> {
        Ok(self.state().title.clone())
    }

    fn type_character(&self, ch: char, _inter_gap: Duration) -> Result<(), HostError> {
        let mut state = self.state();
        Self::gate(&state)?;
        state.insert(ch);
        self.record(&mut state, HostEvent::Char(ch));
        Ok(())
    }

    fn press_key(&self, name: &str) -> Result<(), HostError> {
        let mut state = self.state();
        Self::gate(&state)?;
        if !known_key_names().contains(name) {
            return Err(HostError::Unsupported(format!("unknown key '{name}'")));
        }
        state.key(name);
        self.record(&mut state, HostEvent::Key(name.to_string()));
        Ok(())
    }

    fn press_key_combo(&self, names: &[&str]) -> Result<(), HostError> {
        let mut state = self.state();
        Self::gate(&state)?;
        match names {
            ["shift", "enter"] => state.buf.push('\n'),
            ["ctrl", "shift", "u"] => state.unicode_entry = Some(String::new()),
            ["ctrl", "v"] => {
                let pasted = state.clipboard.clone().unwrap_or_default();
                state.buf.extend(pasted.chars());
            }
            _ => {}
        }
        self.record(
            &mut state,
            HostEvent::Combo(names.iter().map(|n| n.to_string()).collect()),
        );
        Ok(())
    }

    fn move_pointer(&self, dx: i32, dy: i32, _duration: Duration) -> Result<(), HostError> {
        let mut state = self.state();
        if state.fail_safe {
            return Err(HostError::FailSafe);
        }
        self.record(&mut state, HostEvent::Move { dx, dy });
        Ok(())
    }

    fn click_at(&self, x: i32, y: i32) -> Result<(), HostError> {
        let mut state = self.state();
        Self::gate(&state)?;
        self.record(&mut state, HostEvent::Click { x, y });
        Ok(())
    }

    fn screen_bounds(&self) -> Option<(u32, u32)> {
        self.bounds
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<Option<String>, HostError> {
        let mut state = self.state();
        let previous = state.clipboard.replace(text.to_string());
        self.record(&mut state, HostEvent::Copy(text.to_string()));
        Ok(previous)
    }

    fn paste_from_clipboard(&self) -> Result<(), HostError> {
        let mut state = self.state();
        Self::gate(&state)?;
        if state.fail_paste {
            return Err(HostError::Failed("paste rejected by target".to_string()));
        }
        let pasted = state.clipboard.clone().unwrap_or_default();
        state.buf.extend(pasted.chars());
        self.record(&mut state, HostEvent::Paste(pasted));
        Ok(())
    }

    fn known_key_names(&self) -> HashSet<String> {
        known_key_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode_entry_sequence_inserts_code_point() {
        let host = SimHost::default();
        host.press_key_combo(&["ctrl", "shift", "u"]).unwrap();
        for c in "e9".chars() {
            host.type_character(c, Duration::ZERO).unwrap();
        }
        host.press_key("space").unwrap();
        assert_eq!(host.text(), "é");
    }

    #[test]
    fn copy_returns_previous_clipboard() {
        let host = SimHost::default();
        host.set_clipboard(Some("old"));
        assert_eq!(host.copy_to_clipboard("new").unwrap(), Some("old".to_string()));
        host.paste_from_clipboard().unwrap();
        assert_eq!(host.text(), "new");
    }
}
