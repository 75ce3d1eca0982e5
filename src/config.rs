use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_WPM: u32 = 80;
pub const DEFAULT_MAX_WPM: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewlineMode {
    /// Every character as-is; newlines become a commit action.
    #[default]
    AsIs,
    /// Single newlines inside a paragraph become spaces.
    ParagraphJoin,
    /// One line at a time, leading indentation stripped, forced commit per line.
    PerLineList,
    /// Each line goes through the clipboard as one paste.
    LinePaste,
}

impl fmt::Display for NewlineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NewlineMode::AsIs => "as-is",
            NewlineMode::ParagraphJoin => "paragraph-join",
            NewlineMode::PerLineList => "per-line-list",
            NewlineMode::LinePaste => "line-paste",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfiguration {
    pub laps: u32,
    pub start_delay_seconds: u32,
    pub min_wpm: u32,
    pub max_wpm: u32,
    pub newline_mode: NewlineMode,
    pub use_alt_newline_key: bool,
    pub preserve_tabs: bool,
    pub inject_mistakes: bool,
    pub pause_on_punctuation: bool,
    pub dismiss_popup_before_enter: bool,
    pub background_pointer_jitter: bool,
    pub prefer_paste_over_keystrokes: bool,
    pub unicode_escape_typing: bool,
    pub compliance_mode_enabled: bool,
    pub blocked_app_names: BTreeSet<String>,
    pub macros_enabled: bool,
    pub auto_optimize: bool,
    pub ascii_punctuation: bool,
    pub outdent_width: u32,
    pub resume_grace_seconds: u32,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            laps: 1,
            start_delay_seconds: 3,
            min_wpm: DEFAULT_MIN_WPM,
            max_wpm: DEFAULT_MAX_WPM,
            newline_mode: NewlineMode::AsIs,
            use_alt_newline_key: false,
            preserve_tabs: true,
            inject_mistakes: false,
            pause_on_punctuation: false,
            dismiss_popup_before_enter: false,
            background_pointer_jitter: false,
            prefer_paste_over_keystrokes: false,
            unicode_escape_typing: false,
            compliance_mode_enabled: false,
            blocked_app_names: BTreeSet::new(),
            macros_enabled: true,
            auto_optimize: false,
            ascii_punctuation: true,
            outdent_width: 4,
            resume_grace_seconds: 2,
        }
    }
}

impl RunConfiguration {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.laps >= 1, "laps must be >= 1");
        ensure!(self.min_wpm >= 1, "min_wpm must be >= 1");
        ensure!(self.min_wpm <= self.max_wpm, "min_wpm must be <= max_wpm");
        ensure!(self.outdent_width >= 1, "outdent_width must be >= 1");
        Ok(())
    }

    /// True when compliance mode is on and `title` contains a blocked app name.
    pub fn is_blocked(&self, title: &str) -> bool {
        if !self.compliance_mode_enabled {
            return false;
        }
        let title = title.to_lowercase();
        self.blocked_app_names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .any(|name| title.contains(&name))
    }
}

pub fn load_config(path: &Path) -> Result<RunConfiguration> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: RunConfiguration =
        serde_json::from_str(&json).context("failed to parse run configuration JSON")?;
    config.validate()?;
    tracing::debug!("loaded run configuration from {}", path.display());
    Ok(config)
}

/// Timer constants used by the scheduler and its helper tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Upper bound on any single blocking wait; stop requests are seen within one slice.
    pub wait_slice: Duration,
    pub progress_throttle: Duration,
    pub resume_settle: Duration,
    pub countdown_tick: Duration,
    pub acquire_poll: Duration,
    pub watcher_initial_delay: Duration,
    pub watcher_poll: Duration,
    pub grace_tick: Duration,
    pub lap_pause: Duration,
    pub list_dismiss_pause: Duration,
    pub list_commit_pause: Duration,
    pub paste_pause_min: Duration,
    pub paste_pause_max: Duration,
    pub key_gap: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            wait_slice: Duration::from_millis(20),
            progress_throttle: Duration::from_millis(50),
            resume_settle: Duration::from_millis(250),
            countdown_tick: Duration::from_secs(1),
            acquire_poll: Duration::from_millis(100),
            watcher_initial_delay: Duration::from_millis(500),
            watcher_poll: Duration::from_millis(250),
            grace_tick: Duration::from_secs(1),
            lap_pause: Duration::from_millis(500),
            list_dismiss_pause: Duration::from_millis(50),
            list_commit_pause: Duration::from_millis(100),
            paste_pause_min: Duration::from_millis(50),
            paste_pause_max: Duration::from_millis(150),
            key_gap: Duration::from_millis(2),
        }
    }
}

impl EngineTiming {
    /// Millisecond-scale timers for tests and previews.
    pub fn fast() -> Self {
        Self {
            wait_slice: Duration::from_millis(2),
            progress_throttle: Duration::from_millis(5),
            resume_settle: Duration::from_millis(2),
            countdown_tick: Duration::from_millis(5),
            acquire_poll: Duration::from_millis(2),
            watcher_initial_delay: Duration::from_millis(2),
            watcher_poll: Duration::from_millis(2),
            grace_tick: Duration::from_millis(20),
            lap_pause: Duration::from_millis(2),
            list_dismiss_pause: Duration::ZERO,
            list_commit_pause: Duration::ZERO,
            paste_pause_min: Duration::ZERO,
            paste_pause_max: Duration::from_millis(1),
            key_gap: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        RunConfiguration::default().validate().expect("defaults should validate");
    }

    #[test]
    fn rejects_inverted_wpm_range() {
        let cfg = RunConfiguration {
            min_wpm: 90,
            max_wpm: 60,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("min_wpm"));
    }

    #[test]
    fn blocklist_matches_case_insensitive_substrings_only_in_compliance_mode() {
        let mut cfg = RunConfiguration {
            blocked_app_names: ["Zoom".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(!cfg.is_blocked("zoom meeting"));

        cfg.compliance_mode_enabled = true;
        assert!(cfg.is_blocked("Zoom Meeting"));
        assert!(!cfg.is_blocked("Text Editor"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: RunConfiguration =
            serde_json::from_str(r#"{"laps": 3, "newlineMode": "per-line-list"}"#)
                .expect("json should parse");
        assert_eq!(cfg.laps, 3);
        assert_eq!(cfg.newline_mode, NewlineMode::PerLineList);
        assert_eq!(cfg.min_wpm, DEFAULT_MIN_WPM);
        assert!(cfg.macros_enabled);
    }
}
