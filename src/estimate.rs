use crate::config::{NewlineMode, RunConfiguration};
use crate::text::Document;

/// Rough low/high run duration in seconds, start delay included.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DurationEstimate {
    pub low_seconds: f64,
    pub high_seconds: f64,
}

impl DurationEstimate {
    pub fn is_empty(&self) -> bool {
        self.low_seconds == 0.0 && self.high_seconds == 0.0
    }
}

pub fn estimate_duration(document: &Document, config: &RunConfiguration) -> DurationEstimate {
    let text = document.as_str();
    if text.is_empty() {
        return DurationEstimate::default();
    }

    let min_wpm = config.min_wpm.max(1);
    let max_wpm = config.max_wpm.max(min_wpm);
    let chars = document.char_count() as f64;
    let lines = text.lines().count().max(1) as f64;
    let paste = config.prefer_paste_over_keystrokes;

    let (low, high) = match config.newline_mode {
        NewlineMode::LinePaste => (lines * 0.08, lines * 0.15),
        NewlineMode::PerLineList if paste => (lines * 0.08, lines * 0.15),
        _ if paste => (chars / 2000.0 + 0.2, chars / 1200.0 + 0.5),
        mode => {
            let fastest_cps = f64::from(max_wpm) * 5.0 / 60.0;
            let slowest_cps = f64::from(min_wpm) * 5.0 / 60.0;
            let (low, high) = (chars / fastest_cps, chars / slowest_cps);
            // Punctuation and line-commit pauses.
            if matches!(mode, NewlineMode::ParagraphJoin | NewlineMode::PerLineList) {
                (low * 1.03, high * 1.08)
            } else {
                (low, high)
            }
        }
    };

    let laps = f64::from(config.laps.max(1));
    let delay = f64::from(config.start_delay_seconds);
    DurationEstimate {
        low_seconds: low * laps + delay,
        high_seconds: high * laps + delay,
    }
}
