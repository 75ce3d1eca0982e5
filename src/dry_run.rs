use std::time::Duration;

use rand::Rng;

use crate::config::{EngineTiming, RunConfiguration};
use crate::engine::RunControl;
use crate::keyboard::known_key_names;
use crate::macros::{Macro, MacroContext, MacroDiagnostic};
use crate::policy::{self, Unit};
use crate::text::Document;
use crate::timing::TimingModel;

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewStep {
    Char(char),
    /// A wrong adjacent key that is corrected by the following `Correction`.
    Mistake(char),
    Correction,
    Commit,
    Dismiss,
    Outdent,
    Paste(String),
    Macro(Macro),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep for every drawn delay.
    Realtime,
    /// Report delays without sleeping.
    Instant,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewReport {
    /// The text a target editor would end up with.
    pub output: String,
    pub expected_chars: usize,
    pub simulated_seconds: f64,
    pub mistakes: usize,
    pub diagnostics: Vec<MacroDiagnostic>,
    pub cancelled: bool,
}

struct Preview<'a, F> {
    model: TimingModel,
    config: &'a RunConfiguration,
    timing: &'a EngineTiming,
    pacing: Pacing,
    control: &'a RunControl,
    observer: F,
    report: PreviewReport,
    prev: Option<char>,
}

impl<F: FnMut(&PreviewStep, Duration)> Preview<'_, F> {
    fn step(&mut self, step: PreviewStep, delay: Duration) -> bool {
        if self.control.is_stopped() {
            self.report.cancelled = true;
            return false;
        }
        match &step {
            PreviewStep::Char(c) => self.report.output.push(*c),
            PreviewStep::Commit => self.report.output.push('\n'),
            PreviewStep::Paste(text) => self.report.output.push_str(text),
            PreviewStep::Mistake(_) => self.report.mistakes += 1,
            _ => {}
        }
        (self.observer)(&step, delay);
        self.wait(delay);
        true
    }

    fn wait(&mut self, delay: Duration) {
        self.report.simulated_seconds += delay.as_secs_f64();
        if self.pacing == Pacing::Realtime {
            self.control.sleep(delay);
        }
    }

    fn char(&mut self, ch: char, rng: &mut impl Rng) -> bool {
        if let Some(m) = self.model.mistake_for(ch, rng) {
            if !self.step(PreviewStep::Mistake(m.wrong), m.hold)
                || !self.step(PreviewStep::Correction, m.after_fix)
            {
                return false;
            }
        }
        let delay = self.model.delay_for(self.prev, ch, rng);
        self.prev = Some(ch);
        let step = if ch == '\n' {
            PreviewStep::Commit
        } else {
            PreviewStep::Char(ch)
        };
        self.step(step, delay)
    }

    fn paste(&mut self, text: &str, rng: &mut impl Rng) -> bool {
        let (lo, hi) = (self.timing.paste_pause_min, self.timing.paste_pause_max);
        let pause = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        self.prev = text.chars().last();
        self.step(PreviewStep::Paste(text.to_string()), pause)
    }

    fn unit(&mut self, unit: &Unit, indent: &mut usize, rng: &mut impl Rng) -> bool {
        match unit {
            Unit::Text(text) if self.config.prefer_paste_over_keystrokes => self.paste(text, rng),
            Unit::Text(text) => text.chars().all(|ch| self.char(ch, rng)),
            Unit::Paste(text) => self.paste(text, rng),
            Unit::Macro(m) => {
                let delay = match m {
                    Macro::Pause { seconds } => Duration::from_secs_f64(*seconds),
                    _ => Duration::ZERO,
                };
                self.step(PreviewStep::Macro(m.clone()), delay)
            }
            Unit::LineStart { indent_level } => {
                let outdents = indent.saturating_sub(*indent_level);
                *indent = *indent_level;
                (0..outdents).all(|_| self.step(PreviewStep::Outdent, Duration::ZERO))
            }
            Unit::LineEnd => {
                if self.config.dismiss_popup_before_enter
                    && !self.step(PreviewStep::Dismiss, self.timing.list_dismiss_pause)
                {
                    return false;
                }
                self.prev = Some('\n');
                self.step(PreviewStep::Commit, self.timing.list_commit_pause)
            }
        }
    }
}

/// Replay `document` to `observer` with the same transform and timing as a
/// live run, but without touching any host. A stop requested on `control`
/// cancels the preview at the next step.
pub fn preview(
    document: &Document,
    config: &RunConfiguration,
    timing: &EngineTiming,
    pacing: Pacing,
    control: &RunControl,
    rng: &mut impl Rng,
    observer: impl FnMut(&PreviewStep, Duration),
) -> PreviewReport {
    let known_keys = known_key_names();
    let ctx = MacroContext {
        known_keys: &known_keys,
        screen_bounds: None,
    };
    let plan = policy::transform(document, config, &ctx);

    let mut preview = Preview {
        model: TimingModel::new(config),
        config,
        timing,
        pacing,
        control,
        observer,
        report: PreviewReport {
            expected_chars: plan.expected_chars * config.laps as usize,
            diagnostics: plan.diagnostics.clone(),
            ..Default::default()
        },
        prev: None,
    };

    'laps: for lap in 1..=config.laps {
        if lap > 1 {
            preview.wait(timing.lap_pause);
        }
        let mut indent = 0usize;
        preview.prev = None;
        for unit in &plan.units {
            if !preview.unit(unit, &mut indent, rng) {
                break 'laps;
            }
        }
    }

    preview.report
}
