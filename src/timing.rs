use std::time::Duration;

use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::config::RunConfiguration;
use crate::keyboard::qwerty_adjacent_char;

pub const MIN_DELAY_SECONDS: f64 = 0.01;
pub const THINKING_PAUSE_CHANCE: f64 = 0.04;
pub const MISTAKE_CHANCE: f64 = 0.02;

const TERMINAL_PUNCTUATION: &str = ".,?!";
const BRACKETS: &str = "()[]{}";

/// A wrong adjacent key, typed and immediately corrected before the real character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mistake {
    pub wrong: char,
    /// Hold after the wrong key, before the corrective backspace.
    pub hold: Duration,
    /// Hold after the backspace, before the intended character.
    pub after_fix: Duration,
}

#[derive(Debug, Clone)]
pub struct TimingModel {
    min_seconds: f64,
    max_seconds: f64,
    pause_on_punctuation: bool,
    inject_mistakes: bool,
    shape: Beta<f64>,
}

impl TimingModel {
    pub fn new(config: &RunConfiguration) -> Self {
        let (min_seconds, max_seconds) = base_delay_range(config.min_wpm, config.max_wpm);
        Self {
            min_seconds,
            max_seconds,
            pause_on_punctuation: config.pause_on_punctuation,
            inject_mistakes: config.inject_mistakes,
            shape: Beta::new(2.5, 2.5).expect("constant beta shape is valid"),
        }
    }

    pub fn base_range(&self) -> (f64, f64) {
        (self.min_seconds, self.max_seconds)
    }

    /// Seconds to wait after emitting `ch`.
    pub fn delay_seconds(&self, prev: Option<char>, ch: char, rng: &mut impl Rng) -> f64 {
        let t = self.shape.sample(rng);
        let mut delay = self.min_seconds + (self.max_seconds - self.min_seconds) * t;

        if self.pause_on_punctuation {
            delay += punctuation_bonus(ch, rng);
        }

        if prev.is_some_and(char::is_whitespace) && rng.gen_bool(THINKING_PAUSE_CHANCE) {
            delay += rng.gen_range(0.12..0.35);
        }

        delay.max(MIN_DELAY_SECONDS)
    }

    pub fn delay_for(&self, prev: Option<char>, ch: char, rng: &mut impl Rng) -> Duration {
        Duration::from_secs_f64(self.delay_seconds(prev, ch, rng))
    }

    /// Decide whether `ch` is preceded by a self-corrected typo.
    pub fn mistake_for(&self, ch: char, rng: &mut impl Rng) -> Option<Mistake> {
        if !self.inject_mistakes {
            return None;
        }
        if !rng.gen_bool(MISTAKE_CHANCE) {
            return None;
        }
        let wrong = qwerty_adjacent_char(ch, rng)?;
        Some(Mistake {
            wrong,
            hold: Duration::from_secs_f64(rng.gen_range(0.1..0.25)),
            after_fix: Duration::from_secs_f64(rng.gen_range(0.05..0.15)),
        })
    }
}

/// `[60/(max_wpm*5), 60/(min_wpm*5)]` in seconds per character.
pub fn base_delay_range(min_wpm: u32, max_wpm: u32) -> (f64, f64) {
    let cps = |wpm: u32| f64::from(wpm.max(1)) * 5.0;
    (60.0 / cps(max_wpm), 60.0 / cps(min_wpm))
}

fn punctuation_bonus(ch: char, rng: &mut impl Rng) -> f64 {
    if TERMINAL_PUNCTUATION.contains(ch) {
        rng.gen_range(0.08..0.15)
    } else if BRACKETS.contains(ch) {
        rng.gen_range(0.1..0.3)
    } else {
        0.0
    }
}
