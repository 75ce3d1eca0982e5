use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const MAX_PAUSE_SECONDS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Macro {
    Pause { seconds: f64 },
    Press { key: String },
    Click { x: i32, y: i32 },
    Comment { text: String },
}

/// One piece of a parsed document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Macro(Macro),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("PAUSE must be non-negative")]
    NegativePause,

    #[error("Invalid PAUSE duration: '{0}'")]
    InvalidPause(String),

    #[error("PRESS requires a key name")]
    MissingKey,

    #[error("Unknown key for PRESS: '{0}'")]
    UnknownKey(String),

    #[error("Invalid CLICK params, expected 'x,y' got '{0}'")]
    InvalidClick(String),

    #[error("CLICK coordinates out of bounds: {x},{y}")]
    ClickOutOfBounds { x: i32, y: i32 },

    #[error("Unknown macro: '{0}'")]
    UnknownCommand(String),
}

/// A macro that failed validation and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDiagnostic {
    pub source: String,
    pub error: MacroError,
}

/// What macro validation needs to know about the host.
#[derive(Debug, Clone, Copy)]
pub struct MacroContext<'a> {
    pub known_keys: &'a HashSet<String>,
    pub screen_bounds: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub segments: Vec<Segment>,
    pub diagnostics: Vec<MacroDiagnostic>,
}

impl ParsedDocument {
    /// The literal spans joined together, without any macro text.
    pub fn literal_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Literal(text) => Some(text.as_str()),
                Segment::Macro(_) => None,
            })
            .collect()
    }
}

fn macro_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\{\{(PAUSE|PRESS|CLICK|COMMENT):([^}]*)\}\}")
            .expect("macro grammar must compile")
    })
}

/// Split `text` into literal spans and validated macros.
///
/// Macros that fail validation are dropped (not re-inserted as text) and
/// reported in `diagnostics`.
pub fn parse(text: &str, ctx: &MacroContext<'_>) -> ParsedDocument {
    let mut out = ParsedDocument::default();
    let mut last = 0usize;

    for caps in macro_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            out.segments
                .push(Segment::Literal(text[last..whole.start()].to_string()));
        }
        last = whole.end();

        let command = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let params = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        match validate(command, params, ctx) {
            Ok(m) => out.segments.push(Segment::Macro(m)),
            Err(error) => {
                tracing::debug!("dropping macro {}: {error}", whole.as_str());
                out.diagnostics.push(MacroDiagnostic {
                    source: whole.as_str().to_string(),
                    error,
                });
            }
        }
    }

    if last < text.len() {
        out.segments.push(Segment::Literal(text[last..].to_string()));
    }

    out
}

/// `text` with every `{{...}}` macro span removed, valid or not.
pub fn strip_macros(text: &str) -> Cow<'_, str> {
    macro_regex().replace_all(text, "")
}

/// The whole document as one literal segment (macro processing disabled).
pub fn literal_only(text: &str) -> ParsedDocument {
    let segments = if text.is_empty() {
        Vec::new()
    } else {
        vec![Segment::Literal(text.to_string())]
    };
    ParsedDocument {
        segments,
        diagnostics: Vec::new(),
    }
}

pub fn validate(command: &str, params: &str, ctx: &MacroContext<'_>) -> Result<Macro, MacroError> {
    let params = params.trim();
    match command.trim().to_ascii_uppercase().as_str() {
        "PAUSE" => {
            let seconds: f64 = params
                .parse()
                .map_err(|_| MacroError::InvalidPause(params.to_string()))?;
            if seconds.is_nan() {
                return Err(MacroError::InvalidPause(params.to_string()));
            }
            if seconds < 0.0 {
                return Err(MacroError::NegativePause);
            }
            Ok(Macro::Pause {
                seconds: seconds.min(MAX_PAUSE_SECONDS),
            })
        }
        "PRESS" => {
            let key = params.to_lowercase();
            if key.is_empty() {
                return Err(MacroError::MissingKey);
            }
            if !ctx.known_keys.contains(&key) {
                return Err(MacroError::UnknownKey(key));
            }
            Ok(Macro::Press { key })
        }
        "CLICK" => {
            let invalid = || MacroError::InvalidClick(params.to_string());
            let (x, y) = params.split_once(',').ok_or_else(invalid)?;
            let x: i32 = x.trim().parse().map_err(|_| invalid())?;
            let y: i32 = y.trim().parse().map_err(|_| invalid())?;
            if let Some((w, h)) = ctx.screen_bounds {
                let inside = x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h;
                if !inside {
                    return Err(MacroError::ClickOutOfBounds { x, y });
                }
            }
            Ok(Macro::Click { x, y })
        }
        "COMMENT" => Ok(Macro::Comment {
            text: params.to_string(),
        }),
        other => Err(MacroError::UnknownCommand(other.to_string())),
    }
}
