use crate::classify::looks_like_code;
use crate::config::{NewlineMode, RunConfiguration};
use crate::macros::{self, Macro, MacroContext, MacroDiagnostic, ParsedDocument, Segment};
use crate::text::{ascii_punctuation, Document};

/// One unit of scheduled work within a lap.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// Typed character by character; `\n` is a commit action, `\t` the Tab key.
    Text(String),
    Macro(Macro),
    /// Start of a list-mode line with its approximate indentation level.
    LineStart { indent_level: usize },
    /// Forced popup dismissal + commit after a list-mode line.
    LineEnd,
    /// One clipboard paste.
    Paste(String),
}

impl Unit {
    /// Characters this unit contributes to the progress total.
    pub fn output_chars(&self) -> usize {
        match self {
            Unit::Text(text) | Unit::Paste(text) => text.chars().count(),
            Unit::LineEnd => 1,
            Unit::Macro(_) | Unit::LineStart { .. } => 0,
        }
    }
}

/// The transformed document for a single lap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LapPlan {
    pub units: Vec<Unit>,
    pub expected_chars: usize,
    pub diagnostics: Vec<MacroDiagnostic>,
    /// Set when paragraph joining was requested but skipped for code-like input.
    pub join_skipped: bool,
}

impl LapPlan {
    /// The literal text this plan emits, with every commit rendered as `\n`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for unit in &self.units {
            match unit {
                Unit::Text(text) | Unit::Paste(text) => out.push_str(text),
                Unit::LineEnd => out.push('\n'),
                Unit::Macro(_) | Unit::LineStart { .. } => {}
            }
        }
        out
    }

    pub fn macro_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u, Unit::Macro(_)))
            .count()
    }
}

pub fn expected_output_chars(units: &[Unit]) -> usize {
    units.iter().map(Unit::output_chars).sum()
}

pub fn transform(document: &Document, config: &RunConfiguration, ctx: &MacroContext<'_>) -> LapPlan {
    let text = if config.ascii_punctuation {
        ascii_punctuation(document.as_str())
    } else {
        document.as_str().to_string()
    };

    let parsed = if config.macros_enabled {
        macros::parse(&text, ctx)
    } else {
        macros::literal_only(&text)
    };

    let mut join_skipped = false;
    let units = match config.newline_mode {
        NewlineMode::AsIs => text_units(parsed.segments, config.preserve_tabs),
        NewlineMode::ParagraphJoin => {
            if looks_like_code(&parsed.literal_text()) {
                join_skipped = true;
                text_units(parsed.segments, config.preserve_tabs)
            } else {
                text_units(join_paragraphs(parsed.segments), config.preserve_tabs)
            }
        }
        NewlineMode::PerLineList => list_units(&parsed, config.outdent_width as usize),
        NewlineMode::LinePaste => paste_units(&parsed, config.preserve_tabs),
    };

    LapPlan {
        expected_chars: expected_output_chars(&units),
        units,
        diagnostics: parsed.diagnostics,
        join_skipped,
    }
}

fn drop_tabs(text: &str, preserve_tabs: bool) -> String {
    if preserve_tabs {
        text.to_string()
    } else {
        text.chars().filter(|c| *c != '\t').collect()
    }
}

fn text_units(segments: Vec<Segment>, preserve_tabs: bool) -> Vec<Unit> {
    segments
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Literal(text) => {
                let text = drop_tabs(&text, preserve_tabs);
                (!text.is_empty()).then_some(Unit::Text(text))
            }
            Segment::Macro(m) => Some(Unit::Macro(m)),
        })
        .collect()
}

fn is_blank(line: &[char]) -> bool {
    line.iter().all(|c| c.is_whitespace())
}

/// Lines whose boundaries must survive joining: list items, numbered items,
/// blockquotes, headings and indented lines.
fn is_structural(line: &[char]) -> bool {
    match line.first() {
        None => return false,
        Some(' ') | Some('\t') => return true,
        _ => {}
    }

    let starts_with = |prefix: &str| {
        let prefix: Vec<char> = prefix.chars().collect();
        line.starts_with(&prefix)
    };
    if ["- ", "* ", "+ ", "• ", ">"].iter().any(|p| starts_with(p)) {
        return true;
    }
    if line[0] == '#' {
        let hashes = line.iter().take_while(|c| **c == '#').count();
        return line.get(hashes).map_or(true, |c| *c == ' ');
    }

    let digits = line.iter().take_while(|c| c.is_ascii_digit()).count();
    digits > 0
        && matches!(line.get(digits), Some('.') | Some(')'))
        && matches!(line.get(digits + 1), Some(' ') | None)
}

/// Replace single newlines between prose lines with spaces.
///
/// Only literal text takes part; macro positions are kept because the
/// rewrite is one character for one character.
fn join_paragraphs(segments: Vec<Segment>) -> Vec<Segment> {
    let flat: Vec<char> = segments
        .iter()
        .filter_map(|s| match s {
            Segment::Literal(text) => Some(text.chars()),
            Segment::Macro(_) => None,
        })
        .flatten()
        .collect();

    let mut joined = flat.clone();
    let newlines: Vec<usize> = flat
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '\n')
        .map(|(i, _)| i)
        .collect();

    for (n, &pos) in newlines.iter().enumerate() {
        let start = if n == 0 { 0 } else { newlines[n - 1] + 1 };
        let end = newlines.get(n + 1).copied().unwrap_or(flat.len());
        let before = &flat[start..pos];
        let after = &flat[pos + 1..end];
        if is_blank(before) || is_blank(after) || is_structural(before) || is_structural(after) {
            continue;
        }
        joined[pos] = ' ';
    }

    let mut out = Vec::with_capacity(segments.len());
    let mut cursor = 0usize;
    for segment in segments {
        match segment {
            Segment::Literal(text) => {
                let len = text.chars().count();
                out.push(Segment::Literal(joined[cursor..cursor + len].iter().collect()));
                cursor += len;
            }
            other => out.push(other),
        }
    }
    out
}

enum LinePiece {
    Text(String),
    Macro(Macro),
}

/// Split parsed segments into lines, attaching macros to the line they sit on.
///
/// A trailing newline does not open an extra empty line.
fn split_lines(parsed: &ParsedDocument) -> Vec<Vec<LinePiece>> {
    let mut lines: Vec<Vec<LinePiece>> = Vec::new();
    let mut current: Vec<LinePiece> = Vec::new();
    let mut open = false;

    for segment in &parsed.segments {
        match segment {
            Segment::Macro(m) => {
                current.push(LinePiece::Macro(m.clone()));
                open = true;
            }
            Segment::Literal(text) => {
                let mut parts = text.split('\n').peekable();
                while let Some(part) = parts.next() {
                    if !part.is_empty() {
                        current.push(LinePiece::Text(part.to_string()));
                        open = true;
                    }
                    if parts.peek().is_some() {
                        lines.push(std::mem::take(&mut current));
                        open = false;
                    }
                }
            }
        }
    }

    if open {
        lines.push(current);
    }
    lines
}

fn indent_width(text: &str, outdent_width: usize) -> usize {
    text.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { outdent_width } else { 1 })
        .sum()
}

fn list_units(parsed: &ParsedDocument, outdent_width: usize) -> Vec<Unit> {
    let mut units = Vec::new();

    for line in split_lines(parsed) {
        let leading: String = line
            .iter()
            .map_while(|p| match p {
                LinePiece::Text(t) => Some(t.as_str()),
                LinePiece::Macro(_) => None,
            })
            .collect();
        units.push(Unit::LineStart {
            indent_level: indent_width(&leading, outdent_width) / outdent_width.max(1),
        });

        let mut at_line_start = true;
        for piece in line {
            match piece {
                LinePiece::Macro(m) => units.push(Unit::Macro(m)),
                LinePiece::Text(t) => {
                    let t = if at_line_start {
                        t.trim_start_matches(|c: char| c.is_whitespace())
                    } else {
                        t.as_str()
                    };
                    let t = drop_tabs(t, false);
                    if !t.is_empty() {
                        at_line_start = false;
                        units.push(Unit::Text(t));
                    }
                }
            }
        }
        units.push(Unit::LineEnd);
    }

    units
}

fn paste_units(parsed: &ParsedDocument, preserve_tabs: bool) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut pending = String::new();

    let flush = |pending: &mut String, units: &mut Vec<Unit>| {
        let text = drop_tabs(pending, preserve_tabs);
        pending.clear();
        if !text.is_empty() {
            units.push(Unit::Paste(text));
        }
    };

    for segment in &parsed.segments {
        match segment {
            Segment::Macro(m) => {
                flush(&mut pending, &mut units);
                units.push(Unit::Macro(m.clone()));
            }
            Segment::Literal(text) => {
                for c in text.chars() {
                    pending.push(c);
                    if c == '\n' {
                        flush(&mut pending, &mut units);
                    }
                }
            }
        }
    }
    flush(&mut pending, &mut units);
    units
}
