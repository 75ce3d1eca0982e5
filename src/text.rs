/// Immutable input text for one run.
///
/// Line endings are normalized to `\n` on construction; nothing else is touched
/// so that tabs, indentation and macro spans survive verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    content: String,
}

impl Document {
    pub fn new(raw: &str) -> Self {
        Self {
            content: normalize_newlines(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

impl From<&str> for Document {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Document {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Fold typographic punctuation to the ASCII sequences a US keyboard can type.
pub fn ascii_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '“' | '”' => out.push('"'),
            '‘' | '’' => out.push('\''),
            '—' => out.push_str("--"),
            '…' => out.push_str("..."),
            '\u{00A0}' | '\u{202F}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Collapse runs of three or more newlines into a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for c in text.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    out
}

/// Strip trailing whitespace from every line, collapse blank-line runs and trim
/// the document ends.
pub fn clean_whitespace(text: &str) -> String {
    let normalized = normalize_newlines(text);
    let lines: Vec<&str> = normalized.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    collapse_blank_lines(&joined).trim().to_string()
}
