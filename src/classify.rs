use std::fmt;

use crate::config::{NewlineMode, RunConfiguration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Code,
    Math,
    Prose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    CodeEditor,
    Chat,
    PlainEditor,
    Browser,
    Unknown,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowKind::CodeEditor => "Code editor",
            WindowKind::Chat => "Chat app",
            WindowKind::PlainEditor => "Plain text editor",
            WindowKind::Browser => "Browser",
            WindowKind::Unknown => "Unknown window",
        };
        f.write_str(name)
    }
}

pub struct CodeRules {
    pub keywords: &'static [&'static str],
    pub block_markers: &'static [&'static str],
    pub symbols: &'static str,
    /// Only the first `sample_chars` characters are scanned for symbol density.
    pub sample_chars: usize,
    pub min_sample_chars: usize,
    pub symbol_density: f64,
    pub keyword_hits: usize,
    pub terminated_line_share: f64,
    pub indented_line_share: f64,
    pub min_lines_for_shares: usize,
    pub score_threshold: u32,
}

pub struct MathRules {
    pub markup_tokens: &'static [&'static str],
    pub symbols: &'static str,
    pub symbol_density: f64,
    pub exponent_markers: &'static str,
    pub operators: &'static str,
    pub score_threshold: u32,
}

pub const CODE_RULES: CodeRules = CodeRules {
    keywords: &[
        "def ",
        "elif ",
        "import ",
        "#include",
        "function ",
        "function(",
        "fn ",
        "=>",
        "->",
        "console.",
        "printf(",
        "System.out",
        "public static",
        "private ",
        "std::",
        "self.",
        "this.",
        "#!/",
        "</",
        "return;",
        "null;",
        "const ",
        "var ",
        "let mut",
        "impl ",
        "struct ",
        "async ",
        "await ",
        "lambda ",
        "try:",
        "except ",
        "#define",
    ],
    block_markers: &["```", "~~~"],
    symbols: "{}[]();=<>*/\\|&^%$#@~`",
    sample_chars: 2000,
    min_sample_chars: 20,
    symbol_density: 0.08,
    keyword_hits: 2,
    terminated_line_share: 0.3,
    indented_line_share: 0.3,
    min_lines_for_shares: 3,
    score_threshold: 3,
};

pub const MATH_RULES: MathRules = MathRules {
    markup_tokens: &[
        "\\frac",
        "\\sum",
        "\\int",
        "\\sqrt",
        "\\alpha",
        "\\beta",
        "\\theta",
        "\\pi",
        "\\cdot",
        "\\times",
        "\\leq",
        "\\geq",
        "\\infty",
        "\\begin{equation}",
        "\\begin{align}",
        "$$",
        "\\(",
        "\\[",
    ],
    symbols: "∑∫√π∞≈≠≤≥±×÷∂∆∇∈∉⊂⊆∪∩→⇒⇔∀∃αβγδθλμσφω²³¹⁰ⁿ₀₁₂",
    symbol_density: 0.02,
    exponent_markers: "^_",
    operators: "=+-*/<>",
    score_threshold: 2,
};

/// Window-title keywords by category, in precedence order.
///
/// Browsers come first: a popup-dismissal Escape inside a browser can cancel navigation.
pub const TITLE_RULES: &[(WindowKind, &[&str])] = &[
    (
        WindowKind::Browser,
        &[
            "safari",
            "chrome",
            "firefox",
            "microsoft edge",
            "brave",
            "opera",
            "chromium",
        ],
    ),
    (
        WindowKind::CodeEditor,
        &[
            "code",
            "pycharm",
            "intellij",
            "webstorm",
            "clion",
            "goland",
            "xcode",
            "sublime",
            "atom",
            "notepad++",
            "vim",
            "emacs",
        ],
    ),
    (
        WindowKind::Chat,
        &[
            "slack", "teams", "discord", "skype", "telegram", "whatsapp", "wechat", "messages",
            "imessage",
        ],
    ),
    (
        WindowKind::PlainEditor,
        &["notepad", "textedit", "notes", "gedit", "kate", "mousepad"],
    ),
];

pub fn classify_window_title(title: &str) -> WindowKind {
    let title = title.to_lowercase();
    TITLE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| title.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(WindowKind::Unknown)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CodeSignals {
    pub has_block_marker: bool,
    pub has_tab: bool,
    pub keyword_hits: usize,
    pub symbol_density: f64,
    pub terminated_line_share: f64,
    pub indented_line_share: f64,
    pub line_count: usize,
}

pub fn code_signals(text: &str, rules: &CodeRules) -> CodeSignals {
    let sample: Vec<char> = text.chars().take(rules.sample_chars).collect();
    let non_ws = sample.iter().filter(|c| !c.is_whitespace()).count();
    let symbol_count = sample.iter().filter(|c| rules.symbols.contains(**c)).count();
    let symbol_density = if non_ws >= rules.min_sample_chars {
        symbol_count as f64 / non_ws as f64
    } else {
        0.0
    };

    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let line_count = lines.len();
    let share = |pred: &dyn Fn(&str) -> bool| -> f64 {
        if line_count == 0 {
            return 0.0;
        }
        lines.iter().filter(|l| pred(l)).count() as f64 / line_count as f64
    };

    CodeSignals {
        has_block_marker: rules.block_markers.iter().any(|m| text.contains(m)),
        has_tab: text.contains('\t'),
        keyword_hits: rules.keywords.iter().filter(|k| text.contains(*k)).count(),
        symbol_density,
        terminated_line_share: share(&|l| {
            let l = l.trim_end();
            l.ends_with(';') || l.ends_with('{') || l.ends_with('}')
        }),
        indented_line_share: share(&|l| l.starts_with('\t') || l.starts_with("  ")),
        line_count,
    }
}

/// The quick gate used before paragraph joining: keyword hits or symbol density.
pub fn looks_like_code(text: &str) -> bool {
    let s = code_signals(text, &CODE_RULES);
    s.keyword_hits >= CODE_RULES.keyword_hits || s.symbol_density >= CODE_RULES.symbol_density
}

fn code_score(s: &CodeSignals, rules: &CodeRules) -> u32 {
    let mut score = 0u32;
    if s.has_block_marker {
        score += 2;
    }
    if s.has_tab {
        score += 1;
    }
    score += s.keyword_hits.min(3) as u32;
    if s.symbol_density >= rules.symbol_density {
        score += 2;
    }
    if s.line_count >= rules.min_lines_for_shares {
        if s.terminated_line_share >= rules.terminated_line_share {
            score += 1;
        }
        if s.indented_line_share >= rules.indented_line_share {
            score += 1;
        }
    }
    score
}

fn math_score(text: &str, rules: &MathRules) -> u32 {
    let mut score = 0u32;
    if rules.markup_tokens.iter().any(|t| text.contains(t)) {
        score += 2;
    }

    let non_ws = text.chars().filter(|c| !c.is_whitespace()).count();
    let symbols = text.chars().filter(|c| rules.symbols.contains(*c)).count();
    if non_ws > 0 && symbols as f64 / non_ws as f64 >= rules.symbol_density {
        score += 2;
    }

    let co_occurring = text
        .lines()
        .filter(|l| {
            l.chars().any(|c| rules.exponent_markers.contains(c))
                && l.chars().any(|c| rules.operators.contains(c))
        })
        .count();
    score += co_occurring.min(2) as u32;
    score
}

pub fn classify(text: &str) -> ContentKind {
    let signals = code_signals(text, &CODE_RULES);
    if code_score(&signals, &CODE_RULES) >= CODE_RULES.score_threshold
        || signals.keyword_hits >= CODE_RULES.keyword_hits
    {
        return ContentKind::Code;
    }
    if math_score(text, &MATH_RULES) >= MATH_RULES.score_threshold {
        return ContentKind::Math;
    }
    ContentKind::Prose
}

/// Adjust `config` once for the acquired target window and the document content.
///
/// An explicit `LinePaste` selection is never replaced.
pub fn auto_optimize(
    config: &mut RunConfiguration,
    window: WindowKind,
    content: ContentKind,
) -> bool {
    let keep_mode = config.newline_mode == NewlineMode::LinePaste;
    let set_mode = |config: &mut RunConfiguration, mode: NewlineMode| {
        if !keep_mode {
            config.newline_mode = mode;
        }
    };

    let changed = match window {
        WindowKind::CodeEditor => {
            set_mode(config, NewlineMode::PerLineList);
            config.dismiss_popup_before_enter = true;
            config.use_alt_newline_key = false;
            config.preserve_tabs = false;
            config.inject_mistakes = false;
            config.pause_on_punctuation = true;
            true
        }
        WindowKind::Chat => {
            set_mode(config, NewlineMode::ParagraphJoin);
            config.use_alt_newline_key = true;
            config.dismiss_popup_before_enter = false;
            config.inject_mistakes = true;
            config.pause_on_punctuation = false;
            true
        }
        WindowKind::PlainEditor => {
            set_mode(config, NewlineMode::AsIs);
            config.dismiss_popup_before_enter = false;
            config.use_alt_newline_key = false;
            config.preserve_tabs = true;
            config.inject_mistakes = false;
            config.pause_on_punctuation = true;
            true
        }
        WindowKind::Browser => {
            if config.newline_mode == NewlineMode::AsIs {
                config.newline_mode = NewlineMode::ParagraphJoin;
            }
            config.dismiss_popup_before_enter = false;
            true
        }
        WindowKind::Unknown => false,
    };

    match content {
        ContentKind::Code | ContentKind::Math => {
            config.inject_mistakes = false;
            if config.newline_mode == NewlineMode::ParagraphJoin && !keep_mode {
                config.newline_mode = NewlineMode::AsIs;
            }
            true
        }
        ContentKind::Prose => changed,
    }
}
