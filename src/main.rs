use std::fs;
use std::io::{self, BufRead, Read, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use typereplay::classify::{classify, classify_window_title};
use typereplay::config::{load_config, EngineTiming, NewlineMode, RunConfiguration};
use typereplay::console::{escape_for_log, ConsoleSink};
use typereplay::dry_run::{preview, Pacing, PreviewStep};
use typereplay::engine::{self, rng_from_seed, Controller, EngineOptions, RunControl};
use typereplay::estimate::estimate_duration;
use typereplay::events::Outcome;
use typereplay::host::{open_host, HostAutomation, HostBackend};
use typereplay::keyboard::known_key_names;
use typereplay::macros::MacroContext;
use typereplay::policy::{transform, Unit};
use typereplay::text::{clean_whitespace, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NewlineModeArg {
    /// Type every character; newlines press Enter.
    AsIs,
    /// Join single newlines inside paragraphs with a space.
    ParagraphJoin,
    /// One line at a time with indentation stripped (code editors).
    PerLineList,
    /// Paste one line at a time through the clipboard.
    LinePaste,
}

impl NewlineModeArg {
    fn to_library(self) -> NewlineMode {
        match self {
            NewlineModeArg::AsIs => NewlineMode::AsIs,
            NewlineModeArg::ParagraphJoin => NewlineMode::ParagraphJoin,
            NewlineModeArg::PerLineList => NewlineMode::PerLineList,
            NewlineModeArg::LinePaste => NewlineMode::LinePaste,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HostBackendArg {
    Auto,
    X11,
}

impl HostBackendArg {
    fn to_library(self) -> HostBackend {
        match self {
            HostBackendArg::Auto => HostBackend::Auto,
            HostBackendArg::X11 => HostBackend::X11,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    /// Input text file, or '-' for stdin
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// JSON run configuration. Flags below override values from the file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long)]
    laps: Option<u32>,

    /// Countdown seconds before typing starts
    #[arg(long)]
    delay: Option<u32>,

    #[arg(long)]
    wpm_min: Option<u32>,

    #[arg(long)]
    wpm_max: Option<u32>,

    #[arg(long, value_enum)]
    mode: Option<NewlineModeArg>,

    /// Commit lines with Shift+Enter instead of Enter
    #[arg(long)]
    shift_enter: bool,

    /// Drop tab characters instead of pressing Tab
    #[arg(long)]
    strip_tabs: bool,

    /// Occasionally hit an adjacent key and correct it
    #[arg(long)]
    mistakes: bool,

    /// Pause a little longer after punctuation and brackets
    #[arg(long)]
    punctuation_pauses: bool,

    /// Press Escape before each commit to close autocomplete popups
    #[arg(long)]
    dismiss_popups: bool,

    /// Nudge the pointer by a pixel now and then while running
    #[arg(long)]
    jitter: bool,

    /// Deliver text through the clipboard where possible
    #[arg(long)]
    prefer_paste: bool,

    /// Enter non-ASCII characters with Ctrl+Shift+U <hex> Space
    #[arg(long)]
    unicode_escape: bool,

    /// Pause while the focused window title contains any of these (enables compliance mode)
    #[arg(long, value_name = "APP", value_delimiter = ',')]
    block: Vec<String>,

    /// Type `{{...}}` macros literally
    #[arg(long)]
    no_macros: bool,

    /// Tune the options for the target window and content when the run starts
    #[arg(long)]
    auto_optimize: bool,

    /// Keep curly quotes, em-dashes and ellipses as-is
    #[arg(long)]
    keep_typographic_punctuation: bool,

    /// Indentation width, in columns, for per-line-list outdenting
    #[arg(long)]
    outdent_width: Option<u32>,

    /// Seconds the target must stay focused before an automatic resume
    #[arg(long)]
    resume_grace: Option<u32>,

    /// Trim trailing whitespace and collapse blank-line runs before typing
    #[arg(long)]
    clean: bool,

    /// Optional RNG seed (for debugging)
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn build_config(&self) -> Result<RunConfiguration> {
        let mut cfg = match &self.config {
            Some(path) => load_config(path)?,
            None => RunConfiguration::default(),
        };

        if let Some(v) = self.laps {
            cfg.laps = v;
        }
        if let Some(v) = self.delay {
            cfg.start_delay_seconds = v;
        }
        if let Some(v) = self.wpm_min {
            cfg.min_wpm = v;
        }
        if let Some(v) = self.wpm_max {
            cfg.max_wpm = v;
        }
        if let Some(mode) = self.mode {
            cfg.newline_mode = mode.to_library();
        }
        if let Some(v) = self.outdent_width {
            cfg.outdent_width = v;
        }
        if let Some(v) = self.resume_grace {
            cfg.resume_grace_seconds = v;
        }
        cfg.use_alt_newline_key |= self.shift_enter;
        cfg.preserve_tabs &= !self.strip_tabs;
        cfg.inject_mistakes |= self.mistakes;
        cfg.pause_on_punctuation |= self.punctuation_pauses;
        cfg.dismiss_popup_before_enter |= self.dismiss_popups;
        cfg.background_pointer_jitter |= self.jitter;
        cfg.prefer_paste_over_keystrokes |= self.prefer_paste;
        cfg.unicode_escape_typing |= self.unicode_escape;
        cfg.macros_enabled &= !self.no_macros;
        cfg.auto_optimize |= self.auto_optimize;
        cfg.ascii_punctuation &= !self.keep_typographic_punctuation;
        if !self.block.is_empty() {
            cfg.compliance_mode_enabled = true;
            cfg.blocked_app_names
                .extend(self.block.iter().map(|s| s.trim().to_string()));
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn load(&self) -> Result<(Document, RunConfiguration)> {
        let mut text = read_input(&self.input)?;
        if self.clean {
            text = clean_whitespace(&text);
        }
        Ok((Document::new(&text), self.build_config()?))
    }

    fn reads_stdin(&self) -> bool {
        is_stdin(&self.input)
    }
}

#[derive(Debug, Parser)]
#[command(name = "typereplay")]
#[command(about = "Replay a document into the focused window with human-like typing", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type a document into the focused window.
    ///
    /// While running, enter `p` to pause, `r` to resume and `s` to stop
    /// (Ctrl+C also stops).
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Host backend.
        ///
        /// - auto: choose based on the runtime environment
        /// - x11: force X11 (XTEST)
        #[arg(long, value_enum, default_value_t = HostBackendArg::Auto)]
        backend: HostBackendArg,

        /// Disable coloured status output
        #[arg(long)]
        no_color: bool,

        /// Do not draw the live progress line
        #[arg(long)]
        no_progress: bool,
    },

    /// Print what a run would type, with the same timing, without touching any window
    Preview {
        #[command(flatten)]
        args: RunArgs,

        /// Do not sleep between characters
        #[arg(long)]
        fast: bool,

        /// Print every step (with its delay) to stderr
        #[arg(long)]
        steps: bool,
    },

    /// Summarize the transformed document as JSON
    Plan {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Classify a document and/or a window title
    Classify {
        /// Input text file, or '-' for stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Window title to classify
        #[arg(long)]
        title: Option<String>,
    },
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == std::ffi::OsStr::new("-")
}

fn read_input(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("typereplay={level},warn"))),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Read `p`/`r`/`s` commands from stdin until the run ends or stdin closes.
fn spawn_stdin_controls(controller: Controller) {
    let spawned = std::thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if controller.is_finished() {
                    break;
                }
                match line.trim().to_ascii_lowercase().as_str() {
                    "p" | "pause" => controller.pause(),
                    "r" | "resume" => controller.resume(),
                    "s" | "stop" | "q" => {
                        controller.stop();
                        break;
                    }
                    "" => {}
                    other => eprintln!("Unknown command '{other}' (use p, r or s)"),
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!("stdin controls unavailable: {err}");
    }
}

fn run_command(args: RunArgs, backend: HostBackendArg, color: bool, progress: bool) -> Result<()> {
    let (document, config) = args.load()?;
    let host: Arc<dyn HostAutomation> = Arc::from(open_host(backend.to_library())?);

    // The terminal that launched us; typing waits until focus leaves it.
    let controller_title = host
        .focused_window_title()
        .ok()
        .filter(|t| !t.is_empty());

    let sink = Arc::new(ConsoleSink::new(color, progress));
    let handle = engine::start(
        document,
        config,
        host,
        sink,
        EngineOptions {
            timing: EngineTiming::default(),
            seed: args.seed,
            controller_title,
        },
    )?;

    {
        let controller = handle.controller();
        ctrlc::set_handler(move || controller.stop())
            .context("failed to install Ctrl+C handler")?;
    }
    if args.reads_stdin() {
        eprintln!("Input came from stdin; use Ctrl+C to stop.");
    } else {
        eprintln!("Focus the target window. Enter p/r/s to pause, resume or stop.");
        spawn_stdin_controls(handle.controller());
    }

    match handle.join() {
        Outcome::Completed | Outcome::StoppedByUser => Ok(()),
        Outcome::Failed(reason) => Err(anyhow!(reason)),
    }
}

fn preview_command(args: RunArgs, fast: bool, steps: bool) -> Result<()> {
    let (document, config) = args.load()?;
    let timing = EngineTiming::default();
    let control = RunControl::new(timing.wait_slice);
    {
        let control = control.clone();
        ctrlc::set_handler(move || control.request_stop())
            .context("failed to install Ctrl+C handler")?;
    }

    let pacing = if fast { Pacing::Instant } else { Pacing::Realtime };
    let mut rng = rng_from_seed(args.seed);
    let mut out = io::stdout().lock();

    let report = preview(&document, &config, &timing, pacing, &control, &mut rng, |step, delay| {
        if steps {
            eprintln!("{:>7.3}s {step:?}", delay.as_secs_f64());
        }
        let written = match step {
            PreviewStep::Char(c) => write!(out, "{c}"),
            PreviewStep::Commit => writeln!(out),
            PreviewStep::Paste(text) => write!(out, "{text}"),
            _ => Ok(()),
        };
        if written.and_then(|()| out.flush()).is_err() {
            control.request_stop();
        }
    });

    for diagnostic in &report.diagnostics {
        eprintln!("Macro ignored: {}", diagnostic.error);
    }
    eprintln!(
        "\n{} {} chars, {} mistakes, ~{:.1}s of typing",
        if report.cancelled { "Stopped after" } else { "Previewed" },
        report.output.chars().count(),
        report.mistakes,
        report.simulated_seconds
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanSummary {
    mode: String,
    expected_chars_per_lap: usize,
    expected_chars_total: usize,
    laps: u32,
    text_units: usize,
    paste_units: usize,
    list_lines: usize,
    macros: usize,
    macro_diagnostics: Vec<String>,
    paragraph_join_skipped: bool,
    content: String,
    estimate_seconds: (f64, f64),
    preview: String,
}

fn plan_command(args: RunArgs) -> Result<()> {
    let (document, config) = args.load()?;
    let known_keys = known_key_names();
    let ctx = MacroContext {
        known_keys: &known_keys,
        screen_bounds: None,
    };
    let plan = transform(&document, &config, &ctx);
    let count = |pred: fn(&Unit) -> bool| plan.units.iter().filter(|u| pred(u)).count();
    let estimate = estimate_duration(&document, &config);

    let summary = PlanSummary {
        mode: config.newline_mode.to_string(),
        expected_chars_per_lap: plan.expected_chars,
        expected_chars_total: plan.expected_chars * config.laps as usize,
        laps: config.laps,
        text_units: count(|u| matches!(u, Unit::Text(_))),
        paste_units: count(|u| matches!(u, Unit::Paste(_))),
        list_lines: count(|u| matches!(u, Unit::LineEnd)),
        macros: plan.macro_count(),
        macro_diagnostics: plan
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", d.source, d.error))
            .collect(),
        paragraph_join_skipped: plan.join_skipped,
        content: format!("{:?}", classify(document.as_str())),
        estimate_seconds: (estimate.low_seconds, estimate.high_seconds),
        preview: escape_for_log(&plan.render().chars().take(200).collect::<String>()),
    };

    let json = serde_json::to_string_pretty(&summary).context("failed to serialize plan summary")?;
    println!("{json}");
    Ok(())
}

fn classify_command(input: Option<PathBuf>, title: Option<String>) -> Result<()> {
    if input.is_none() && title.is_none() {
        return Err(anyhow!("pass --input and/or --title"));
    }
    if let Some(path) = input {
        let text = read_input(&path)?;
        println!("content: {:?}", classify(&text));
    }
    if let Some(title) = title {
        println!("window: {}", classify_window_title(&title));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run {
            args,
            backend,
            no_color,
            no_progress,
        } => run_command(args, backend, !no_color, !no_progress),
        Command::Preview { args, fast, steps } => preview_command(args, fast, steps),
        Command::Plan { args } => plan_command(args),
        Command::Classify { input, title } => classify_command(input, title),
    }
}
