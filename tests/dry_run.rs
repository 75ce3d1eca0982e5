use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use typereplay::config::{EngineTiming, NewlineMode, RunConfiguration};
use typereplay::dry_run::{preview, Pacing, PreviewStep};
use typereplay::engine::RunControl;
use typereplay::keyboard::known_key_names;
use typereplay::macros::{Macro, MacroContext};
use typereplay::policy::transform;
use typereplay::text::Document;

fn rendered_plan(doc: &Document, config: &RunConfiguration) -> String {
    let keys = known_key_names();
    let ctx = MacroContext {
        known_keys: &keys,
        screen_bounds: None,
    };
    transform(doc, config, &ctx).render()
}

#[test]
fn preview_output_matches_the_plan() {
    let doc = Document::new("Dear Sam,\n  thanks for the notes.\n\n{{PAUSE:1}}See you soon!\n");
    let mut config = RunConfiguration {
        inject_mistakes: true,
        pause_on_punctuation: true,
        ..Default::default()
    };
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));

    for mode in [
        NewlineMode::AsIs,
        NewlineMode::ParagraphJoin,
        NewlineMode::PerLineList,
        NewlineMode::LinePaste,
    ] {
        config.newline_mode = mode;
        let mut rng = StdRng::seed_from_u64(21);
        let report = preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |_, _| {});
        assert_eq!(report.output, rendered_plan(&doc, &config), "mode {mode}");
        assert!(!report.cancelled);
        assert!(report.simulated_seconds >= 1.0, "the PAUSE macro counts toward time");
    }
}

#[test]
fn laps_repeat_the_output() {
    let doc = Document::new("ab");
    let config = RunConfiguration {
        laps: 3,
        ..Default::default()
    };
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(1);
    let report = preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |_, _| {});
    assert_eq!(report.output, "ababab");
    assert_eq!(report.expected_chars, 6);
}

#[test]
fn mistakes_are_reported_and_corrected() {
    let doc = Document::new(&"asdf ".repeat(200));
    let config = RunConfiguration {
        inject_mistakes: true,
        ..Default::default()
    };
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(77);

    let mut steps = Vec::new();
    let report = preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |step, _| {
        steps.push(step.clone());
    });

    assert!(report.mistakes > 0);
    assert_eq!(report.output, doc.as_str());
    for (i, step) in steps.iter().enumerate() {
        if let PreviewStep::Mistake(_) = step {
            assert_eq!(steps[i + 1], PreviewStep::Correction);
        }
    }
}

#[test]
fn macros_are_surfaced_as_steps() {
    let doc = Document::new("a{{PRESS:tab}}b{{CLICK:1,2}}");
    let config = RunConfiguration::default();
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(2);

    let mut macros = Vec::new();
    preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |step, _| {
        if let PreviewStep::Macro(m) = step {
            macros.push(m.clone());
        }
    });
    assert_eq!(
        macros,
        vec![
            Macro::Press {
                key: "tab".to_string()
            },
            Macro::Click { x: 1, y: 2 },
        ]
    );
}

#[test]
fn stop_cancels_the_preview() {
    let doc = Document::new(&"word ".repeat(100));
    let config = RunConfiguration::default();
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(4);

    let mut seen = 0usize;
    let report = preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |_, _| {
        seen += 1;
        if seen == 10 {
            control.request_stop();
        }
    });

    assert!(report.cancelled);
    assert_eq!(seen, 10);
    assert_eq!(report.output, "word word ");
}

#[test]
fn list_pauses_come_from_engine_timing() {
    let doc = Document::new("a\nb\n");
    let config = RunConfiguration {
        newline_mode: NewlineMode::PerLineList,
        dismiss_popup_before_enter: true,
        ..Default::default()
    };
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(6);

    let mut pauses = Vec::new();
    preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |step, delay| {
        match step {
            PreviewStep::Dismiss | PreviewStep::Commit => pauses.push((step.clone(), delay)),
            _ => {}
        }
    });
    assert_eq!(
        pauses,
        vec![
            (PreviewStep::Dismiss, timing.list_dismiss_pause),
            (PreviewStep::Commit, timing.list_commit_pause),
            (PreviewStep::Dismiss, timing.list_dismiss_pause),
            (PreviewStep::Commit, timing.list_commit_pause),
        ]
    );
}

#[test]
fn realtime_preview_wakes_on_stop() {
    let doc = Document::new("a{{PAUSE:30}}b");
    let config = RunConfiguration::default();
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(5);

    let stopper = {
        let control = control.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            control.request_stop();
        })
    };
    let started = Instant::now();
    let report = preview(&doc, &config, &timing, Pacing::Realtime, &control, &mut rng, |_, _| {});
    stopper.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.cancelled);
    assert_eq!(report.output, "a");
}

#[test]
fn long_pause_macros_are_clamped_to_a_minute() {
    let doc = Document::new("{{PAUSE:999}}x");
    let config = RunConfiguration::default();
    let timing = EngineTiming::default();
    let control = RunControl::new(Duration::from_millis(2));
    let mut rng = StdRng::seed_from_u64(3);

    let mut pause = None;
    preview(&doc, &config, &timing, Pacing::Instant, &control, &mut rng, |step, delay| {
        if let PreviewStep::Macro(Macro::Pause { .. }) = step {
            pause = Some(delay);
        }
    });
    assert_eq!(pause, Some(Duration::from_secs(60)));
}
