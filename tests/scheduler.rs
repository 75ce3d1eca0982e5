use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use typereplay::config::{EngineTiming, NewlineMode, RunConfiguration};
use typereplay::engine::{self, EngineOptions, RunHandle};
use typereplay::events::{Outcome, PauseReason, RunEvent, RunState, StatusSink};
use typereplay::host::HostAutomation;
use typereplay::sim::{HostEvent, SimHost};
use typereplay::text::Document;

type Events = Arc<Mutex<Vec<RunEvent>>>;

fn fast_config() -> RunConfiguration {
    RunConfiguration {
        start_delay_seconds: 0,
        min_wpm: 6000,
        max_wpm: 6000,
        ..Default::default()
    }
}

fn start_run(
    host: &Arc<SimHost>,
    text: &str,
    config: RunConfiguration,
    controller_title: Option<&str>,
) -> (RunHandle, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink: Arc<dyn StatusSink> = {
        let events = events.clone();
        Arc::new(move |event: RunEvent| events.lock().unwrap().push(event))
    };
    let host: Arc<dyn HostAutomation> = host.clone();
    let handle = engine::start(
        Document::new(text),
        config,
        host,
        sink,
        EngineOptions {
            timing: EngineTiming::fast(),
            seed: Some(7),
            controller_title: controller_title.map(str::to_string),
        },
    )
    .expect("run should start");
    (handle, events)
}

fn statuses(events: &Events) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            RunEvent::Status(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn saw(events: &Events, wanted: &RunEvent) -> bool {
    events.lock().unwrap().iter().any(|e| e == wanted)
}

fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    pred()
}

fn chars_typed(host: &SimHost) -> usize {
    host.events()
        .iter()
        .filter(|e| matches!(e, HostEvent::Char(_) | HostEvent::Key(_)))
        .count()
}

const PARAGRAPH: &str = "The quick brown fox jumps over the lazy dog near the riverbank today.";

#[test]
fn completes_with_exact_text() {
    let host = Arc::new(SimHost::default());
    let doc = "Hello, world!\n\tIndented line\nDone.";
    let (handle, events) = start_run(&host, doc, fast_config(), None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), doc);

    let statuses = statuses(&events);
    assert!(statuses.contains(&"Typing locked on: Editor".to_string()));
    assert_eq!(
        statuses.last().map(String::as_str),
        Some("Typing completed successfully!")
    );
    assert!(saw(&events, &RunEvent::Finished(Outcome::Completed)));

    let last_progress = events
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find_map(|e| match e {
            RunEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .expect("progress should be reported");
    assert_eq!(last_progress.chars_completed, doc.chars().count());
    assert_eq!(last_progress.chars_expected_total, doc.chars().count());
}

#[test]
fn countdown_announces_each_second() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        start_delay_seconds: 3,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, "ok", config, None);
    assert_eq!(handle.join(), Outcome::Completed);

    let statuses = statuses(&events);
    let countdown: Vec<&str> = statuses
        .iter()
        .map(String::as_str)
        .filter(|s| s.starts_with("Starting in"))
        .collect();
    assert_eq!(
        countdown,
        vec!["Starting in 3...", "Starting in 2...", "Starting in 1..."]
    );
}

#[test]
fn waits_for_focus_to_leave_the_controller_window() {
    let host = Arc::new(SimHost::new("Terminal"));
    let (handle, events) = start_run(&host, "hi", fast_config(), Some("Terminal"));

    assert!(wait_until(Duration::from_secs(2), || statuses(&events)
        .contains(&"Switch to the target window to begin...".to_string())));
    assert_eq!(host.text(), "");

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "hi");
    assert!(saw(&events, &RunEvent::State(RunState::Locked("Editor".to_string()))));
}

#[test]
fn stop_is_prompt_and_final() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        min_wpm: 600,
        max_wpm: 600,
        ..fast_config()
    };
    let doc = "a".repeat(2000);
    let (handle, events) = start_run(&host, &doc, config, None);

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 3));
    let controller = handle.controller();
    controller.stop();
    let stopped_at = Instant::now();

    assert_eq!(handle.join(), Outcome::StoppedByUser);
    assert!(host
        .events_after(stopped_at + Duration::from_millis(20))
        .is_empty());
    assert!(host.text().len() < doc.len());
    assert!(controller.is_finished());
    assert!(statuses(&events).contains(&"Typing stopped by user.".to_string()));
}

#[test]
fn pause_and_resume_neither_drop_nor_repeat_characters() {
    let host = Arc::new(SimHost::default());
    let (handle, events) = start_run(&host, PARAGRAPH, fast_config(), None);
    let controller = handle.controller();

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 5));
    controller.pause();
    assert!(wait_until(Duration::from_secs(1), || controller.is_paused()));

    let frozen = host.event_count();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(host.event_count(), frozen);
    assert!(saw(&events, &RunEvent::State(RunState::Paused(PauseReason::User))));

    controller.resume();
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);
    assert!(saw(&events, &RunEvent::Paused));
    assert!(saw(&events, &RunEvent::Resumed));
}

#[test]
fn focus_loss_pauses_and_auto_resumes_after_grace() {
    let host = Arc::new(SimHost::default());
    let (handle, events) = start_run(&host, PARAGRAPH, fast_config(), None);

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 5));
    host.set_focused_title("Other Window");
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::AutoResumeWaiting(PauseReason::FocusLost))
    )));

    let frozen = host.event_count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(host.event_count(), frozen);

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);

    let statuses = statuses(&events);
    assert!(statuses.contains(&"Focus moved away from 'Editor'. Pausing...".to_string()));
    assert!(statuses.contains(&"Focus restored. Resuming in 2...".to_string()));
    assert!(statuses.contains(&"Focus restored. Resuming in 1...".to_string()));
}

#[test]
fn brief_refocus_shorter_than_grace_does_not_resume() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        resume_grace_seconds: 5,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, PARAGRAPH, config, None);
    let controller = handle.controller();

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 5));
    host.set_focused_title("Other Window");
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::AutoResumeWaiting(PauseReason::FocusLost))
    )));
    let frozen = host.event_count();

    host.set_focused_title("Editor");
    assert!(wait_until(Duration::from_secs(1), || statuses(&events)
        .iter()
        .any(|s| s.starts_with("Focus restored"))));
    host.set_focused_title("Other Window");

    assert!(wait_until(Duration::from_secs(1), || statuses(&events)
        .contains(&"Focus lost again. Waiting...".to_string())));
    std::thread::sleep(Duration::from_millis(150));
    assert!(controller.is_paused());
    assert_eq!(host.event_count(), frozen);

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);
}

#[test]
fn explicit_pause_overrides_auto_resume() {
    let host = Arc::new(SimHost::default());
    let (handle, events) = start_run(&host, PARAGRAPH, fast_config(), None);
    let controller = handle.controller();

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 5));
    host.set_focused_title("Other Window");
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::AutoResumeWaiting(PauseReason::FocusLost))
    )));

    controller.pause();
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::Paused(PauseReason::User))
    )));
    let frozen = host.event_count();

    host.set_focused_title("Editor");
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(host.event_count(), frozen);
    assert!(controller.is_paused());

    controller.resume();
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);
}

#[test]
fn blocked_app_triggers_compliance_pause() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        compliance_mode_enabled: true,
        blocked_app_names: ["zoom".to_string()].into_iter().collect(),
        ..fast_config()
    };
    let (handle, events) = start_run(&host, PARAGRAPH, config, None);

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) > 5));
    host.set_focused_title("Zoom Meeting");
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::AutoResumeWaiting(PauseReason::Compliance))
    )));
    assert!(statuses(&events)
        .contains(&"Compliance mode: blocked app active. Pausing...".to_string()));

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);
}

#[test]
fn blocked_window_is_never_acquired_as_target() {
    let host = Arc::new(SimHost::new("Zoom Meeting"));
    let config = RunConfiguration {
        compliance_mode_enabled: true,
        blocked_app_names: ["Zoom".to_string()].into_iter().collect(),
        ..fast_config()
    };
    let (handle, events) = start_run(&host, "hi", config, None);

    assert!(wait_until(Duration::from_secs(2), || statuses(&events).contains(
        &"Compliance mode: 'Zoom Meeting' is blocked. Waiting for another window...".to_string()
    )));
    assert_eq!(host.event_count(), 0);

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "hi");
}

#[test]
fn failed_paste_falls_back_to_typing() {
    let host = Arc::new(SimHost::default());
    host.set_fail_paste(true);
    let config = RunConfiguration {
        prefer_paste_over_keystrokes: true,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, "abc def", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "abc def");
    assert!(statuses(&events).contains(&"Paste failed; fell back to typing.".to_string()));
}

#[test]
fn paste_fallback_stays_locked_to_the_target() {
    let host = Arc::new(SimHost::default());
    host.set_fail_paste(true);
    let config = RunConfiguration {
        prefer_paste_over_keystrokes: true,
        min_wpm: 600,
        max_wpm: 600,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, PARAGRAPH, config, None);

    assert!(wait_until(Duration::from_secs(2), || chars_typed(&host) >= 4));
    host.set_focused_title("Other");
    assert!(wait_until(Duration::from_secs(1), || saw(
        &events,
        &RunEvent::State(RunState::AutoResumeWaiting(PauseReason::FocusLost))
    )));

    let frozen = host.event_count();
    let typed_so_far = host.text();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(host.event_count(), frozen);
    assert!(typed_so_far.len() < PARAGRAPH.len());

    host.set_focused_title("Editor");
    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);

    let last_progress = events
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find_map(|e| match e {
            RunEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .expect("progress should be reported");
    assert_eq!(last_progress.chars_completed, PARAGRAPH.len());
}

#[test]
fn line_paste_restores_the_clipboard() {
    let host = Arc::new(SimHost::default());
    host.set_clipboard(Some("keep me"));
    let config = RunConfiguration {
        newline_mode: NewlineMode::LinePaste,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, "one\ntwo\n", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "one\ntwo\n");
    assert_eq!(host.clipboard(), Some("keep me".to_string()));
    let pastes: Vec<HostEvent> = host
        .events()
        .into_iter()
        .filter(|e| matches!(e, HostEvent::Paste(_)))
        .collect();
    assert_eq!(
        pastes,
        vec![
            HostEvent::Paste("one\n".to_string()),
            HostEvent::Paste("two\n".to_string())
        ]
    );
}

#[test]
fn denied_input_fails_the_run_with_guidance() {
    let host = Arc::new(SimHost::default());
    host.set_deny_input(true);
    let (handle, events) = start_run(&host, "hello", fast_config(), None);

    let Outcome::Failed(reason) = handle.join() else {
        panic!("expected a failed run");
    };
    assert!(reason.contains("Grant input-injection access"), "got: {reason}");
    assert!(statuses(&events)
        .iter()
        .any(|s| s.starts_with("Typing Error:")));
    assert_eq!(host.text(), "");
}

#[test]
fn empty_document_completes_without_host_actions() {
    let host = Arc::new(SimHost::default());
    let (handle, events) = start_run(&host, "", fast_config(), None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.event_count(), 0);
    assert!(statuses(&events).contains(&"Nothing to type.".to_string()));
}

#[test]
fn macros_run_in_document_order() {
    let host = Arc::new(SimHost::default());
    let doc = "A{{PRESS:enter}}B{{PAUSE:0.05}}C{{CLICK:10,20}}{{PAUSE:-1}}";
    let (handle, events) = start_run(&host, doc, fast_config(), None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "A\nBC");
    assert!(host.events().contains(&HostEvent::Click { x: 10, y: 20 }));
    assert!(statuses(&events).contains(&"Macro ignored: PAUSE must be non-negative".to_string()));
}

#[test]
fn pause_macro_holds_before_the_next_action() {
    let host = Arc::new(SimHost::default());
    let started = Instant::now();
    let (handle, _events) = start_run(&host, "{{PAUSE:0.2}}{{PRESS:enter}}Hi", fast_config(), None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "\nHi");

    let timed = host.timed_events();
    let actions: Vec<HostEvent> = timed.iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        actions,
        vec![
            HostEvent::Key("enter".to_string()),
            HostEvent::Char('H'),
            HostEvent::Char('i'),
        ]
    );
    assert!(timed[0].0 - started >= Duration::from_millis(200));
}

#[test]
fn oversized_pause_macro_is_still_cut_short_by_stop() {
    let host = Arc::new(SimHost::default());
    let (handle, _events) = start_run(&host, "{{PAUSE:999}}x", fast_config(), None);
    let controller = handle.controller();

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(host.event_count(), 0);

    let stopped_at = Instant::now();
    controller.stop();
    assert_eq!(handle.join(), Outcome::StoppedByUser);
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(host.text(), "");
}

#[test]
fn every_lap_retypes_the_document() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        laps: 2,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, "ab", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "abab");
    assert!(saw(&events, &RunEvent::Lap { current: 1, total: 2 }));
    assert!(saw(&events, &RunEvent::Lap { current: 2, total: 2 }));
}

#[test]
fn injected_mistakes_are_corrected() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        inject_mistakes: true,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, PARAGRAPH, config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), PARAGRAPH);
}

#[test]
fn stop_during_a_mistake_still_takes_it_back() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        inject_mistakes: true,
        ..fast_config()
    };
    let doc = "asdf ".repeat(400);
    let (handle, _events) = start_run(&host, &doc, config, None);

    // A wrong key is on screen while the typist "notices" it.
    assert!(wait_until(Duration::from_secs(10), || !doc.starts_with(&host.text())));
    handle.controller().stop();

    assert_eq!(handle.join(), Outcome::StoppedByUser);
    let text = host.text();
    assert!(doc.starts_with(&text), "uncorrected text left behind: {text:?}");
}

#[test]
fn unicode_escape_enters_code_points() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        unicode_escape_typing: true,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, "café", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "café");
    assert!(host.events().contains(&HostEvent::Combo(vec![
        "ctrl".to_string(),
        "shift".to_string(),
        "u".to_string()
    ])));
}

#[test]
fn list_mode_dismisses_popups_and_outdents() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        newline_mode: NewlineMode::PerLineList,
        dismiss_popup_before_enter: true,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, "if x:\n    y\nz\n", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "if x:\ny\nz\n");

    let events = host.events();
    let esc = HostEvent::Key("esc".to_string());
    let enter = HostEvent::Key("enter".to_string());
    let outdent = HostEvent::Combo(vec!["shift".to_string(), "tab".to_string()]);
    assert_eq!(events.iter().filter(|e| **e == esc).count(), 3);
    assert_eq!(events.iter().filter(|e| **e == enter).count(), 3);
    assert_eq!(events.iter().filter(|e| **e == outdent).count(), 1);
    assert!(events.windows(2).all(|w| w[1] != enter || w[0] == esc));
}

#[test]
fn browsers_never_receive_popup_dismissal() {
    let host = Arc::new(SimHost::new("Docs - Mozilla Firefox"));
    let config = RunConfiguration {
        newline_mode: NewlineMode::PerLineList,
        dismiss_popup_before_enter: true,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, "a\nb\n", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert!(!host.events().contains(&HostEvent::Key("esc".to_string())));
}

#[test]
fn auto_optimize_tunes_for_chat_windows() {
    let host = Arc::new(SimHost::new("general - Slack"));
    let config = RunConfiguration {
        auto_optimize: true,
        ..fast_config()
    };
    let (handle, events) = start_run(&host, "Hello\nthere", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "Hello there");
    assert!(statuses(&events)
        .iter()
        .any(|s| s.starts_with("Auto-optimized for Chat app: mode=paragraph-join")));
}

#[test]
fn pointer_jitter_runs_alongside_typing() {
    let host = Arc::new(SimHost::default());
    let config = RunConfiguration {
        background_pointer_jitter: true,
        ..fast_config()
    };
    let (handle, _events) = start_run(&host, "jitter", config, None);

    assert_eq!(handle.join(), Outcome::Completed);
    assert_eq!(host.text(), "jitter");
    assert!(host
        .events()
        .iter()
        .any(|e| matches!(e, HostEvent::Move { dx, dy } if dx.abs() <= 1 && dy.abs() <= 1)));
}
