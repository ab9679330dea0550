//! Integration tests for playback: selector resolution, the synthetic input
//! fallback, retries and user control of a running replay.

mod common;

use std::sync::Arc;
use tokio::sync::broadcast;

use common::{as_host, controller, drain, settle, FixtureElement, FixturePage, BLANK_URL, FORM_URL};

use browser_automation::config::EngineConfig;
use browser_automation::controller::SessionController;
use browser_automation::host::SyntheticInput;
use browser_automation::models::{
    Action, ActionKind, Automation, PlaybackResult, PlaybackSession, PlaybackState, ProgressEvent, Rect, Target,
    Viewport,
};
use browser_automation::replay::{PlaybackControl, PlaybackEngine};
use browser_automation::store::AutomationStore;

/// Record focus, type and submit on the sign-up form
async fn record_sign_up(controller: &SessionController) -> Automation {
    let page = FixturePage::new("recorder");
    page.load(FORM_URL).unwrap();

    controller.start_recording(as_host(&page)).await.unwrap();
    settle(50).await;
    page.user_focus("name");
    page.user_type("name", "Ada");
    page.user_click("terms");
    page.user_select("plan", "pro");
    page.user_click("submit");
    settle(50).await;

    controller
        .stop_recording(Some("Sign up".into()))
        .await
        .unwrap()
        .expect("recording captured actions")
}

fn automation(actions: Vec<ActionKind>) -> Automation {
    let actions = actions
        .into_iter()
        .enumerate()
        .map(|(i, kind)| Action::new(1_700_000_000_000 + i as i64, kind))
        .collect();
    Automation::new("manual".into(), FORM_URL.into(), actions, Viewport::default())
}

fn click(selector: &str) -> ActionKind {
    ActionKind::Click {
        target: Target::css(selector),
        text: None,
    }
}

fn navigate(url: &str) -> ActionKind {
    ActionKind::Navigate { url: url.into() }
}

fn wait(ms: u64) -> ActionKind {
    ActionKind::Wait { duration_ms: ms }
}

/// Run the engine directly, outside the controller
async fn play(page: &Arc<FixturePage>, automation: Automation) -> PlaybackResult {
    let (progress, _) = broadcast::channel(256);
    let control = PlaybackControl::new();
    let engine = PlaybackEngine::new(as_host(page), EngineConfig::default(), progress);
    engine
        .run(PlaybackSession::new(Arc::new(automation), "tab-2".into(), control.gate()))
        .await
}

/// Run the engine on its own task with `config`, keeping the controls
fn spawn_play(
    page: &Arc<FixturePage>,
    automation: Automation,
    config: EngineConfig,
) -> (PlaybackControl, tokio::task::JoinHandle<PlaybackResult>) {
    let (progress, _) = broadcast::channel(256);
    let control = PlaybackControl::new();
    let engine = PlaybackEngine::new(as_host(page), config, progress);
    let session = PlaybackSession::new(Arc::new(automation), "tab-2".into(), control.gate());
    (control, tokio::spawn(async move { engine.run(session).await }))
}

async fn wait_for_event(rx: &mut broadcast::Receiver<ProgressEvent>, done: impl Fn(&ProgressEvent) -> bool) {
    loop {
        let event = rx.recv().await.expect("progress channel open");
        if done(&event) {
            return;
        }
    }
}

// ============================================================================
// Test 1: Round trip
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recorded_form_replays_on_fresh_page() {
    let controller = controller();
    let recorded = record_sign_up(&controller).await;
    assert_eq!(
        recorded.actions.iter().map(|a| a.type_name()).collect::<Vec<_>>(),
        vec!["viewport", "navigate", "focus", "input", "checkbox", "select", "click"]
    );

    let page = FixturePage::new("tab-2");
    let result = controller.play_automation(&recorded.id, as_host(&page)).await.unwrap();

    assert_eq!(result.state, PlaybackState::Completed);
    assert_eq!(result.success_count, recorded.actions.len(), "{:?}", result.failure_summary());
    assert!(result.fallback_steps().is_empty(), "Every step should work structurally");
    assert_eq!(page.url(), FORM_URL);
    assert_eq!(page.value_of("name"), "Ada");
    assert!(page.is_checked("terms"));
    assert_eq!(page.value_of("plan"), "pro");

    let submissions = page.submissions();
    assert_eq!(submissions.len(), 1, "The form is submitted exactly once");
    assert_eq!(submissions[0]["name"], "Ada");
    assert_eq!(submissions[0]["terms"], "on");
    assert!(!controller.is_playing("tab-2"));
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_reported_per_step() {
    let controller = controller();
    let recorded = record_sign_up(&controller).await;
    let mut progress = controller.subscribe();

    let page = FixturePage::new("tab-2");
    controller.play_automation(&recorded.id, as_host(&page)).await.unwrap();

    let events = drain(&mut progress);
    assert!(matches!(events.first(), Some(ProgressEvent::PlaybackStarted { total, .. }) if *total == 7));
    let finished: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::StepFinished { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(finished, (0..7).collect::<Vec<_>>());
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::PlaybackFinished { result, .. }) if result.state == PlaybackState::Completed
    ));
}

// ============================================================================
// Test 2: Fallbacks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_point_hint_reaches_redesigned_button() {
    let controller = controller();
    let recorded = record_sign_up(&controller).await;

    // Same place on screen, nothing a recorded selector can match
    let mut redesigned = common::form_page();
    redesigned.retain(|e| e.key != "submit");
    redesigned.push(
        FixtureElement::new("submit", "input", Rect::new(120.0, 240.0, 100.0, 40.0))
            .id("send")
            .input_type("submit")
            .in_form("signup")
            .submit_button(),
    );
    let page = FixturePage::with_site("tab-2", vec![(BLANK_URL, Vec::new()), (FORM_URL, redesigned)]);

    let result = controller.play_automation(&recorded.id, as_host(&page)).await.unwrap();

    assert_eq!(result.state, PlaybackState::Completed);
    assert!(result.failed_actions.is_empty(), "{:?}", result.failure_summary());
    assert_eq!(result.fallback_steps(), vec![6], "Only the click needed the point hint");
    assert_eq!(page.submissions().len(), 1);
    assert!(page
        .synthetic_inputs()
        .iter()
        .any(|i| matches!(i, SyntheticInput::MouseUp { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_structural_failure_falls_back_to_synthetic_input() {
    let page = FixturePage::new("tab-2");
    page.load(FORM_URL).unwrap();
    page.break_structural(true);

    let result = play(
        &page,
        automation(vec![
            ActionKind::Input {
                target: Target::css("#name"),
                value: "Ada".into(),
            },
            ActionKind::Checkbox {
                target: Target::css("#terms"),
                checked: true,
            },
            ActionKind::Select {
                target: Target::css("#plan"),
                value: "pro".into(),
            },
        ]),
    )
    .await;

    assert_eq!(result.success_count, 3, "{:?}", result.failure_summary());
    assert_eq!(result.fallback_steps(), vec![0, 1, 2]);
    assert_eq!(page.value_of("name"), "Ada", "Select-all then insert replaces the value");
    assert!(page.is_checked("terms"));
    assert_eq!(page.value_of("plan"), "pro");
}

#[tokio::test(start_paused = true)]
async fn test_checkbox_fallback_respects_current_state() {
    let page = FixturePage::new("tab-2");
    page.load(FORM_URL).unwrap();
    page.edit("terms", |e| e.checked = true);
    page.break_structural(true);

    let result = play(
        &page,
        automation(vec![ActionKind::Checkbox {
            target: Target::css("#terms"),
            checked: true,
        }]),
    )
    .await;

    assert_eq!(result.success_count, 1);
    assert!(page.is_checked("terms"), "An already checked box is not toggled off");
    assert!(page.synthetic_inputs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_context_during_interaction_is_retried() {
    let page = FixturePage::new("tab-2");
    page.load(FORM_URL).unwrap();
    page.stale_performs(2);

    let result = play(&page, automation(vec![click("#submit")])).await;

    assert_eq!(result.success_count, 1, "{:?}", result.failure_summary());
    assert_eq!(result.steps[0].attempts, 1, "A stale context is not a failed attempt");
    assert!(result.fallback_steps().is_empty());
    assert!(page.synthetic_inputs().is_empty());
    assert_eq!(page.submissions().len(), 1);
}

// ============================================================================
// Test 3: Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_element_fails_once_and_replay_continues() {
    let page = FixturePage::new("tab-2");
    let result = play(
        &page,
        automation(vec![
            navigate(FORM_URL),
            click("#missing"),
            ActionKind::Input {
                target: Target::css("#name"),
                value: "Ada".into(),
            },
            click("#submit"),
        ]),
    )
    .await;

    assert_eq!(result.state, PlaybackState::Completed);
    assert_eq!(result.attempted, 4);
    assert_eq!(result.success_count, 3);
    assert_eq!(result.failed_actions.len(), 1, "Retries do not add failure entries");
    assert_eq!(result.failed_actions[0].step, 1);
    assert_eq!(result.failed_actions[0].error, "Element not found: #missing");
    assert_eq!(result.steps[1].attempts, EngineConfig::default().max_action_attempts);
    assert_eq!(page.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_element_is_not_visible_failure() {
    let page = FixturePage::new("tab-2");
    page.load(FORM_URL).unwrap();
    page.edit("submit", |e| e.visible = false);

    let result = play(&page, automation(vec![click("#submit")])).await;

    assert_eq!(result.failed_actions[0].error, "Element not visible: #submit");
    assert!(page.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_every_failure_is_exhausted() {
    let page = FixturePage::new("tab-2");
    let result = play(&page, automation(vec![click("#missing"), click("#gone")])).await;

    assert_eq!(result.state, PlaybackState::Exhausted);
    assert_eq!(result.failed_actions.len(), 2);
    assert_eq!(result.success_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_url_fails_navigate() {
    let page = FixturePage::new("tab-2");
    let result = play(&page, automation(vec![navigate("https://nowhere.test/"), wait(10)])).await;

    assert_eq!(result.failed_actions.len(), 1);
    assert_eq!(result.failed_actions[0].action_type, "navigate");
    assert_eq!(result.success_count, 1);
    assert_eq!(result.state, PlaybackState::Completed);
}

// ============================================================================
// Test 4: User control
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_ends_playback_after_current_step() {
    let (controller, store) = common::controller_with_store();
    let saved = automation((0..6).map(|_| wait(1_000)).collect());
    store.save(&saved).await.unwrap();
    let mut progress = controller.subscribe();
    let page = FixturePage::new("tab-2");

    let runner = {
        let controller = controller.clone();
        let host = as_host(&page);
        let id = saved.id.clone();
        tokio::spawn(async move { controller.play_automation(&id, host).await })
    };

    wait_for_event(&mut progress, |e| matches!(e, ProgressEvent::StepFinished { step: 2, .. })).await;
    assert!(controller.is_playing("tab-2"));
    controller.stop_playback("tab-2").unwrap();

    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.state, PlaybackState::Stopped);
    assert_eq!(result.attempted, 3, "No step runs after the stop");
    assert_eq!(result.success_count, 3);
    assert!(result.failed_actions.is_empty(), "A stop is not a failure");
    assert!(!controller.is_playing("tab-2"));
    assert!(controller.stop_playback("tab-2").is_err(), "Nothing left to stop");
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_a_long_wait() {
    let (controller, store) = common::controller_with_store();
    let saved = automation(vec![wait(600_000), wait(10)]);
    store.save(&saved).await.unwrap();
    let mut progress = controller.subscribe();
    let page = FixturePage::new("tab-2");

    let runner = {
        let controller = controller.clone();
        let host = as_host(&page);
        let id = saved.id.clone();
        tokio::spawn(async move { controller.play_automation(&id, host).await })
    };

    wait_for_event(&mut progress, |e| matches!(e, ProgressEvent::StepStarted { step: 0, .. })).await;
    let started = tokio::time::Instant::now();
    controller.stop_playback("tab-2").unwrap();

    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.state, PlaybackState::Stopped);
    assert_eq!(result.attempted, 0, "The interrupted step is not recorded");
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_skip_abandons_only_the_current_step() {
    let (controller, store) = common::controller_with_store();
    let saved = automation(vec![wait(5_000), navigate(FORM_URL), click("#submit")]);
    store.save(&saved).await.unwrap();
    let mut progress = controller.subscribe();
    let page = FixturePage::new("tab-2");

    let runner = {
        let controller = controller.clone();
        let host = as_host(&page);
        let id = saved.id.clone();
        tokio::spawn(async move { controller.play_automation(&id, host).await })
    };

    wait_for_event(&mut progress, |e| matches!(e, ProgressEvent::StepStarted { step: 0, .. })).await;
    controller.skip_current("tab-2").unwrap();

    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.state, PlaybackState::Completed);
    assert_eq!(result.skipped_actions.len(), 1);
    assert_eq!(result.skipped_actions[0].step, 0);
    assert_eq!(result.skipped_actions[0].action_type, "wait");
    assert_eq!(result.success_count, 2, "{:?}", result.failure_summary());
    assert_eq!(page.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_the_cursor() {
    let (controller, store) = common::controller_with_store();
    let saved = automation(vec![navigate(FORM_URL), click("#submit")]);
    store.save(&saved).await.unwrap();
    let mut progress = controller.subscribe();
    let page = FixturePage::new("tab-2");

    let runner = {
        let controller = controller.clone();
        let host = as_host(&page);
        let id = saved.id.clone();
        tokio::spawn(async move { controller.play_automation(&id, host).await })
    };

    wait_for_event(&mut progress, |e| matches!(e, ProgressEvent::StepFinished { step: 0, .. })).await;
    controller.pause_playback("tab-2").unwrap();

    settle(60_000).await;
    assert!(
        !drain(&mut progress)
            .iter()
            .any(|e| matches!(e, ProgressEvent::StepStarted { step: 1, .. })),
        "Nothing runs while paused"
    );
    assert!(page.submissions().is_empty());

    controller.resume_playback("tab-2").unwrap();
    let result = runner.await.unwrap().unwrap();
    assert_eq!(result.state, PlaybackState::Completed);
    assert_eq!(result.success_count, 2);
    assert_eq!(page.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_mid_wait_keeps_elapsed_time() {
    let page = FixturePage::new("tab-2");
    let config = EngineConfig {
        max_action_attempts: 1,
        action_timeout_ms: 1_000,
        ..EngineConfig::default()
    };
    let started = tokio::time::Instant::now();
    let (control, runner) = spawn_play(&page, automation(vec![wait(3_000)]), config);

    settle(1_000).await;
    control.pause();
    settle(60_000).await;
    assert!(!runner.is_finished(), "A paused wait holds the step");
    control.resume();

    let result = runner.await.unwrap();
    assert_eq!(result.state, PlaybackState::Completed);
    assert!(result.failed_actions.is_empty(), "{:?}", result.failed_actions);
    assert_eq!(result.steps[0].attempts, 1);
    // Two seconds of the wait were left when it paused
    let elapsed = started.elapsed();
    assert!(
        elapsed >= std::time::Duration::from_secs(63) && elapsed < std::time::Duration::from_secs(64),
        "{:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_resolving_is_not_a_failure() {
    let page = FixturePage::new("tab-2");
    page.load(FORM_URL).unwrap();
    page.edit("submit", |e| e.visible = false);
    let config = EngineConfig {
        max_action_attempts: 1,
        ..EngineConfig::default()
    };
    let (control, runner) = spawn_play(&page, automation(vec![click("#submit")]), config.clone());

    settle(1_000).await;
    control.pause();
    // Longer than both the visibility window and the action timeout
    settle(config.action_timeout_ms * 3).await;
    page.edit("submit", |e| e.visible = true);
    control.resume();

    let result = runner.await.unwrap();
    assert_eq!(result.state, PlaybackState::Completed);
    assert_eq!(result.success_count, 1, "{:?}", result.failure_summary());
    assert_eq!(result.steps[0].attempts, 1);
    assert_eq!(page.submissions().len(), 1);
}
