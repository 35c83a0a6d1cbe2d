mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use aura_accessibility::PermissionLevel;
use aura_agent::{
    ActionPlan, CommandStatus, HealthLevel, Orchestrator, PathUsed, PlanAction, PlanStep,
    SoundCue,
};
use aura_input::ScrollDirection;

use common::{
    engine_for, finder_snapshot, FakeAutomation, FakeFeedback, FakeListener, FakeProvider,
    FakeReasoning, FakeVision, RecordedAction,
};

struct Harness {
    orchestrator: Arc<Orchestrator>,
    reasoning: Arc<FakeReasoning>,
    vision: Arc<FakeVision>,
    automation: Arc<FakeAutomation>,
    feedback: Arc<FakeFeedback>,
    provider: Arc<FakeProvider>,
}

fn harness() -> Harness {
    harness_with_trust(PermissionLevel::Full)
}

fn harness_with_trust(trust: PermissionLevel) -> Harness {
    let reasoning = FakeReasoning::new();
    let vision = FakeVision::new();
    let automation = FakeAutomation::new();
    let feedback = FakeFeedback::new();
    let listener = FakeListener::new();
    let provider = FakeProvider::new(trust, finder_snapshot());

    let orchestrator = Orchestrator::builder(
        Arc::clone(&reasoning) as _,
        Arc::clone(&vision) as _,
        Arc::clone(&automation) as _,
        Arc::clone(&listener) as _,
        Arc::clone(&feedback) as _,
    )
    .accessibility_engine(engine_for(Arc::clone(&provider)))
    .build();

    Harness {
        orchestrator,
        reasoning,
        vision,
        automation,
        feedback,
        provider,
    }
}

#[tokio::test]
async fn simple_click_runs_on_the_fast_path() {
    let h = harness();
    h.reasoning.respond_when(
        "click the finder icon",
        r#"{"intent": "gui_interaction", "confidence": 0.9}"#,
    );

    let outcome = h.orchestrator.execute_command("click the Finder icon").await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Fast));
    assert!(outcome.duration_ms < 2000);
    assert_eq!(
        h.automation.recorded(),
        vec![RecordedAction::Click(120.0, 20.0)]
    );
    assert_eq!(h.vision.capture_calls.load(Ordering::SeqCst), 0);
    assert!(h.feedback.played(SoundCue::Success));
}

#[tokio::test]
async fn quoted_type_bypasses_element_search() {
    let h = harness();

    let outcome = h.orchestrator.execute_command(r#"type "hello world""#).await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Fast));
    assert_eq!(
        h.automation.recorded(),
        vec![RecordedAction::Type("hello world".to_string())]
    );
    // No element search means no tree capture at all.
    assert_eq!(h.provider.snapshot_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scroll_commands_dispatch_without_an_element() {
    let h = harness();

    let outcome = h.orchestrator.execute_command("scroll down").await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Fast));
    assert_eq!(
        h.automation.recorded(),
        vec![RecordedAction::Scroll(ScrollDirection::Down, 3)]
    );
    // Viewport scrolls neither capture a tree nor touch vision.
    assert_eq!(h.provider.snapshot_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.vision.capture_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn page_commands_scroll_a_full_page() {
    let h = harness();

    let outcome = h.orchestrator.execute_command("page up").await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Fast));
    assert_eq!(
        h.automation.recorded(),
        vec![RecordedAction::Scroll(ScrollDirection::Up, 10)]
    );
}

#[tokio::test]
async fn fast_path_miss_falls_back_to_vision() {
    let h = harness();
    h.reasoning.set_plan(ActionPlan {
        plan: vec![
            PlanStep {
                action: PlanAction::Click,
                coordinates: Some([300.0, 200.0]),
                text: None,
                direction: None,
                amount: None,
                message: None,
            },
            PlanStep {
                action: PlanAction::Finish,
                coordinates: None,
                text: None,
                direction: None,
                amount: None,
                message: None,
            },
        ],
        metadata: Default::default(),
    });

    let outcome = h.orchestrator.execute_command("click the rocket").await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Slow));
    assert_eq!(h.vision.capture_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.vision.analyze_calls.load(Ordering::SeqCst), 1);
    assert!(h
        .vision
        .last_prompt
        .lock()
        .contains("element_not_found"));
    assert_eq!(
        h.automation.recorded(),
        vec![RecordedAction::Click(300.0, 200.0)]
    );
}

#[tokio::test]
async fn empty_command_fails_without_touching_collaborators() {
    let h = harness();

    let outcome = h.orchestrator.execute_command("   ").await;

    assert_eq!(outcome.status, CommandStatus::Failed);
    assert_eq!(outcome.errors, vec!["empty_command".to_string()]);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(h.reasoning.generate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.vision.capture_calls.load(Ordering::SeqCst), 0);
    assert!(h.automation.recorded().is_empty());
}

#[tokio::test]
async fn execution_lock_is_released_after_a_failure() {
    let h = harness();

    let first = h.orchestrator.execute_command("").await;
    assert_eq!(first.status, CommandStatus::Failed);

    // A held lock would stall this for the full 30 s acquire timeout.
    h.reasoning.respond_when(
        "click the finder icon",
        r#"{"intent": "gui_interaction", "confidence": 0.9}"#,
    );
    let second = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        h.orchestrator.execute_command("click the Finder icon"),
    )
    .await
    .expect("second command should not block on the execution lock");
    assert_eq!(second.status, CommandStatus::Completed);
}

#[tokio::test]
async fn concurrent_commands_serialize_on_the_execution_lock() {
    let h = harness();
    h.reasoning.respond_when(
        "click the finder icon",
        r#"{"intent": "gui_interaction", "confidence": 0.9}"#,
    );
    h.reasoning.respond_when(
        "click the trash",
        r#"{"intent": "gui_interaction", "confidence": 0.9}"#,
    );

    let orchestrator = Arc::clone(&h.orchestrator);
    let first = tokio::spawn(async move {
        orchestrator.execute_command("click the Finder icon").await
    });
    let orchestrator = Arc::clone(&h.orchestrator);
    let second =
        tokio::spawn(async move { orchestrator.execute_command("click the Trash").await });

    let (first, second) = (first.await.unwrap(), second.await.unwrap());
    assert_eq!(first.status, CommandStatus::Completed);
    assert_eq!(second.status, CommandStatus::Completed);
    assert_ne!(first.execution_id, second.execution_id);
    // Both clicks landed; serialization means neither was dropped.
    assert_eq!(h.automation.recorded().len(), 2);
}

#[tokio::test]
async fn conversational_commands_route_to_chat() {
    let h = harness();
    // The chat prompt also contains the command text, so the chat-only
    // needle has to be registered first.
    h.reasoning.respond_when("Answer the user", "It certainly is.");
    h.reasoning.respond_when(
        "nice weather today",
        r#"{"intent": "conversational_chat", "confidence": 0.95}"#,
    );

    let outcome = h.orchestrator.execute_command("nice weather today").await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert!(h.feedback.spoke_containing("It certainly is."));
    assert!(h.automation.recorded().is_empty());
}

#[tokio::test]
async fn screen_questions_run_the_vision_pipeline_directly() {
    let h = harness();
    h.reasoning.set_plan(ActionPlan {
        plan: vec![PlanStep {
            action: PlanAction::Speak,
            coordinates: None,
            text: None,
            direction: None,
            amount: None,
            message: Some("You are looking at Finder.".to_string()),
        }],
        metadata: Default::default(),
    });

    let outcome = h
        .orchestrator
        .execute_command("what is on my screen?")
        .await;

    assert_eq!(outcome.status, CommandStatus::Completed);
    assert_eq!(outcome.path_used, Some(PathUsed::Slow));
    // Question routing skips the fast path, so no tree was captured.
    assert_eq!(h.provider.snapshot_calls.load(Ordering::SeqCst), 0);
    assert!(h.feedback.spoke_containing("Finder"));
}

#[tokio::test]
async fn degraded_accessibility_falls_back_and_reports_in_health() {
    let h = harness_with_trust(PermissionLevel::None);
    h.reasoning.set_plan(ActionPlan {
        plan: vec![PlanStep {
            action: PlanAction::Finish,
            coordinates: None,
            text: None,
            direction: None,
            amount: None,
            message: None,
        }],
        metadata: Default::default(),
    });

    let outcome = h.orchestrator.execute_command("click the Finder icon").await;
    assert_eq!(outcome.path_used, Some(PathUsed::Slow));
    assert_eq!(h.provider.snapshot_calls.load(Ordering::SeqCst), 0);

    let health = h.orchestrator.get_system_health().await;
    assert_ne!(health.overall, HealthLevel::Critical);
    assert!(health.score < 100);
}

#[tokio::test]
async fn system_health_is_fully_healthy_at_rest() {
    let h = harness();
    let health = h.orchestrator.get_system_health().await;
    assert_eq!(health.overall, HealthLevel::Healthy);
    assert_eq!(health.score, 100);
    assert!(health.modules.contains_key("accessibility"));
}

#[tokio::test]
async fn module_recovery_is_bounded_per_process() {
    let h = harness();
    for _ in 0..3 {
        let report = h.orchestrator.attempt_system_recovery(Some("intent")).await;
        assert!(report.attempted);
        assert!(report.succeeded);
    }
    let exhausted = h.orchestrator.attempt_system_recovery(Some("intent")).await;
    assert!(!exhausted.attempted);
}

#[tokio::test]
async fn failures_produce_spoken_guidance() {
    let h = harness_with_trust(PermissionLevel::Full);
    // An empty plan makes the fallback fail after the fast path missed.
    h.reasoning.set_plan(ActionPlan::default());

    let outcome = h.orchestrator.execute_command("click the rocket").await;

    assert_eq!(outcome.status, CommandStatus::Failed);
    assert!(!outcome.errors.is_empty());
    assert!(h.feedback.played(SoundCue::Failure));
    assert!(!h.feedback.spoken.lock().is_empty());
}
