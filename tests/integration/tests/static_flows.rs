//! Flows without a sequencing script.

use ca_auth::{FailureReason, FlowDefinition, FlowError, FlowState};
use ca_core::{EventOutcome, EventType};

use crate::common::TestEnv;

/// Tests that steps run in configured order and the flow succeeds.
#[tokio::test]
async fn test_static_flow_succeeds() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = FlowDefinition::new("browser")
        .with_step("password", "LOCAL")
        .with_step("totp", "LOCAL");
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(state, FlowState::FlowSucceeded);
    let steps: Vec<u32> = ctx.store().iter().map(|r| r.step_number()).collect();
    assert_eq!(steps, vec![1, 2]);
    assert_eq!(ctx.store().get(1).and_then(|r| r.attribute("username")), Some("alice"));
    assert_eq!(
        env.events.event_types(),
        vec![
            EventType::FlowStarted,
            EventType::StepCompleted,
            EventType::StepRouted,
            EventType::StepCompleted,
            EventType::FlowSucceeded,
        ]
    );
    Ok(())
}

/// Tests that a failed step ends a flow with no script.
#[tokio::test]
async fn test_static_flow_stops_on_failed_step() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = FlowDefinition::new("browser")
        .with_step("password", "LOCAL")
        .with_step("locked", "LOCAL")
        .with_step("totp", "LOCAL");
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(
        state,
        FlowState::FlowFailed(FailureReason::Error(FlowError::StepFailed(2)))
    );
    assert_eq!(ctx.store().len(), 2);
    assert!(!ctx.store().get(2).is_some_and(|r| r.succeeded()));
    assert!(!ctx.store().contains(3));

    let failed = env
        .events
        .events()
        .into_iter()
        .find(|e| e.event_type == EventType::FlowFailed)
        .expect("flow failure event");
    assert_eq!(failed.outcome, EventOutcome::Failure);
    Ok(())
}

/// Tests that events of one flow carry its session ID.
#[tokio::test]
async fn test_events_are_scoped_to_session() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut ctx = env.start(FlowDefinition::new("browser").with_step("password", "LOCAL"))?;
    env.executor.run(&mut ctx).await;

    let events = env.events.events();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.session_id == Some(ctx.id())));
    assert!(events.iter().all(|e| e.flow.as_deref() == Some("browser")));
    Ok(())
}
