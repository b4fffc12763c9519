//! Cancellation, expiry and host-driven completion.

use std::time::Duration;

use ca_auth::{ContextRegistry, FlowDefinition, FlowError, FlowState};
use ca_core::{EngineConfig, SessionConfig};
use ca_session::StepResult;
use chrono::Utc;

use crate::common::TestEnv;

/// Tests that invalidating a registered context cancels its running step.
#[tokio::test]
async fn test_invalidate_cancels_running_flow() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let registry = ContextRegistry::new(SessionConfig::default());
    let ctx = env.start(FlowDefinition::new("browser").with_step("hanging", "LOCAL"))?;
    let id = ctx.id();
    let shared = registry.insert(ctx);

    let executor = env.executor.clone();
    let handle = tokio::spawn({
        let shared = shared.clone();
        async move {
            let mut ctx = shared.lock().await;
            executor.run(&mut ctx).await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(registry.invalidate(id));

    let state = tokio::time::timeout(Duration::from_secs(5), handle).await??;
    assert_eq!(state, FlowState::FlowFailed(FlowError::Cancelled.into()));
    assert!(registry.get(id).is_none());
    assert!(shared.lock().await.store().is_empty());
    Ok(())
}

/// Tests that an idle flow fails with an expired session.
#[tokio::test]
async fn test_idle_flow_expires() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    config.session.idle_timeout_secs = 1;
    let env = TestEnv::with_config(config);
    let mut ctx = env.start(
        FlowDefinition::new("browser")
            .with_step("password", "LOCAL")
            .with_step("totp", "LOCAL"),
    )?;

    env.executor.step(&mut ctx).await;
    env.executor.step(&mut ctx).await;
    assert_eq!(ctx.state(), &FlowState::StepCompleted(1));

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let state = env.executor.step(&mut ctx).await;

    assert_eq!(state, FlowState::FlowFailed(FlowError::SessionExpired.into()));
    assert_eq!(ctx.store().len(), 1);
    Ok(())
}

/// Tests that the registry purges finished flows.
#[tokio::test]
async fn test_registry_purges_finished_flows() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let registry = ContextRegistry::new(SessionConfig::default());

    let mut done = env.start(FlowDefinition::new("browser").with_step("password", "LOCAL"))?;
    env.executor.run(&mut done).await;
    registry.insert(done);
    let pending = env.start(FlowDefinition::new("browser").with_step("password", "LOCAL"))?;
    let pending_id = pending.id();
    registry.insert(pending);

    assert_eq!(registry.purge_expired(Utc::now()), 1);
    assert!(registry.get(pending_id).is_some());
    Ok(())
}

/// Tests host-driven completion of an awaited step, then a duplicate.
#[tokio::test]
async fn test_host_completion_and_duplicate() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut ctx = env.start(
        FlowDefinition::new("browser")
            .with_step("password", "LOCAL")
            .with_step("totp", "LOCAL"),
    )?;
    env.executor.step(&mut ctx).await;
    assert_eq!(ctx.state(), &FlowState::StepRunning(1));

    env.executor
        .complete_step(&mut ctx, 1, StepResult::new("password", "LOCAL", true))?;
    assert_eq!(ctx.state(), &FlowState::StepCompleted(1));

    let err = env
        .executor
        .complete_step(&mut ctx, 1, StepResult::new("password", "evil", true))
        .unwrap_err();

    assert_eq!(err, FlowError::DuplicateStep(1));
    assert_eq!(ctx.store().len(), 1);
    assert_eq!(ctx.store().get(1).map(|r| r.idp()), Some("LOCAL"));
    assert!(ctx.is_finished());
    Ok(())
}
