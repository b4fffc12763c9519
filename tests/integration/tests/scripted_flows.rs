//! Flows routed by a sequencing script.

use ca_auth::{FailureReason, FlowError, FlowState, RepeatPolicy};
use ca_core::{EngineConfig, EventType};
use ca_script::{ScriptError, ScriptSource};

use crate::common::{three_step_flow, TestEnv};

const ROUTE_BY_IDP: &str = r#"
    if (steps[1] && steps[1].idp == "A") {
        executeStep(3);
    } else {
        executeStep(2);
    }
"#;

const ROUTE_BY_IDP_RULES: &str = r#"{
    "rules": [
        { "when": { "eq": ["steps.1.idp", "A"] }, "then": { "executeStep": 3 } },
        { "when": { "exists": "steps.2" }, "then": "succeed" },
        { "when": { "exists": "steps.3" }, "then": "succeed" }
    ],
    "otherwise": { "executeStep": 2 }
}"#;

fn routed_steps(ctx: &ca_auth::AuthenticationContext) -> Vec<u32> {
    ctx.history()
        .iter()
        .filter_map(|state| match state {
            FlowState::PendingStep(n) => Some(*n),
            _ => None,
        })
        .collect()
}

/// Tests that the script skips step 2 when step 1 used IdP "A".
#[tokio::test]
async fn test_script_routes_past_step() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("A").with_script(ScriptSource::expr(
        r#"
        if (steps.length == 1) {
            if (steps[1].idp == "A") { executeStep(3); } else { executeStep(2); }
        } else {
            succeed();
        }
        "#,
    ));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(state, FlowState::FlowSucceeded);
    assert_eq!(routed_steps(&ctx), vec![1, 3]);
    assert!(!ctx.store().contains(2));
    assert_eq!(ctx.store().get(3).map(|r| r.idp()), Some("google"));
    Ok(())
}

/// Tests that the same routing holds under both script engines.
#[tokio::test]
async fn test_engines_route_alike() -> anyhow::Result<()> {
    for (idp, expected) in [("A", 3), ("B", 2)] {
        for script in [
            ScriptSource::expr(ROUTE_BY_IDP),
            ScriptSource::rules(ROUTE_BY_IDP_RULES),
        ] {
            let env = TestEnv::new();
            let mut ctx = env.start(three_step_flow(idp).with_script(script.clone()))?;

            // Step 1, then the script's decision after it.
            for _ in 0..5 {
                env.executor.step(&mut ctx).await;
            }

            assert_eq!(
                ctx.state(),
                &FlowState::PendingStep(expected),
                "engine {} with idp {idp}",
                script.engine
            );
        }
    }
    Ok(())
}

/// Tests that a script error fails the flow and keeps the recorded step.
#[tokio::test]
async fn test_script_error_fails_flow() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("A").with_script(ScriptSource::expr("throw 'no route';"));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    let err = state
        .failure()
        .and_then(FailureReason::error)
        .expect("flow error");
    assert!(matches!(err, FlowError::ScriptEvaluation { step: 1, .. }));
    assert!(err.is_script_error());
    assert_eq!(ctx.store().len(), 1);
    assert!(ctx.store().contains(1));

    let evaluated = env
        .events
        .events()
        .into_iter()
        .find(|e| e.event_type == EventType::ScriptEvaluated)
        .expect("script event");
    assert!(evaluated.error.is_some_and(|e| e.contains("no route")));
    Ok(())
}

/// Tests how each engine reads a field of a step that has not run.
///
/// `rules` paths resolve to `null`; `expr` raises a type error, so its
/// scripts must guard with `steps[n] &&`.
#[tokio::test]
async fn test_field_of_missing_step() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let mut ctx = env.start(three_step_flow("A").with_script(ScriptSource::rules(
        r#"{"rules":[{"when":{"eq":["steps.2.idp",null]},"then":{"executeStep":3}}],
            "otherwise":{"executeStep":2}}"#,
    )))?;
    for _ in 0..5 {
        env.executor.step(&mut ctx).await;
    }
    assert_eq!(ctx.state(), &FlowState::PendingStep(3));

    let mut ctx = env.start(three_step_flow("A").with_script(ScriptSource::expr(
        r#"if (steps[2].idp == "A") { executeStep(3); } else { executeStep(2); }"#,
    )))?;
    let state = env.executor.run(&mut ctx).await;
    assert!(matches!(
        state.failure().and_then(FailureReason::error),
        Some(FlowError::ScriptEvaluation {
            step: 1,
            source: ScriptError::Type(_),
        })
    ));

    let mut ctx = env.start(three_step_flow("A").with_script(ScriptSource::expr(
        r#"if (steps[2] && steps[2].idp == "A") { executeStep(3); } else { succeed(); }"#,
    )))?;
    assert_eq!(env.executor.run(&mut ctx).await, FlowState::FlowSucceeded);
    Ok(())
}

/// Tests that writing to a step field is rejected.
#[tokio::test]
async fn test_script_cannot_modify_steps() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("A").with_script(ScriptSource::expr(
        r#"steps[1].idp = "B"; executeStep(2);"#,
    ));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert!(matches!(
        state.failure().and_then(FailureReason::error),
        Some(FlowError::ScriptEvaluation { step: 1, .. })
    ));
    assert_eq!(ctx.store().get(1).map(|r| r.idp()), Some("A"));
    Ok(())
}

/// Tests that routing to an unconfigured step fails the flow.
#[tokio::test]
async fn test_route_to_missing_step() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("A").with_script(ScriptSource::expr("executeStep(99);"));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(
        state,
        FlowState::FlowFailed(FailureReason::Error(FlowError::InvalidStepTarget(99)))
    );
    assert_eq!(ctx.store().len(), 1);
    Ok(())
}

/// Tests that a runaway script is cut off by its operation budget.
#[tokio::test]
async fn test_runaway_script_times_out() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    config.script.max_operations = 1_000;
    let env = TestEnv::with_config(config);
    let flow = three_step_flow("A").with_script(ScriptSource::expr("while (true) {}"));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert!(matches!(
        state.failure().and_then(FailureReason::error),
        Some(FlowError::ScriptTimeout { step: 1, .. })
    ));
    Ok(())
}

/// Tests that a script can fail the flow with a reason.
#[tokio::test]
async fn test_script_rejects_flow() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("B").with_script(ScriptSource::rules(
        r#"{"rules":[{"when":{"ne":["steps.1.idp","A"]},"then":{"fail":"untrusted idp"}}]}"#,
    ));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(
        state,
        FlowState::FlowFailed(FailureReason::Rejected {
            step: 1,
            reason: Some("untrusted idp".to_string()),
        })
    );
    Ok(())
}

/// Tests that later steps see properties written by the script.
#[tokio::test]
async fn test_script_property_writes() -> anyhow::Result<()> {
    let mut config = EngineConfig::default();
    config.sandbox.allow_property_writes = true;
    let env = TestEnv::with_config(config);
    let flow = three_step_flow("A").with_script(ScriptSource::expr(
        r#"
        if (steps.length == 1) {
            setProperty("user", steps[1].attributes.username);
            executeStep(2);
        } else if (properties.user == "alice") {
            succeed();
        } else {
            fail("lost property");
        }
        "#,
    ));
    let mut ctx = env.start(flow)?;

    assert_eq!(env.executor.run(&mut ctx).await, FlowState::FlowSucceeded);
    assert_eq!(ctx.property("user"), Some("alice"));
    Ok(())
}

/// Tests that a permitted retry sees only the steps before the jump target.
#[tokio::test]
async fn test_retry_resets_visibility() -> anyhow::Result<()> {
    let env = TestEnv::new();
    let flow = three_step_flow("A")
        .with_repeat_policy(RepeatPolicy::Retry { max_attempts: 2 })
        .with_script(ScriptSource::expr(
            r#"
            if (steps.length == 2) {
                executeStep(1);
            } else if (steps[1].attempt == 1) {
                executeStep(2);
            } else {
                succeed();
            }
            "#,
        ));
    let mut ctx = env.start(flow)?;

    let state = env.executor.run(&mut ctx).await;

    assert_eq!(state, FlowState::FlowSucceeded);
    assert_eq!(routed_steps(&ctx), vec![1, 2, 1]);
    assert_eq!(ctx.store().attempts(1).len(), 2);
    assert_eq!(ctx.store().get(1).map(|r| r.attempt()), Some(2));
    Ok(())
}
