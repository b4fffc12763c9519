//! Flow definitions loaded from JSON.

use ca_auth::{FlowDefinition, FlowError, FlowState, RepeatPolicy};

use crate::common::TestEnv;

const BROWSER_FLOW: &str = r#"{
    "name": "browser",
    "steps": [
        { "number": 1, "authenticator": "password", "options": { "idp": "A" } },
        { "number": 2, "authenticator": "totp" },
        { "number": 3, "authenticator": "federated", "idp": "google" }
    ],
    "script": {
        "engine": "rules",
        "source": "{\"rules\":[{\"when\":{\"exists\":\"steps.3\"},\"then\":\"succeed\"},{\"when\":{\"eq\":[\"steps.1.idp\",\"A\"]},\"then\":{\"executeStep\":3}}],\"otherwise\":\"fail\"}"
    },
    "repeat_policy": { "retry": { "max_attempts": 3 } }
}"#;

/// Tests that a JSON-defined flow loads and runs.
#[tokio::test]
async fn test_json_flow_runs() -> anyhow::Result<()> {
    let flow = FlowDefinition::from_json(BROWSER_FLOW)?;
    assert_eq!(flow.len(), 3);
    assert_eq!(flow.step(2).map(|s| s.idp.as_str()), Some("LOCAL"));
    assert_eq!(flow.repeat_policy, RepeatPolicy::Retry { max_attempts: 3 });

    let env = TestEnv::new();
    let mut ctx = env.start(flow)?;
    let state = env.executor.run(&mut ctx).await;

    assert_eq!(state, FlowState::FlowSucceeded);
    assert!(!ctx.store().contains(2));
    Ok(())
}

/// Tests that a definition naming an unknown engine is rejected at start.
#[tokio::test]
async fn test_unknown_engine_rejected() -> anyhow::Result<()> {
    let flow = FlowDefinition::from_json(
        r#"{"name":"browser","steps":[{"number":1,"authenticator":"password"}],
            "script":{"engine":"lua","source":"return 1"}}"#,
    )?;

    let env = TestEnv::new();
    let err = env.executor.start(std::sync::Arc::new(flow)).unwrap_err();
    assert!(matches!(err, FlowError::InvalidDefinition(_)));
    Ok(())
}

/// Tests that gaps in step numbering are rejected.
#[tokio::test]
async fn test_gapped_numbering_rejected() -> anyhow::Result<()> {
    let flow = FlowDefinition::from_json(
        r#"{"name":"browser","steps":[
            {"number":1,"authenticator":"password"},
            {"number":3,"authenticator":"totp"}]}"#,
    )?;

    let env = TestEnv::new();
    assert!(matches!(
        env.executor.start(std::sync::Arc::new(flow)),
        Err(FlowError::InvalidDefinition(_))
    ));
    Ok(())
}

/// Tests that malformed JSON is reported as an invalid definition.
#[test]
fn test_malformed_json() {
    assert!(matches!(
        FlowDefinition::from_json("{\"name\": 1}"),
        Err(FlowError::InvalidDefinition(_))
    ));
}
