//! End-to-end scenarios through the full pipeline: classifier → rule
//! engine → approval gate → session persistence.

mod common;

use common::{AutoRespond, ClosedChannel, Fixture, RecordingChannel, SilentChannel};
use serde_json::json;
use std::time::Duration;

use carapace_core::ServerMessage;
use carapace_gate::GateResult;

const WEB_THEN_WRITE_RULES: &str = "\
rules:
  - id: no-write-after-web
    trigger: the agent has read content from the internet
    effect: block writes without approval
    mode: approve
    description: After reading from the web, writes need approval.
";

const SKILL_RULES: &str = "\
rules:
  - id: skill-modification
    trigger: always
    effect: writes under skills/ need approval
    mode: approve
    description: Changes to skills need approval.
";

const BLOCK_AND_APPROVE_RULES: &str = "\
rules:
  - id: approve-writes
    trigger: always
    effect: writing local files
    mode: approve
    description: Writes need approval.
  - id: block-writes
    trigger: always
    effect: writing local files
    mode: block
    description: Writes are forbidden.
";

#[tokio::test]
async fn web_then_write_activates_and_gates() {
    let fixture = Fixture::new(WEB_THEN_WRITE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Approve);

    // The fetch is an external read: allowed, but it arms the rule.
    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(&mut handle, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;
    assert_eq!(result, GateResult::Allow);
    assert!(handle.state().is_rule_activated("no-write-after-web"));
    assert_eq!(channel.approval_requests_sent(), 0);

    // The write now needs approval; the channel approves.
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/a", "data": "b"}),
            None,
        )
        .await;
    assert_eq!(result, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 1);

    // The request named the rule that forced it.
    let request = channel
        .sent()
        .into_iter()
        .find_map(|m| match m {
            ServerMessage::ApprovalRequest {
                triggered_rules, ..
            } => Some(triggered_rules),
            _ => None,
        })
        .unwrap();
    assert_eq!(request, vec!["no-write-after-web"]);

    // Activation survived persistence.
    drop(handle);
    let reloaded = fixture.sessions.load_state(&session.session_id).unwrap();
    assert!(reloaded.is_rule_activated("no-write-after-web"));
    assert_eq!(reloaded.approved_operations.len(), 1);
}

#[tokio::test]
async fn always_rule_gates_skill_modify_and_denial_sticks() {
    let fixture = Fixture::new(SKILL_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Deny);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "skills/x/SKILL.md", "data": "..."}),
            None,
        )
        .await;
    assert_eq!(
        result,
        GateResult::Deny {
            reason: "User denied this operation.".to_string()
        }
    );
    assert_eq!(channel.approval_requests_sent(), 1);
    // A denial caches nothing.
    assert!(handle.state().approved_operations.is_empty());
}

#[tokio::test]
async fn block_overrides_approve_without_round_trip() {
    let fixture = Fixture::new(BLOCK_AND_APPROVE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Approve);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/a", "data": "b"}),
            None,
        )
        .await;
    let GateResult::Block { reason } = result else {
        panic!("expected block, got {result:?}");
    };
    assert!(reason.contains("block-writes"));
    // No approval request was ever sent.
    assert_eq!(channel.approval_requests_sent(), 0);
}

#[tokio::test]
async fn approved_operation_is_cached_for_identical_repeat() {
    let fixture = Fixture::new(WEB_THEN_WRITE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Approve);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let args = json!({"path": "/a", "data": "b"});

    fixture
        .gate
        .gate(&mut handle, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;
    let first = fixture
        .gate
        .gate(&mut handle, &channel, "write_file", &args, None)
        .await;
    assert_eq!(first, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 1);

    // Identical invocation: allowed with no new round trip, repeatedly.
    for _ in 0..3 {
        let repeat = fixture
            .gate
            .gate(&mut handle, &channel, "write_file", &args, None)
            .await;
        assert_eq!(repeat, GateResult::Allow);
    }
    assert_eq!(channel.approval_requests_sent(), 1);

    // A different argument value is a different operation: new round trip.
    let other = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/other", "data": "b"}),
            None,
        )
        .await;
    assert_eq!(other, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 2);
}

#[tokio::test]
async fn disable_skips_enforcement_then_enable_restores_it() {
    let fixture = Fixture::new(WEB_THEN_WRITE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Approve);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    fixture
        .gate
        .gate(&mut handle, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;

    // Disabled: the write sails through with no approval.
    handle.state_mut().disable_rule("no-write-after-web");
    fixture.sessions.save_state(handle.state()).unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/a", "data": "b"}),
            None,
        )
        .await;
    assert_eq!(result, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 0);

    // Re-enabled: enforcement returns for a fresh operation.
    handle.state_mut().enable_rule("no-write-after-web");
    fixture.sessions.save_state(handle.state()).unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/b", "data": "c"}),
            None,
        )
        .await;
    assert_eq!(result, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 1);
}

#[tokio::test]
async fn reset_severs_activation_and_approvals() {
    let fixture = Fixture::new(WEB_THEN_WRITE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Approve);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let args = json!({"path": "/a", "data": "b"});
    fixture
        .gate
        .gate(&mut handle, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;
    fixture
        .gate
        .gate(&mut handle, &channel, "write_file", &args, None)
        .await;
    assert_eq!(channel.approval_requests_sent(), 1);

    let successor = fixture.sessions.reset(&mut handle).unwrap();
    drop(handle);

    // On the fresh session, the rule is dormant again; the same write is
    // allowed without approval until the trigger re-fires.
    let mut fresh = fixture.sessions.open(&successor.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(&mut fresh, &channel, "write_file", &args, None)
        .await;
    assert_eq!(result, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 1);

    // Re-arm and confirm the approval cache did not carry over.
    fixture
        .gate
        .gate(&mut fresh, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;
    let result = fixture
        .gate
        .gate(&mut fresh, &channel, "write_file", &args, None)
        .await;
    assert_eq!(result, GateResult::Allow);
    assert_eq!(channel.approval_requests_sent(), 2);
}

#[tokio::test]
async fn approval_timeout_converts_to_denial() {
    let fixture = Fixture::with_timeout(SKILL_RULES, Duration::from_millis(50));
    let session = fixture.sessions.create("cli", "").unwrap();

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &SilentChannel,
            "write_file",
            &json!({"path": "skills/x/SKILL.md"}),
            None,
        )
        .await;
    assert_eq!(
        result,
        GateResult::Deny {
            reason: "Approval cancelled.".to_string()
        }
    );
    assert!(handle.state().approved_operations.is_empty());
}

#[tokio::test]
async fn disconnected_channel_cancels_approval() {
    let fixture = Fixture::new(SKILL_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &ClosedChannel,
            "write_file",
            &json!({"path": "skills/x/SKILL.md"}),
            None,
        )
        .await;
    assert!(!result.is_allowed());
}

#[tokio::test]
async fn session_delete_cancels_in_flight_approval() {
    let fixture = Fixture::new(SKILL_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let id = session.session_id.clone();

    let mut handle = fixture.sessions.open(&id).await.unwrap();
    let gate = std::sync::Arc::clone(&fixture.gate);
    let turn = tokio::spawn(async move {
        gate.gate(
            &mut handle,
            &SilentChannel,
            "write_file",
            &json!({"path": "skills/x/SKILL.md"}),
            None,
        )
        .await
    });

    // Let the approval wait start, then delete the session out from under it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    fixture.sessions.delete(&id).unwrap();

    let result = turn.await.unwrap();
    assert!(!result.is_allowed());
}

#[tokio::test]
async fn empty_rule_set_allows_everything() {
    let fixture = Fixture::new("rules: []\n");
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Never);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    for (tool, args) in [
        ("fetch", json!({"url": "https://x"})),
        ("write_file", json!({"path": "/a"})),
        ("exec", json!({"command": "make"})),
    ] {
        let result = fixture.gate.gate(&mut handle, &channel, tool, &args, None).await;
        assert_eq!(result, GateResult::Allow);
    }
    assert_eq!(channel.approval_requests_sent(), 0);
}

#[tokio::test]
async fn every_rule_disabled_allows_but_still_activates() {
    let fixture = Fixture::new(WEB_THEN_WRITE_RULES);
    let session = fixture.sessions.create("cli", "").unwrap();
    let channel = RecordingChannel::new(AutoRespond::Never);

    let mut handle = fixture.sessions.open(&session.session_id).await.unwrap();
    handle.state_mut().disable_rule("no-write-after-web");
    fixture.sessions.save_state(handle.state()).unwrap();

    fixture
        .gate
        .gate(&mut handle, &channel, "fetch", &json!({"url": "https://x"}), None)
        .await;
    let result = fixture
        .gate
        .gate(
            &mut handle,
            &channel,
            "write_file",
            &json!({"path": "/a"}),
            None,
        )
        .await;

    assert_eq!(result, GateResult::Allow);
    // Activation bookkeeping ran even though enforcement was off.
    assert!(handle.state().is_rule_activated("no-write-after-web"));
}
