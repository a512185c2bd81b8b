//! Two-coordinator gossip round trips: task offers, remote claims, and the
//! result traveling back to its origin.

use crate::harness::{subtask, wait_until, TestAgent, TestCoordinator, TestNet};
use axum::extract::State;
use cm_02_task_queue::TimeSource;
use axum::Json;
use cm_06_gateway::domain::requests::{RegisterRequest, SubmitRequest};
use cm_06_gateway::routes::{agent, submit};
use shared_types::{
    AgentMode, MeshMessage, MeshMessageType, SandboxMode, SubtaskStatus, TaskOfferPayload,
};

fn register_request(worker: &TestAgent) -> RegisterRequest {
    RegisterRequest {
        agent_id: worker.agent_id.clone(),
        registration_token: "tok-abc".into(),
        os: "linux".into(),
        version: "1.0.0".into(),
        mode: AgentMode::SwarmOnly,
        owner_email: "ops@example.org".into(),
        sandbox_mode: SandboxMode::Docker,
        max_concurrent_tasks: 1,
        local_model_provider: "ollama".into(),
        model_catalog: vec![],
        active_model: None,
        public_key_pem: Some(worker.public_key_pem()),
        x25519_public_key: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn offer_claim_and_result_round_trip() {
    let net = TestNet::new();
    let a = TestCoordinator::new("coord-a", &net, vec![subtask("S1", "T1", &[])]);
    let b = TestCoordinator::new("coord-b", &net, vec![]);
    a.link(&b);

    // B has the only live agent in the mesh.
    let worker = TestAgent::new("worker-b");
    agent::register(State(b.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();

    // A accepts the task and gossips the offer.
    submit::submit(
        State(a.state.clone()),
        Json(SubmitRequest {
            task_id: "T1".into(),
            prompt: "double 2".into(),
            language: "python".into(),
            snapshot_ref: "a".repeat(40),
            project_meta: serde_json::Value::Null,
            account_id: None,
        }),
    )
    .await
    .unwrap();

    // B enqueues the offer and its task_claim empties A's queue.
    wait_until(|| b.state.queue.queued_len() == 1).await;
    wait_until(|| a.state.queue.queued_len() == 0).await;
    assert_eq!(
        a.state.queue.get("S1").unwrap().status,
        SubtaskStatus::RemoteClaimed
    );
    assert!(b.state.mesh.origin_for("S1").is_some());

    // B's worker executes and the result travels home to A.
    let body = serde_json::to_vec(&serde_json::json!({"agentId": worker.agent_id})).unwrap();
    let headers = worker.signed_headers("POST", "/pull", &body, b.time.now_ms());
    let pulled = agent::pull(State(b.state.clone()), None, headers, body.into())
        .await
        .unwrap()
        .0;
    assert_eq!(pulled.subtask.unwrap().id, "S1");

    let body = serde_json::to_vec(&serde_json::json!({
        "subtaskId": "S1", "taskId": "T1", "ok": true, "output": "4", "durationMs": 123,
    }))
    .unwrap();
    let headers = worker.signed_headers("POST", "/result", &body, b.time.now_ms());
    agent::result(State(b.state.clone()), None, headers, body.into())
        .await
        .unwrap();

    wait_until(|| b.state.mesh.origin_for("S1").is_none()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_offers_enqueue_once() {
    let net = TestNet::new();
    let a = TestCoordinator::new("coord-a", &net, vec![]);
    let b = TestCoordinator::new("coord-b", &net, vec![]);
    a.link(&b);

    let worker = TestAgent::new("worker-b");
    agent::register(State(b.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();

    let offer = TaskOfferPayload {
        subtask: subtask("S9", "T9", &[]),
        origin_coordinator_id: "coord-a".into(),
        origin_coordinator_url: a.url.clone(),
    };
    for issued_at in [1, 2] {
        let message = MeshMessage::signed(
            &a.keypair,
            MeshMessageType::TaskOffer,
            "coord-a",
            b.time.now_ms() + issued_at,
            serde_json::to_value(&offer).unwrap(),
        )
        .unwrap();
        b.state
            .mesh
            .handle_message(message, b.time.now_ms())
            .await
            .unwrap();
    }

    wait_until(|| b.state.queue.queued_len() == 1).await;
    assert_eq!(b.state.queue.queued_len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn offer_ignored_without_live_agents() {
    let net = TestNet::new();
    let a = TestCoordinator::new("coord-a", &net, vec![]);
    let b = TestCoordinator::new("coord-b", &net, vec![]);
    a.link(&b);

    let offer = TaskOfferPayload {
        subtask: subtask("S9", "T9", &[]),
        origin_coordinator_id: "coord-a".into(),
        origin_coordinator_url: a.url.clone(),
    };
    let message = MeshMessage::signed(
        &a.keypair,
        MeshMessageType::TaskOffer,
        "coord-a",
        b.time.now_ms(),
        serde_json::to_value(&offer).unwrap(),
    )
    .unwrap();
    b.state
        .mesh
        .handle_message(message, b.time.now_ms())
        .await
        .unwrap();

    assert_eq!(b.state.queue.queued_len(), 0);
    assert!(b.state.mesh.origin_for("S9").is_none());
}
