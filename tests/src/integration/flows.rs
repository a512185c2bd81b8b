//! Single-coordinator end-to-end flows, driven through the gateway
//! handlers: registration, submission, claim discipline, results, replay
//! defense, economy gates, and the blacklist.

use crate::harness::{subtask, TestAgent, TestCoordinator, TestNet};
use axum::extract::{Path, State};
use cm_02_task_queue::TimeSource;
use axum::Json;
use cm_06_gateway::domain::requests::{
    BlacklistPostRequest, ConfirmIntentRequest, CreateIntentRequest, HeartbeatRequest,
    RegisterRequest, ResultRequest, SubmitRequest,
};
use cm_06_gateway::routes::{agent, economy, security, submit};
use shared_types::{AgentMode, BlacklistReasonCode, ChainEventType, SandboxMode, GENESIS_HASH};

fn register_request(agent: &TestAgent) -> RegisterRequest {
    RegisterRequest {
        agent_id: agent.agent_id.clone(),
        registration_token: "tok-abc".into(),
        os: "linux".into(),
        version: "1.0.0".into(),
        mode: AgentMode::SwarmOnly,
        owner_email: "ops@example.org".into(),
        sandbox_mode: SandboxMode::Docker,
        max_concurrent_tasks: 1,
        local_model_provider: "ollama".into(),
        model_catalog: vec!["qwen2.5-coder".into()],
        active_model: None,
        public_key_pem: Some(agent.public_key_pem()),
        x25519_public_key: None,
    }
}

fn submit_request(task_id: &str) -> SubmitRequest {
    SubmitRequest {
        task_id: task_id.into(),
        prompt: "double 2".into(),
        language: "python".into(),
        snapshot_ref: "a".repeat(40),
        project_meta: serde_json::Value::Null,
        account_id: None,
    }
}

#[tokio::test]
async fn register_with_portal_disabled_appends_approval() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![]);
    let worker = TestAgent::new("worker-1");

    let response = agent::register(
        State(coord.state.clone()),
        None,
        Json(register_request(&worker)),
    )
    .await
    .unwrap()
    .0;

    assert!(response.accepted);
    assert_eq!(response.policy.max_concurrent_tasks, 1);
    assert_eq!(response.mode, AgentMode::SwarmOnly);

    let records = coord.state.chain.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, ChainEventType::NodeApproval);
    assert_eq!(records[0].sequence, 1);
    assert_eq!(records[0].prev_hash, GENESIS_HASH);
}

#[tokio::test]
async fn submit_decomposes_and_enqueues() {
    let net = TestNet::new();
    let coord = TestCoordinator::new(
        "coord-a",
        &net,
        vec![subtask("S1", "T1", &[]), subtask("S2", "T1", &[])],
    );

    let response = submit::submit(State(coord.state.clone()), Json(submit_request("T1")))
        .await
        .unwrap()
        .0;
    assert_eq!(response.task_id, "T1");
    assert_eq!(response.subtasks, vec!["S1".to_string(), "S2".to_string()]);

    let records = coord.state.chain.snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, ChainEventType::TaskEnqueue);
    assert_eq!(coord.state.queue.queued_len(), 2);
}

#[tokio::test]
async fn inference_outage_is_502_and_nothing_enqueued() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![]);

    let error = submit::submit(State(coord.state.clone()), Json(submit_request("T1")))
        .await
        .unwrap_err();
    assert_eq!(error.code, "inference_service_unavailable");
    assert_eq!(coord.state.queue.queued_len(), 0);
    assert_eq!(coord.state.chain.len(), 0);
}

async fn pull_once(
    coord: &TestCoordinator,
    worker: &TestAgent,
) -> cm_06_gateway::domain::requests::PullResponse {
    let body = serde_json::to_vec(&serde_json::json!({"agentId": worker.agent_id})).unwrap();
    let headers = worker.signed_headers("POST", "/pull", &body, coord.time.now_ms());
    agent::pull(
        State(coord.state.clone()),
        None,
        headers,
        body.into(),
    )
    .await
    .unwrap()
    .0
}

#[tokio::test]
async fn two_pulls_drain_the_queue_third_is_empty() {
    let net = TestNet::new();
    let coord = TestCoordinator::new(
        "coord-a",
        &net,
        vec![subtask("S1", "T1", &[]), subtask("S2", "T1", &[])],
    );
    let worker = TestAgent::new("worker-1");
    agent::register(State(coord.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();
    submit::submit(State(coord.state.clone()), Json(submit_request("T1")))
        .await
        .unwrap();

    let first = pull_once(&coord, &worker).await;
    assert_eq!(first.subtask.unwrap().id, "S1");
    let second = pull_once(&coord, &worker).await;
    assert_eq!(second.subtask.unwrap().id, "S2");
    let third = pull_once(&coord, &worker).await;
    assert!(third.subtask.is_none());
}

#[tokio::test]
async fn result_completes_and_accrues_earnings() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![subtask("S1", "T1", &[])]);
    let worker = TestAgent::new("worker-1");
    agent::register(State(coord.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();
    submit::submit(State(coord.state.clone()), Json(submit_request("T1")))
        .await
        .unwrap();
    pull_once(&coord, &worker).await;

    let result = ResultRequest {
        subtask_id: "S1".into(),
        task_id: "T1".into(),
        ok: true,
        output: "4".into(),
        duration_ms: 123,
        error: None,
        envelope: None,
    };
    let body = serde_json::to_vec(&serde_json::json!({
        "subtaskId": result.subtask_id,
        "taskId": result.task_id,
        "ok": result.ok,
        "output": result.output,
        "durationMs": result.duration_ms,
    }))
    .unwrap();
    let headers = worker.signed_headers("POST", "/result", &body, coord.time.now_ms());
    agent::result(State(coord.state.clone()), None, headers, body.into())
        .await
        .unwrap();

    let types: Vec<ChainEventType> = coord
        .state
        .chain
        .snapshot()
        .iter()
        .map(|r| r.event_type)
        .collect();
    assert!(types.contains(&ChainEventType::TaskComplete));
    assert!(types.contains(&ChainEventType::EarningsAccrual));

    let earnings = coord
        .state
        .chain
        .stats()
        .with_earnings(|e| e.get("ops@example.org"))
        .unwrap();
    assert_eq!(earnings.credits, 5);
    assert_eq!(earnings.task_count, 1);
}

#[tokio::test]
async fn replayed_nonce_is_rejected_within_ttl() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![]);
    let worker = TestAgent::new("worker-1");
    agent::register(State(coord.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();

    let request = HeartbeatRequest {
        agent_id: worker.agent_id.clone(),
        power: None,
        active_model: None,
    };
    let body = serde_json::to_vec(&serde_json::json!({"agentId": request.agent_id})).unwrap();
    let now = coord.time.now_ms();
    let headers = worker.signed_headers_with_nonce("POST", "/heartbeat", &body, now, "n-1");

    agent::heartbeat(
        State(coord.state.clone()),
        None,
        headers.clone(),
        body.clone().into(),
    )
    .await
    .unwrap();

    let error = agent::heartbeat(State(coord.state.clone()), None, headers, body.into())
        .await
        .unwrap_err();
    assert_eq!(error.code, "replay_attempt");
}

#[tokio::test]
async fn submit_economy_gates() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![subtask("S1", "T1", &[])]);

    let mut request = submit_request("T1");
    request.account_id = Some("acct-1".into());

    // No contribution history at all.
    let error = submit::submit(State(coord.state.clone()), Json(request.clone()))
        .await
        .unwrap_err();
    assert_eq!(error.code, "contribute_first_required");

    // Known account, zero balance.
    coord
        .state
        .chain
        .stats()
        .with_earnings_mut(|e| e.credit("acct-1", 0));
    let error = submit::submit(State(coord.state.clone()), Json(request.clone()))
        .await
        .unwrap_err();
    assert_eq!(error.code, "insufficient_credits");

    // Funded account succeeds and is debited.
    coord
        .state
        .chain
        .stats()
        .with_earnings_mut(|e| e.credit("acct-1", 10));
    submit::submit(State(coord.state.clone()), Json(request)).await.unwrap();
    let balance = coord
        .state
        .chain
        .stats()
        .with_earnings(|e| e.get("acct-1"))
        .unwrap()
        .credits;
    assert_eq!(balance, 9);
}

#[tokio::test]
async fn double_settlement_mints_once() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![]);

    let created = economy::create_intent(
        State(coord.state.clone()),
        Json(CreateIntentRequest {
            account_id: "acct-1".into(),
            credits: 100,
        }),
    )
    .await
    .unwrap()
    .0;
    let intent_id = created["intent"]["intentId"].as_str().unwrap().to_string();

    economy::confirm_intent(
        State(coord.state.clone()),
        Path(intent_id.clone()),
        Json(ConfirmIntentRequest {
            tx_ref: "tx-77".into(),
        }),
    )
    .await
    .unwrap();

    let error = economy::confirm_intent(
        State(coord.state.clone()),
        Path(intent_id),
        Json(ConfirmIntentRequest {
            tx_ref: "tx-77".into(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(error.code, "duplicate_tx_ref_rejected");

    let balance = coord
        .state
        .chain
        .stats()
        .with_earnings(|e| e.get("acct-1"))
        .unwrap()
        .credits;
    assert_eq!(balance, 100);
}

#[tokio::test]
async fn blacklisted_agent_is_cut_off() {
    let net = TestNet::new();
    let coord = TestCoordinator::new("coord-a", &net, vec![subtask("S1", "T1", &[])]);
    let worker = TestAgent::new("worker-1");
    agent::register(State(coord.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();

    let reporter = shared_crypto::Ed25519KeyPair::generate();
    let evidence = "ab".repeat(32);
    let signature = cm_04_agent_registry::domain::blacklist::sign_reporter_claim(
        &reporter,
        "worker-1",
        &evidence,
        BlacklistReasonCode::DosBehavior,
    )
    .unwrap();

    let posted = security::blacklist_post(
        State(coord.state.clone()),
        Json(BlacklistPostRequest {
            agent_id: "worker-1".into(),
            reason_code: BlacklistReasonCode::DosBehavior,
            reason: "ping flood".into(),
            evidence_hash_sha256: evidence,
            reporter_id: "policy-engine".into(),
            reporter_signature: Some(signature),
            reporter_public_key_pem: Some(reporter.public_key().to_pem().unwrap()),
            expires_at_ms: None,
        }),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(posted["version"], 1);

    // Heartbeat answers with the ban instead of work.
    let body = serde_json::to_vec(&serde_json::json!({"agentId": "worker-1"})).unwrap();
    let headers = worker.signed_headers("POST", "/heartbeat", &body, coord.time.now_ms());
    let heartbeat = agent::heartbeat(State(coord.state.clone()), None, headers, body.into())
        .await
        .unwrap()
        .0;
    assert!(!heartbeat.ok);
    assert_eq!(heartbeat.blacklisted, Some(true));

    // Pull is refused outright.
    let body = serde_json::to_vec(&serde_json::json!({"agentId": "worker-1"})).unwrap();
    let headers = worker.signed_headers("POST", "/pull", &body, coord.time.now_ms());
    let error = agent::pull(State(coord.state.clone()), None, headers, body.into())
        .await
        .unwrap_err();
    assert_eq!(error.code, "agent_blacklisted");
}

#[tokio::test]
async fn dependency_batch_releases_on_completion() {
    let net = TestNet::new();
    let coord = TestCoordinator::new(
        "coord-a",
        &net,
        vec![subtask("S1", "T1", &[]), subtask("S2", "T1", &["S1"])],
    );
    let worker = TestAgent::new("worker-1");
    agent::register(State(coord.state.clone()), None, Json(register_request(&worker)))
        .await
        .unwrap();
    submit::submit(State(coord.state.clone()), Json(submit_request("T1")))
        .await
        .unwrap();

    assert_eq!(coord.state.queue.queued_len(), 1);
    assert_eq!(coord.state.queue.held_len(), 1);

    let first = pull_once(&coord, &worker).await;
    assert_eq!(first.subtask.unwrap().id, "S1");
    // S2 is held until S1 completes.
    assert!(pull_once(&coord, &worker).await.subtask.is_none());

    let body = serde_json::to_vec(&serde_json::json!({
        "subtaskId": "S1", "taskId": "T1", "ok": true, "output": "4", "durationMs": 5,
    }))
    .unwrap();
    let headers = worker.signed_headers("POST", "/result", &body, coord.time.now_ms());
    agent::result(State(coord.state.clone()), None, headers, body.into())
        .await
        .unwrap();

    let released = pull_once(&coord, &worker).await;
    assert_eq!(released.subtask.unwrap().id, "S2");
}
