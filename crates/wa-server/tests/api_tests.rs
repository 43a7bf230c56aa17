// SPDX-License-Identifier: MIT OR Apache-2.0
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wa_eventlog::EventLog;
use wa_hub::MatchHub;
use wa_judging::JudgingStore;
use wa_provider::mock::MockProvider;
use wa_runner::MatchRunner;
use wa_server::{build_app, AppState};

async fn test_state() -> Arc<AppState> {
    let event_log = EventLog::connect("sqlite::memory:").await.unwrap();
    let judging = JudgingStore::connect("sqlite::memory:").await.unwrap();
    let hub = Arc::new(MatchHub::new(256));
    let runner = MatchRunner::new(event_log, hub, Arc::new(MockProvider::new()));
    Arc::new(AppState { runner, judging: Arc::new(judging) })
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() { serde_json::Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, json)
}

async fn post_json(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() { serde_json::Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, json)
}

async fn wait_until_terminal(state: &Arc<AppState>, id: Uuid) -> serde_json::Value {
    for _ in 0..200 {
        let m = state.runner.get_match(id).await.unwrap().unwrap();
        if m.status != wa_contracts::MatchStatus::Running {
            return serde_json::to_value(&m).unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("match never reached a terminal status");
}

#[tokio::test]
async fn health_returns_ok() {
    let app = build_app(test_state().await);
    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["contract_version"], wa_contracts::CONTRACT_VERSION);
    assert!(json["time"].is_string());
}

#[tokio::test]
async fn create_match_returns_201_with_challenge() {
    let app = build_app(test_state().await);
    let (status, json) = post_json(app, "/matches", serde_json::json!({ "seed": 42, "tier": 1 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["seed"], 42);
    assert_eq!(json["status"], "running");
}

#[tokio::test]
async fn create_match_rejects_an_out_of_range_tier() {
    let app = build_app(test_state().await);
    let (status, _) = post_json(app, "/matches", serde_json::json!({ "tier": 9 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_match_404s_for_an_unknown_id() {
    let app = build_app(test_state().await);
    let (status, _) = get_json(app, &format!("/matches/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_matches_includes_a_created_match() {
    let state = test_state().await;
    let created = state.runner.create(Some(7), wa_contracts::Tier::One).await.unwrap();

    let app = build_app(state);
    let (status, json) = get_json(app, "/matches").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<String> = json.as_array().unwrap().iter().map(|m| m["id"].as_str().unwrap().to_string()).collect();
    assert!(ids.contains(&created.id.to_string()));
}

#[tokio::test]
async fn artifacts_404_for_an_unknown_match() {
    let app = build_app(test_state().await);
    let (status, _) = get_json(app, &format!("/matches/{}/artifacts", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn artifacts_available_after_completion() {
    let state = test_state().await;
    let created = state.runner.create(Some(42), wa_contracts::Tier::One).await.unwrap();
    let finished = wait_until_terminal(&state, created.id).await;
    assert_eq!(finished["status"], "completed");

    let app = build_app(state);
    let (status, json) = get_json(app, &format!("/matches/{}/artifacts", created.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["team_a"]["canon"].is_object());
    assert!(json["team_b"]["prompt_pack"].is_object());
}

#[tokio::test]
async fn judging_blind_hides_real_team_identity() {
    let state = test_state().await;
    let created = state.runner.create(Some(42), wa_contracts::Tier::One).await.unwrap();
    wait_until_terminal(&state, created.id).await;

    let app = build_app(state);
    let (status, json) = get_json(app, &format!("/matches/{}/judging/blind", created.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["world_1"]["blind_id"], "WORLD-1");
    assert_eq!(json["world_2"]["blind_id"], "WORLD-2");
}

#[tokio::test]
async fn submit_and_list_scores_round_trip() {
    let state = test_state().await;
    let created = state.runner.create(Some(42), wa_contracts::Tier::One).await.unwrap();
    wait_until_terminal(&state, created.id).await;

    let app = build_app(state.clone());
    let (blind_status, blind) = get_json(app, &format!("/matches/{}/judging/blind", created.id)).await;
    assert_eq!(blind_status, StatusCode::OK);
    let blind_id = blind["world_1"]["blind_id"].as_str().unwrap().to_string();

    let app = build_app(state.clone());
    let submission = serde_json::json!({
        "judge": "alice",
        "blind_id": blind_id,
        "scores": [5, 4, 5, 4, 5],
        "notes": null,
    });
    let (status, record) = post_json(app, &format!("/matches/{}/judging/scores", created.id), submission).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["judge"], "alice");

    let app = build_app(state);
    let (status, scores) = get_json(app, &format!("/matches/{}/judging/scores", created.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scores.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn judging_reveal_404s_until_a_blind_package_has_been_requested() {
    let state = test_state().await;
    let created = state.runner.create(Some(42), wa_contracts::Tier::One).await.unwrap();
    wait_until_terminal(&state, created.id).await;

    let app = build_app(state.clone());
    let (status, _) = get_json(app, &format!("/matches/{}/judging/reveal", created.id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let app2 = build_app(state.clone());
    get_json(app2, &format!("/matches/{}/judging/blind", created.id)).await;

    let app3 = build_app(state);
    let (status, json) = get_json(app3, &format!("/matches/{}/judging/reveal", created.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_object().unwrap().len() == 2);
}
