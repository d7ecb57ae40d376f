//! Drives the real router end to end over the in-memory store.

use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use crypto_bird_core::InMemoryStore;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(store: InMemoryStore) -> Router {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "LEADERBOARD_MAX_LIMIT" => Some("50".to_string()),
        _ => None,
    })
    .unwrap();
    router(Arc::new(AppState::new(Arc::new(store), Arc::new(config))))
}

fn app() -> Router {
    app_with(InMemoryStore::new())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn save(app: &Router, user_id: &str, score: i64) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/game/save-session",
        Some(json!({
            "user_id": user_id,
            "score": score,
            "level": 1,
            "coins_earned": 3,
            "duration_seconds": 42
        })),
    )
    .await
}

fn achievement_types(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|a| a["type"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn saved_session_reports_new_achievements_and_updates_stats() {
    let app = app();

    // Legacy field names from older clients.
    let (status, body) = send(
        &app,
        "POST",
        "/api/game/save-session",
        Some(json!({
            "telegram_id": "1001",
            "score": 600,
            "level": 4,
            "coins_earned": 12,
            "duration": 95
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        achievement_types(&body["achievements"]),
        vec!["first_game", "score_100", "score_500"]
    );

    let (status, stats) = send(&app, "GET", "/api/user/1001/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_games"], json!(1));
    assert_eq!(stats["best_score"], json!(600));
    assert_eq!(stats["total_coins"], json!(12));
    assert_eq!(stats["avg_score"], json!(600.0));

    // Same thresholds again: nothing new.
    let (_, body) = save(&app, "1001", 700).await;
    assert!(achievement_types(&body["achievements"]).is_empty());
}

#[tokio::test]
async fn save_session_response_uses_the_client_keys() {
    let (status, body) = save(&app(), "1001", 120).await;
    assert_eq!(status, StatusCode::OK);

    let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["achievements", "message", "session_id", "success"]);
    assert!(body["achievements"].is_array());
}

#[tokio::test]
async fn invalid_session_lists_every_bad_field_and_stores_nothing() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/game/save-session",
        Some(json!({
            "user_id": "1001",
            "score": -5,
            "level": 0,
            "coins_earned": 0,
            "duration_seconds": 10
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["score", "level"]);

    let (status, _) = send(&app, "GET", "/api/user/1001/stats", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/game/save-session",
        Some(json!({ "user_id": "1001", "score": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn failed_award_rolls_back_and_asks_for_a_retry() {
    let app = app_with(InMemoryStore::new().with_failing_awards(["score_100"]));

    let (status, body) = save(&app, "1001", 150).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("retry"));

    let (status, _) = send(&app, "GET", "/api/user/1001/stats", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, held) = send(&app, "GET", "/api/user/1001/achievements", None).await;
    assert!(achievement_types(&held).is_empty());
}

#[tokio::test]
async fn failed_referral_write_registers_nobody() {
    let app = app_with(InMemoryStore::new().with_failing_referrals());

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/register",
        Some(json!({ "user_id": "bob", "referrer_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&app, "GET", "/api/user/bob/stats", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, referrals) = send(&app, "GET", "/api/user/alice/referrals", None).await;
    assert_eq!(referrals["referral_count"], json!(0));
}

#[tokio::test]
async fn achievements_are_listed_for_the_player() {
    let app = app();
    save(&app, "1001", 120).await;

    let (status, held) = send(&app, "GET", "/api/user/1001/achievements", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut types = achievement_types(&held);
    types.sort();
    assert_eq!(types, vec!["first_game", "score_100"]);

    let (status, none) = send(&app, "GET", "/api/user/nobody/achievements", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(achievement_types(&none).is_empty());
}

#[tokio::test]
async fn leaderboard_ranks_by_best_score_and_validates_limit() {
    let app = app();
    save(&app, "low", 100).await;
    save(&app, "high", 900).await;
    save(&app, "mid", 400).await;

    let (status, board) = send(&app, "GET", "/api/leaderboard?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["user_id"], json!("high"));
    assert_eq!(board[0]["rank"], json!(1));
    assert_eq!(board[1]["user_id"], json!("mid"));

    let (status, board) = send(&app, "GET", "/api/leaderboard?limit=1000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board.as_array().unwrap().len(), 3);

    let (status, _) = send(&app, "GET", "/api/leaderboard?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_records_one_referral_per_new_player() {
    let app = app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/register",
        Some(json!({ "user_id": "alice", "first_name": "Alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "POST",
        "/api/users/register",
        Some(json!({ "user_id": "bob", "referrer_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["referral_recorded"], json!(true));

    // Re-registering never adds a second referral.
    let (status, body) = send(
        &app,
        "POST",
        "/api/users/register",
        Some(json!({ "user_id": "bob", "referrer_id": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(false));
    assert_eq!(body["referral_recorded"], json!(false));

    let (status, referrals) = send(&app, "GET", "/api/user/alice/referrals", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(referrals["referral_count"], json!(1));
    assert_eq!(referrals["bonus_amount"], json!(100));
    assert_eq!(referrals["bonus_active"], json!(true));

    let (_, referrals) = send(&app, "GET", "/api/user/bob/referrals", None).await;
    assert_eq!(referrals["referral_count"], json!(0));
    assert_eq!(referrals["bonus_active"], json!(false));
}

#[tokio::test]
async fn activity_refreshes_the_display_name() {
    let app = app();
    save(&app, "1001", 50).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/1001/activity",
        Some(json!({ "username": "birdie" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, board) = send(&app, "GET", "/api/leaderboard", None).await;
    assert_eq!(board[0]["display_name"], json!("birdie"));
}

#[tokio::test]
async fn crm_views_page_and_validate() {
    let app = app();
    save(&app, "a", 100).await;
    save(&app, "a", 300).await;
    save(&app, "b", 200).await;

    let (status, overview) = send(&app, "GET", "/api/crm/overview", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total_users"], json!(2));
    assert_eq!(overview["total_games"], json!(3));
    assert_eq!(overview["games_today"], json!(3));
    assert_eq!(overview["max_score"], json!(300));

    let (status, sessions) = send(&app, "GET", "/api/crm/sessions?page=1&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions.as_array().unwrap().len(), 2);
    let (_, rest) = send(&app, "GET", "/api/crm/sessions?page=2&limit=2", None).await;
    assert_eq!(rest.as_array().unwrap().len(), 1);

    let (status, users) = send(&app, "GET", "/api/crm/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "GET", "/api/crm/users?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, days) = send(&app, "GET", "/api/crm/analytics?days=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let days = days.as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["games_count"], json!(3));
    assert_eq!(days[0]["unique_users"], json!(2));

    let (status, _) = send(&app, "GET", "/api/crm/analytics?days=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}
