//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the game-facing REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::crm;
use crate::web::protocol::{
    AchievementView, ActivityRequest, AnalyticsRow, ErrorResponse, FieldErrorView,
    HealthResponse, LeaderboardEntryView, LeaderboardQuery, OverviewResponse,
    ReferralStatsResponse, RegisterRequest, RegisterResponse, SaveSessionRequest,
    SaveSessionResponse, SessionRow, UserRow, UserStatsResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use crypto_bird_core::CoreError;
use std::sync::Arc;
use tracing::error;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        save_session_handler,
        user_stats_handler,
        user_achievements_handler,
        user_referrals_handler,
        leaderboard_handler,
        register_handler,
        activity_handler,
        health_handler,
        crm::overview_handler,
        crm::list_users_handler,
        crm::list_sessions_handler,
        crm::analytics_handler,
    ),
    components(
        schemas(
            SaveSessionRequest, SaveSessionResponse, AchievementView, UserStatsResponse,
            LeaderboardEntryView, ReferralStatsResponse, RegisterRequest, RegisterResponse,
            ActivityRequest, OverviewResponse, UserRow, SessionRow, AnalyticsRow,
            HealthResponse, ErrorResponse, FieldErrorView
        )
    ),
    tags(
        (name = "game", description = "Session ingestion and player progress."),
        (name = "users", description = "Registration and activity from the messaging front-end."),
        (name = "crm", description = "Read-only back-office views.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Converts a core failure into a response. Store failures are logged here and only a
/// generic, retryable message reaches the client.
pub(crate) fn reject(context: &str, err: CoreError) -> HandlerError {
    match err {
        CoreError::Validation(violations) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::from(&violations)),
        ),
        CoreError::NotFound(what) => (StatusCode::NOT_FOUND, Json(ErrorResponse::message(what))),
        CoreError::Persistence(e) => {
            error!("{}: {:?}", context, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::message(format!(
                    "{}, please retry",
                    context
                ))),
            )
        }
    }
}

pub(crate) fn bad_body(rejection: JsonRejection) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::message(rejection.body_text())),
    )
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Save a finished game session.
///
/// Records the session, updates the daily and lifetime counters and awards any
/// achievements the session unlocked, all in one transaction.
#[utoipa::path(
    post,
    path = "/api/game/save-session",
    tag = "game",
    request_body = SaveSessionRequest,
    responses(
        (status = 200, description = "Session saved", body = SaveSessionResponse),
        (status = 400, description = "Invalid session fields", body = ErrorResponse),
        (status = 503, description = "Nothing was saved; the request can be retried", body = ErrorResponse)
    )
)]
pub async fn save_session_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<SaveSessionRequest>, JsonRejection>,
) -> Result<Json<SaveSessionResponse>, HandlerError> {
    let Json(request) = payload.map_err(bad_body)?;
    let outcome = app_state
        .submissions
        .submit(request.into())
        .await
        .map_err(|e| reject("Failed to save game session", e))?;

    Ok(Json(SaveSessionResponse {
        success: true,
        session_id: outcome.session_id,
        achievements: outcome
            .new_achievements
            .into_iter()
            .map(AchievementView::from)
            .collect(),
        message: "Game session saved successfully".to_string(),
    }))
}

/// Lifetime statistics of one player.
#[utoipa::path(
    get,
    path = "/api/user/{user_id}/stats",
    tag = "game",
    params(("user_id" = String, Path, description = "The player's external identity.")),
    responses(
        (status = 200, description = "Aggregated statistics", body = UserStatsResponse),
        (status = 404, description = "Unknown player", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn user_stats_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStatsResponse>, HandlerError> {
    let stats = app_state
        .stats
        .get_user_stats(&user_id)
        .await
        .map_err(|e| reject("Failed to fetch user stats", e))?;
    Ok(Json(stats.into()))
}

/// Achievements held by one player, most recent first.
#[utoipa::path(
    get,
    path = "/api/user/{user_id}/achievements",
    tag = "game",
    params(("user_id" = String, Path, description = "The player's external identity.")),
    responses(
        (status = 200, description = "Held achievements", body = [AchievementView]),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn user_achievements_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AchievementView>>, HandlerError> {
    let held = app_state
        .achievements
        .list_for(&user_id)
        .await
        .map_err(|e| reject("Failed to fetch achievements", e))?;
    Ok(Json(held.into_iter().map(AchievementView::from).collect()))
}

/// Referral count and bonus of one referrer.
#[utoipa::path(
    get,
    path = "/api/user/{user_id}/referrals",
    tag = "game",
    params(("user_id" = String, Path, description = "The referrer's external identity.")),
    responses(
        (status = 200, description = "Referral statistics", body = ReferralStatsResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn user_referrals_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ReferralStatsResponse>, HandlerError> {
    let stats = app_state
        .referrals
        .stats_for(&user_id)
        .await
        .map_err(|e| reject("Failed to fetch referral stats", e))?;
    Ok(Json(stats.into()))
}

/// The best players by best score.
///
/// `limit` defaults to the configured page size and is capped at the configured maximum.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "game",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Ranked players", body = [LeaderboardEntryView]),
        (status = 400, description = "Limit below 1", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn leaderboard_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntryView>>, HandlerError> {
    let config = &app_state.config;
    let requested = query
        .limit
        .unwrap_or_else(|| i64::from(config.leaderboard_default_limit));
    // Anything below 1 collapses to 0, which the view rejects.
    let limit = requested.clamp(0, i64::from(config.leaderboard_max_limit)) as u32;

    let entries = app_state
        .leaderboard
        .top_n(limit)
        .await
        .map_err(|e| reject("Failed to fetch leaderboard", e))?;
    Ok(Json(entries.into_iter().map(LeaderboardEntryView::from).collect()))
}

/// Register a player on first contact.
///
/// Returns 201 when the player is new and 200 when it was already known; a referral
/// is only recorded for a newly created player.
#[utoipa::path(
    post,
    path = "/api/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Player created", body = RegisterResponse),
        (status = 200, description = "Player already known; profile refreshed", body = RegisterResponse),
        (status = 400, description = "Missing identity", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, HandlerError> {
    let Json(request) = payload.map_err(bad_body)?;
    let (profile, referrer_id) = request.into_parts();
    let outcome = app_state
        .registrar
        .register(profile, referrer_id)
        .await
        .map_err(|e| reject("Failed to register user", e))?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RegisterResponse::from(outcome))))
}

/// Record activity of a player and refresh its display-name fields.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/activity",
    tag = "users",
    params(("user_id" = String, Path, description = "The player's external identity.")),
    request_body = ActivityRequest,
    responses(
        (status = 204, description = "Activity recorded"),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn activity_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<ActivityRequest>, JsonRejection>,
) -> Result<StatusCode, HandlerError> {
    let Json(request) = payload.map_err(bad_body)?;
    app_state
        .registrar
        .touch(request.into_profile(user_id))
        .await
        .map_err(|e| reject("Failed to record activity", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The server is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}
