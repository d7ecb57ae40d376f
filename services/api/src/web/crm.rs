//! services/api/src/web/crm.rs
//!
//! Read-only back-office endpoints backing the CRM dashboard.

use crate::web::protocol::{
    AnalyticsQuery, AnalyticsRow, ErrorResponse, OverviewResponse, PageQuery, SessionRow, UserRow,
};
use crate::web::rest::{reject, HandlerError};
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use crypto_bird_core::Page;
use std::sync::Arc;

const DEFAULT_USERS_PER_PAGE: i64 = 50;
const DEFAULT_SESSIONS_PER_PAGE: i64 = 100;
const DEFAULT_ANALYTICS_DAYS: i64 = 30;

fn page_of(query: &PageQuery, default_limit: i64) -> Page {
    Page::new(query.page.unwrap_or(1), query.limit.unwrap_or(default_limit))
}

/// Headline numbers for the whole game.
#[utoipa::path(
    get,
    path = "/api/crm/overview",
    tag = "crm",
    responses(
        (status = 200, description = "Totals and today's activity", body = OverviewResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn overview_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<OverviewResponse>, HandlerError> {
    let overview = app_state
        .backoffice
        .overview()
        .await
        .map_err(|e| reject("Failed to fetch overview", e))?;
    Ok(Json(overview.into()))
}

/// Players, newest registrations first.
#[utoipa::path(
    get,
    path = "/api/crm/users",
    tag = "crm",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of players", body = [UserRow]),
        (status = 400, description = "Page below 1 or limit out of range", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<UserRow>>, HandlerError> {
    let users = app_state
        .backoffice
        .list_users(page_of(&query, DEFAULT_USERS_PER_PAGE))
        .await
        .map_err(|e| reject("Failed to fetch users", e))?;
    Ok(Json(users.into_iter().map(UserRow::from).collect()))
}

/// Sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/crm/sessions",
    tag = "crm",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of sessions", body = [SessionRow]),
        (status = 400, description = "Page below 1 or limit out of range", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<SessionRow>>, HandlerError> {
    let sessions = app_state
        .backoffice
        .list_sessions(page_of(&query, DEFAULT_SESSIONS_PER_PAGE))
        .await
        .map_err(|e| reject("Failed to fetch sessions", e))?;
    Ok(Json(sessions.into_iter().map(SessionRow::from).collect()))
}

/// Per-day activity for the last `days` days, newest first.
#[utoipa::path(
    get,
    path = "/api/crm/analytics",
    tag = "crm",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Daily activity", body = [AnalyticsRow]),
        (status = 400, description = "Days out of range", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    )
)]
pub async fn analytics_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Vec<AnalyticsRow>>, HandlerError> {
    let days = query.days.unwrap_or(DEFAULT_ANALYTICS_DAYS);
    let rows = app_state
        .backoffice
        .daily_analytics(days)
        .await
        .map_err(|e| reject("Failed to fetch analytics", e))?;
    Ok(Json(rows.into_iter().map(AnalyticsRow::from).collect()))
}
