pub mod crm;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::rest::ApiDoc;
use crate::web::state::AppState;

/// Builds the complete application: API routes, CORS and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(app_state.config.cors_allowed_origin.as_deref());

    let api_router = Router::new()
        .route("/api/game/save-session", post(rest::save_session_handler))
        .route("/api/user/{user_id}/stats", get(rest::user_stats_handler))
        .route(
            "/api/user/{user_id}/achievements",
            get(rest::user_achievements_handler),
        )
        .route(
            "/api/user/{user_id}/referrals",
            get(rest::user_referrals_handler),
        )
        .route("/api/leaderboard", get(rest::leaderboard_handler))
        .route("/api/users/register", post(rest::register_handler))
        .route("/api/users/{user_id}/activity", post(rest::activity_handler))
        .route("/api/crm/overview", get(crm::overview_handler))
        .route("/api/crm/users", get(crm::list_users_handler))
        .route("/api/crm/sessions", get(crm::list_sessions_handler))
        .route("/api/crm/analytics", get(crm::analytics_handler))
        .route("/health", get(rest::health_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let permissive = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    match allowed_origin {
        None => permissive,
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!("CORS_ALLOWED_ORIGIN '{}' is not a valid header value; allowing any origin", origin);
                permissive
            }
        },
    }
}
