//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::game::{Command, MatchPhase, PhaseStatus};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/phase", get(phase_handler))
        .route("/ws", get(ws_handler));

    if state.config.operator_routes {
        let operator_routes = Router::new()
            .route("/dev/force-start", post(force_start_handler))
            .route("/dev/reset", post(reset_handler));
        router = router.merge(operator_routes);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health and status
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
    })
}

async fn phase_handler(State(state): State<AppState>) -> Result<Json<PhaseStatus>, AppError> {
    let status = ask(&state, |reply| Command::Status { reply }).await?;
    Ok(Json(status))
}

// ============================================================================
// Operator endpoints
// ============================================================================

#[derive(Serialize)]
struct OperatorResponse {
    ok: bool,
    phase: MatchPhase,
}

async fn force_start_handler(
    State(state): State<AppState>,
) -> Result<Json<OperatorResponse>, AppError> {
    let phase = ask(&state, |reply| Command::ForceStart { reply }).await?;
    Ok(Json(OperatorResponse {
        ok: phase == MatchPhase::Live,
        phase,
    }))
}

async fn reset_handler(State(state): State<AppState>) -> Result<Json<OperatorResponse>, AppError> {
    let phase = ask(&state, |reply| Command::Reset { reply }).await?;
    Ok(Json(OperatorResponse { ok: true, phase }))
}

/// Send a command carrying a reply channel and wait for the match task's answer
async fn ask<T>(
    state: &AppState,
    command: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T, AppError> {
    let (reply, rx) = oneshot::channel();
    if !state.game.send(command(reply)).await {
        return Err(AppError::Unavailable);
    }
    rx.await.map_err(|_| AppError::Unavailable)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Match is not running")]
    Unavailable,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GameConfig};
    use crate::game::GameMatch;

    fn app_state(game_config: GameConfig) -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            jwt_secret: "secret".to_string(),
            client_origin: "http://localhost:3000".to_string(),
            operator_routes: true,
            game: game_config.clone(),
        };
        let (game_match, handle) = GameMatch::new(game_config, 1);
        tokio::spawn(game_match.run());
        AppState::new(config, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn phase_reports_lobby_for_fresh_match() {
        let state = app_state(GameConfig::default());
        let Json(status) = phase_handler(State(state)).await.unwrap();
        assert_eq!(status.phase, MatchPhase::Lobby);
        assert_eq!(status.players, 0);
        assert_eq!(status.min_players, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn force_start_without_participants_goes_live() {
        let state = app_state(GameConfig::default());
        let Json(response) = force_start_handler(State(state.clone())).await.unwrap();
        assert!(response.ok);
        assert_eq!(response.phase, MatchPhase::Live);

        let Json(response) = reset_handler(State(state)).await.unwrap();
        assert_eq!(response.phase, MatchPhase::Lobby);
    }

    #[tokio::test]
    async fn stopped_match_is_unavailable() {
        let (game_match, handle) = GameMatch::new(GameConfig::default(), 1);
        drop(game_match);
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            jwt_secret: "secret".to_string(),
            client_origin: String::new(),
            operator_routes: false,
            game: GameConfig::default(),
        };
        let state = AppState::new(config, handle);
        assert!(matches!(
            phase_handler(State(state)).await,
            Err(AppError::Unavailable)
        ));
    }
}
