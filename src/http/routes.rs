//! HTTP route definitions

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::GameError;
use crate::session::directory::SettingsUpdate;
use crate::store::catalog::{Difficulty, Genre};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::hub::announce;
use crate::ws::protocol::{
    ActorPromptView, GameSnapshot, RoundResult, RoundView, ScoreboardView, ServerMsg, TeamView,
    PROTOCOL_VERSION,
};

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
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let game_routes = Router::new()
        .route("/api/games", post(create_game_handler))
        .route("/api/games/:code", get(get_game_handler))
        .route("/api/games/:code/join", post(join_game_handler))
        .route("/api/games/:code/settings", patch(update_settings_handler))
        .route("/api/games/:code/start", post(start_game_handler))
        .route(
            "/api/games/:code/assign-player",
            post(assign_player_handler),
        )
        .route("/api/games/:code/teams/:team_id", patch(update_team_handler))
        .route("/api/games/:code/scoreboard", get(scoreboard_handler))
        .route("/api/categories", get(list_categories_handler));

    let round_routes = Router::new()
        .route("/api/rounds/next-round", post(next_round_handler))
        .route("/api/rounds/:round_id/prompt", get(round_prompt_handler))
        .route(
            "/api/rounds/:round_id/select-actor",
            post(select_actor_handler),
        )
        .route(
            "/api/rounds/:round_id/select-category",
            post(select_category_handler),
        )
        .route(
            "/api/rounds/:round_id/actor-ready",
            post(actor_ready_handler),
        )
        .route("/api/rounds/:round_id/start-timer", post(start_timer_handler))
        .route("/api/rounds/:round_id/correct", post(correct_guess_handler))
        .route("/api/rounds/:round_id/timeout", post(timeout_handler))
        .route("/api/rounds/:round_id/skip", post(skip_round_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/:code", get(ws_handler))
        .merge(game_routes)
        .merge(round_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_games: usize,
    connected_clients: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_games: state.games.active_games(),
        connected_clients: state.hub.connected_clients(),
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Deserialize)]
struct CreateGameRequest {
    host_name: String,
    #[serde(default)]
    session_token: Option<String>,
}

#[derive(Serialize)]
struct CreateGameResponse {
    code: String,
    game: GameSnapshot,
    player_id: Uuid,
    session_token: String,
}

async fn create_game_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<CreateGameResponse>), AppError> {
    let created = state
        .directory
        .create_game(&req.host_name, req.session_token)
        .map_err(|e| {
            warn!(error = %e, "Create game failed");
            AppError(e)
        })?;

    let game = state.directory.game_state(&created.code).map_err(AppError)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateGameResponse {
            code: created.code,
            game,
            player_id: created.player_id,
            session_token: created.session_token,
        }),
    ))
}

async fn get_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GameSnapshot>, AppError> {
    let snapshot = state.directory.game_state(&code).map_err(AppError)?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct JoinGameRequest {
    player_name: String,
    #[serde(default)]
    session_token: Option<String>,
}

#[derive(Serialize)]
struct JoinGameResponse {
    player_id: Uuid,
    session_token: String,
    player_name: String,
    team_id: Option<Uuid>,
}

async fn join_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<JoinGameResponse>, AppError> {
    let code = code.trim().to_uppercase();
    let joined = state
        .directory
        .join_game(&code, &req.player_name, req.session_token)
        .map_err(|e| reject(&code, e))?;

    announce(&state.directory, &state.hub, &code, |data| {
        ServerMsg::PlayerJoined {
            version: PROTOCOL_VERSION,
            data,
        }
    });

    Ok(Json(JoinGameResponse {
        player_id: joined.player_id,
        session_token: joined.session_token,
        player_name: joined.player_name,
        team_id: joined.team_id,
    }))
}

#[derive(Deserialize)]
struct UpdateSettingsRequest {
    #[serde(default)]
    total_rounds: Option<u32>,
    #[serde(default)]
    max_time_per_turn: Option<u32>,
    #[serde(default)]
    settings: Option<Map<String, Value>>,
    #[serde(default)]
    category_ids: Option<Vec<Uuid>>,
}

async fn update_settings_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<GameSnapshot>, AppError> {
    let code = code.trim().to_uppercase();
    let update = SettingsUpdate {
        total_rounds: req.total_rounds,
        max_time_per_turn: req.max_time_per_turn,
        settings: req.settings,
        category_ids: req.category_ids,
    };

    state
        .directory
        .update_game_settings(&code, update)
        .map_err(|e| reject(&code, e))?;

    let snapshot = state.directory.game_state(&code).map_err(AppError)?;
    state.hub.broadcast(
        &code,
        ServerMsg::SettingsUpdated {
            version: PROTOCOL_VERSION,
            data: snapshot.clone(),
        },
    );
    Ok(Json(snapshot))
}

async fn start_game_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GameSnapshot>, AppError> {
    let code = code.trim().to_uppercase();
    state
        .directory
        .start_game(&code)
        .map_err(|e| reject(&code, e))?;

    let snapshot = state.directory.game_state(&code).map_err(AppError)?;
    state.hub.broadcast(
        &code,
        ServerMsg::GameStarted {
            version: PROTOCOL_VERSION,
            data: snapshot.clone(),
        },
    );
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct AssignPlayerRequest {
    player_id: Uuid,
    team_id: Uuid,
}

#[derive(Serialize)]
struct AssignPlayerResponse {
    player_id: Uuid,
    team_id: Uuid,
}

async fn assign_player_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<AssignPlayerRequest>,
) -> Result<Json<AssignPlayerResponse>, AppError> {
    let code = code.trim().to_uppercase();
    state
        .directory
        .assign_player_to_team(&code, req.player_id, req.team_id)
        .map_err(|e| reject(&code, e))?;

    announce(&state.directory, &state.hub, &code, |data| {
        ServerMsg::TeamUpdated {
            version: PROTOCOL_VERSION,
            data,
        }
    });

    Ok(Json(AssignPlayerResponse {
        player_id: req.player_id,
        team_id: req.team_id,
    }))
}

#[derive(Deserialize)]
struct UpdateTeamRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

async fn update_team_handler(
    State(state): State<AppState>,
    Path((code, team_id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateTeamRequest>,
) -> Result<Json<TeamView>, AppError> {
    let code = code.trim().to_uppercase();
    let team = state
        .directory
        .update_team(&code, team_id, req.name, req.color)
        .map_err(|e| reject(&code, e))?;

    announce(&state.directory, &state.hub, &code, |data| {
        ServerMsg::TeamUpdated {
            version: PROTOCOL_VERSION,
            data,
        }
    });

    Ok(Json(team))
}

async fn scoreboard_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ScoreboardView>, AppError> {
    let scoreboard = state.directory.scoreboard(&code).map_err(AppError)?;
    Ok(Json(scoreboard))
}

// ============================================================================
// Catalog endpoints
// ============================================================================

#[derive(Serialize)]
struct CategorySummary {
    id: Uuid,
    name: String,
    name_ar: String,
    genre: Genre,
    sub_genre: String,
    difficulty: Difficulty,
    icon: String,
    prompt_count: usize,
}

async fn list_categories_handler(State(state): State<AppState>) -> Json<Vec<CategorySummary>> {
    let categories = state
        .catalog
        .active_categories()
        .into_iter()
        .map(|c| CategorySummary {
            prompt_count: state.catalog.active_prompt_count(c.id),
            id: c.id,
            name: c.name,
            name_ar: c.name_ar,
            genre: c.genre,
            sub_genre: c.sub_genre,
            difficulty: c.difficulty,
            icon: c.icon,
        })
        .collect();

    Json(categories)
}

// ============================================================================
// Round endpoints
// ============================================================================

#[derive(Deserialize)]
struct PromptQuery {
    #[serde(default)]
    token: String,
}

async fn round_prompt_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
    Query(query): Query<PromptQuery>,
) -> Result<Json<ActorPromptView>, AppError> {
    let view = state
        .directory
        .actor_prompt(round_id, &query.token)
        .map_err(|e| reject_round(round_id, e))?;
    Ok(Json(view))
}

#[derive(Deserialize)]
struct SelectActorRequest {
    player_id: Uuid,
}

async fn select_actor_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
    Json(req): Json<SelectActorRequest>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .select_actor(round_id, req.player_id)
        .map_err(|e| reject_round(round_id, e))?;

    announce_round(&state, round_id, |data| ServerMsg::RoundUpdated {
        version: PROTOCOL_VERSION,
        data,
    });
    Ok(Json(view))
}

#[derive(Deserialize)]
struct SelectCategoryRequest {
    category_id: Uuid,
}

async fn select_category_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
    Json(req): Json<SelectCategoryRequest>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .select_category(round_id, req.category_id)
        .map_err(|e| reject_round(round_id, e))?;

    announce_round(&state, round_id, |data| ServerMsg::RoundUpdated {
        version: PROTOCOL_VERSION,
        data,
    });
    Ok(Json(view))
}

async fn actor_ready_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .actor_ready(round_id)
        .map_err(|e| reject_round(round_id, e))?;

    announce_round(&state, round_id, |data| ServerMsg::ActorReady {
        version: PROTOCOL_VERSION,
        data,
    });
    Ok(Json(view))
}

async fn start_timer_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .start_timer(round_id)
        .map_err(|e| reject_round(round_id, e))?;

    announce_round(&state, round_id, |data| ServerMsg::TimerStarted {
        version: PROTOCOL_VERSION,
        data,
    });
    Ok(Json(view))
}

#[derive(Serialize)]
struct CorrectGuessResponse {
    round: RoundView,
    time_taken: f64,
    points: i32,
    team_score: i32,
}

async fn correct_guess_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<CorrectGuessResponse>, AppError> {
    let guess = state
        .directory
        .correct_guess(round_id)
        .map_err(|e| reject_round(round_id, e))?;

    let result = RoundResult::guessed(guess.time_taken, guess.points, guess.team_score);
    announce_round(&state, round_id, |data| ServerMsg::RoundEnded {
        version: PROTOCOL_VERSION,
        data,
        result,
    });

    Ok(Json(CorrectGuessResponse {
        round: guess.round,
        time_taken: guess.time_taken,
        points: guess.points,
        team_score: guess.team_score,
    }))
}

async fn timeout_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .timeout_round(round_id)
        .map_err(|e| reject_round(round_id, e))?;

    let result = RoundResult::timeout();
    announce_round(&state, round_id, |data| ServerMsg::RoundEnded {
        version: PROTOCOL_VERSION,
        data,
        result,
    });
    Ok(Json(view))
}

async fn skip_round_handler(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<RoundView>, AppError> {
    let view = state
        .directory
        .skip_round(round_id)
        .map_err(|e| reject_round(round_id, e))?;

    let result = RoundResult::skipped(view.time_taken_seconds);
    announce_round(&state, round_id, |data| ServerMsg::RoundEnded {
        version: PROTOCOL_VERSION,
        data,
        result,
    });
    Ok(Json(view))
}

#[derive(Deserialize)]
struct NextRoundRequest {
    game_code: String,
}

#[derive(Serialize)]
struct NextRoundResponse {
    finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    game: Option<GameSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    round: Option<RoundView>,
}

async fn next_round_handler(
    State(state): State<AppState>,
    Json(req): Json<NextRoundRequest>,
) -> Result<Json<NextRoundResponse>, AppError> {
    let code = req.game_code.trim().to_uppercase();
    let outcome = state
        .directory
        .advance_round(&code)
        .map_err(|e| reject(&code, e))?;

    let snapshot = state.directory.game_state(&code).map_err(AppError)?;

    if outcome.finished {
        state.hub.broadcast(
            &code,
            ServerMsg::GameFinished {
                version: PROTOCOL_VERSION,
                data: snapshot.clone(),
            },
        );
        Ok(Json(NextRoundResponse {
            finished: true,
            game: Some(snapshot),
            round: None,
        }))
    } else {
        state.hub.broadcast(
            &code,
            ServerMsg::RoundUpdated {
                version: PROTOCOL_VERSION,
                data: snapshot,
            },
        );
        Ok(Json(NextRoundResponse {
            finished: false,
            game: None,
            round: outcome.round,
        }))
    }
}

// ============================================================================
// Error handling
// ============================================================================

/// Engine errors surfaced over HTTP as `{"error": message}` JSON
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct AppError(#[from] GameError);

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::InvalidState(_) | GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::Permission(_) => StatusCode::FORBIDDEN,
        };

        let body = serde_json::json!({
            "error": self.0.to_string()
        });

        (status, Json(body)).into_response()
    }
}

/// Log a failed game-scoped request before converting it
fn reject(code: &str, err: GameError) -> AppError {
    warn!(code = %code, error = %err, "Request failed");
    AppError(err)
}

/// Log a failed round-scoped request before converting it
fn reject_round(round_id: Uuid, err: GameError) -> AppError {
    warn!(round_id = %round_id, error = %err, "Request failed");
    AppError(err)
}

/// Broadcast an event for the game owning this round. The round resolved
/// a moment ago; if its game vanished there is simply no one to tell.
fn announce_round<F>(state: &AppState, round_id: Uuid, build: F)
where
    F: FnOnce(GameSnapshot) -> ServerMsg,
{
    if let Some(code) = state.directory.round_game_code(round_id) {
        announce(&state.directory, &state.hub, &code, build);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::SessionDirectory;
    use crate::store::{CatalogStore, GameStore};
    use crate::ws::hub::BroadcastHub;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            client_origin: "http://localhost:5173,https://game.example".to_string(),
            catalog_path: None,
        };
        let catalog = Arc::new(CatalogStore::new());
        let games = Arc::new(GameStore::new());
        let directory = Arc::new(SessionDirectory::new(games.clone(), catalog.clone()));
        AppState {
            config: Arc::new(config),
            catalog,
            games,
            directory,
            hub: Arc::new(BroadcastHub::new()),
        }
    }

    // Route table conflicts panic at registration, so building the router
    // is itself the assertion
    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let _router = build_router(test_state());
    }

    #[test]
    fn errors_map_to_expected_status_codes() {
        let cases = [
            (GameError::not_found("Game"), StatusCode::NOT_FOUND),
            (
                GameError::InvalidState("busy".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GameError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GameError::Permission("nope".to_string()),
                StatusCode::FORBIDDEN,
            ),
        ];

        for (err, expected) in cases {
            let response = AppError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
