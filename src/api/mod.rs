use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::db::models::{PlayerPoints, Team, TeamDetail};
use crate::db::Database;
use crate::error::ServiceError;
use crate::standings::{compute_standings, StandingValue};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Build the query API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/teams", get(list_teams_handler).post(create_team_handler))
        .route("/api/teams/search/:query", get(search_teams_handler))
        .route("/api/teams/:id", get(team_handler))
        .route("/api/teams/:id/players", post(attach_player_handler))
        .route("/api/leagues/:id/standings", get(league_standings_handler))
        .route("/api/standings", get(standings_handler))
        .route("/api/matches/:id/points", get(match_points_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Domain failures are the caller's fault; anything else is ours.
fn error_response(e: anyhow::Error) -> (StatusCode, String) {
    match ServiceError::find(&e) {
        Some(domain) => (StatusCode::BAD_REQUEST, domain.to_string()),
        None => {
            error!("Request failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/teams
async fn list_teams_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Team>> {
    state.db.list_teams().map(Json).map_err(error_response)
}

/// GET /api/teams/search/:query
async fn search_teams_handler(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> ApiResult<Vec<Team>> {
    state.db.search_teams(&query).map(Json).map_err(error_response)
}

/// GET /api/teams/:id
async fn team_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<TeamDetail> {
    match state.db.team_detail(id) {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("team {} not found", id))),
        Err(e) => Err(error_response(e)),
    }
}

#[derive(Debug, Deserialize)]
struct NewTeamRequest {
    name: String,
    /// Defaults to the name
    code: Option<String>,
    crest: Option<String>,
}

/// POST /api/teams
async fn create_team_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewTeamRequest>,
) -> Result<(StatusCode, Json<Team>), (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "team name is required".to_string()));
    }
    state
        .db
        .create_team(req.name.trim(), req.code.as_deref(), req.crest.as_deref())
        .map(|team| (StatusCode::CREATED, Json(team)))
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct AttachPlayerRequest {
    player_id: i64,
}

/// POST /api/teams/:id/players
async fn attach_player_handler(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<i64>,
    Json(req): Json<AttachPlayerRequest>,
) -> ApiResult<TeamDetail> {
    state
        .db
        .attach_player_to_team(team_id, req.player_id)
        .map_err(error_response)?;
    match state.db.team_detail(team_id) {
        Ok(Some(detail)) => Ok(Json(detail)),
        Ok(None) => Err(error_response(ServiceError::InvalidTeamId(team_id).into())),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/leagues/:id/standings
async fn league_standings_handler(
    State(state): State<Arc<AppState>>,
    Path(league_id): Path<i64>,
) -> ApiResult<Vec<StandingValue>> {
    compute_standings(&state.db, Some(league_id))
        .map(Json)
        .map_err(error_response)
}

/// GET /api/standings
async fn standings_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<StandingValue>> {
    compute_standings(&state.db, None)
        .map(Json)
        .map_err(error_response)
}

/// GET /api/matches/:id/points
async fn match_points_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<i64>,
) -> ApiResult<Vec<PlayerPoints>> {
    match state.db.find_match(match_id) {
        Ok(Some(_)) => state
            .db
            .points_for_match(match_id)
            .map(Json)
            .map_err(error_response),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("match {} not found", match_id))),
        Err(e) => Err(error_response(e)),
    }
}
