use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::CycleLatency;
use crate::db::models::LiveGameRow;
use crate::db::store::{GameStore, SqliteGameStore};
use crate::error::{AppError, StoreError};
use crate::state::GameCache;
use crate::types::{EventData, Role, TeamData, ToonPayload};

/// Plays returned by `/games/:id/plays` when no limit is given.
pub const DEFAULT_PLAYS_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<GameCache>,
    pub store: SqliteGameStore,
    pub health: Arc<HealthState>,
    pub latency: Arc<CycleLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/games", get(get_games))
        .route("/games/:id", get(get_game))
        .route("/games/:id/teams/:role", get(get_team))
        .route("/games/:id/plays", get(get_plays))
        .route("/stored/games", get(get_stored_games))
        .route("/stored/games/:id", get(get_stored_game))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PlaysQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct StoredGamesQuery {
    pub status: Option<String>,
    pub since_minutes: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub cached_games: usize,
    pub poller: HealthSnapshot,
}

#[derive(Serialize)]
pub struct GamesResponse {
    pub games: Vec<ToonPayload>,
}

#[derive(Serialize)]
pub struct PlaysResponse {
    pub game_id: String,
    pub plays: Vec<EventData>,
}

#[derive(Debug, Serialize)]
pub struct StoredGameResponse {
    pub game_id: String,
    pub status: String,
    pub quarter: i64,
    pub clock: String,
    pub home_score: i64,
    pub away_score: i64,
    pub updated_at: String,
    pub toon_payload: ToonPayload,
}

impl TryFrom<LiveGameRow> for StoredGameResponse {
    type Error = StoreError;

    fn try_from(row: LiveGameRow) -> Result<Self, Self::Error> {
        let toon_payload = row.payload()?;
        Ok(Self {
            game_id: row.game_id,
            status: row.status,
            quarter: row.quarter,
            clock: row.clock,
            home_score: row.home_score,
            away_score: row.away_score,
            updated_at: row.updated_at,
            toon_payload,
        })
    }
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        cached_games: state.cache.len(),
        poller: state.health.snapshot(),
    })
}

async fn get_games(State(state): State<ApiState>) -> Json<GamesResponse> {
    Json(GamesResponse {
        games: state.cache.all(),
    })
}

async fn get_game(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
) -> Result<Json<ToonPayload>, AppError> {
    cached(&state, &game_id).map(Json)
}

async fn get_team(
    State(state): State<ApiState>,
    Path((game_id, role)): Path<(String, String)>,
) -> Result<Json<TeamData>, AppError> {
    let role: Role = role.parse().map_err(AppError::NotFound)?;
    let game = cached(&state, &game_id)?;
    Ok(Json(game.game.team(role).clone()))
}

async fn get_plays(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
    Query(params): Query<PlaysQuery>,
) -> Result<Json<PlaysResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_PLAYS_LIMIT);
    let game = cached(&state, &game_id)?;
    Ok(Json(PlaysResponse {
        plays: game.recent_events(limit).to_vec(),
        game_id,
    }))
}

async fn get_stored_games(
    State(state): State<ApiState>,
    Query(params): Query<StoredGamesQuery>,
) -> Result<Json<Vec<StoredGameResponse>>, AppError> {
    let rows = match (params.since_minutes, params.status.as_deref()) {
        (Some(minutes), status) => {
            let cutoff = Utc::now() - chrono::Duration::minutes(minutes.max(0));
            let rows = state.store.read_updated_since(cutoff).await?;
            match status {
                Some(s) => rows.into_iter().filter(|r| r.status == s).collect(),
                None => rows,
            }
        }
        (None, Some(status)) => state.store.read_by_status(status).await?,
        (None, None) => state.store.read_all().await?,
    };

    let games = rows
        .into_iter()
        .map(StoredGameResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(games))
}

async fn get_stored_game(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
) -> Result<Json<StoredGameResponse>, AppError> {
    let row = state
        .store
        .read_one(&game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("stored game {game_id}")))?;
    Ok(Json(StoredGameResponse::try_from(row)?))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

fn cached(state: &ApiState, game_id: &str) -> Result<ToonPayload, AppError> {
    state
        .cache
        .get(game_id)
        .ok_or_else(|| AppError::NotFound(format!("game {game_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{fixtures, transform_game, TransformOptions};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn state() -> ApiState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        ApiState {
            cache: GameCache::new(),
            store: SqliteGameStore::new(pool),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(CycleLatency::new()),
        }
    }

    fn payload() -> ToonPayload {
        transform_game(
            &fixtures::live_event(),
            &fixtures::summary(),
            &TransformOptions::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn games_come_from_the_cache() {
        let state = state().await;
        assert!(get_games(State(state.clone())).await.0.games.is_empty());

        state.cache.upsert(payload());
        let games = get_games(State(state.clone())).await.0.games;
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].game_id(), "401547417");

        let one = get_game(State(state.clone()), Path("401547417".to_string()))
            .await
            .unwrap();
        assert_eq!(one.0, games[0]);
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let state = state().await;
        let err = get_game(State(state), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn team_by_role() {
        let state = state().await;
        state.cache.upsert(payload());

        let away = get_team(
            State(state.clone()),
            Path(("401547417".to_string(), "away".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(away.0.abbreviation, "PHI");

        let err = get_team(
            State(state),
            Path(("401547417".to_string(), "visitor".to_string())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn plays_respect_limit() {
        let state = state().await;
        let game = payload();
        let total = game.events.len();
        state.cache.upsert(game.clone());

        let plays = get_plays(
            State(state.clone()),
            Path("401547417".to_string()),
            Query(PlaysQuery { limit: Some(1) }),
        )
        .await
        .unwrap()
        .0
        .plays;
        assert_eq!(plays.len(), 1.min(total));
        assert_eq!(plays.last(), game.events.last());

        let all = get_plays(
            State(state),
            Path("401547417".to_string()),
            Query(PlaysQuery { limit: None }),
        )
        .await
        .unwrap()
        .0
        .plays;
        assert_eq!(all.len(), total.min(DEFAULT_PLAYS_LIMIT));
    }

    #[tokio::test]
    async fn stored_games_filters() {
        let state = state().await;
        let mut live = payload();
        state.store.upsert(&live).await.unwrap();
        live.game.game_id = "401547500".to_string();
        live.game.status = "Halftime".to_string();
        state.store.upsert(&live).await.unwrap();

        let all = get_stored_games(
            State(state.clone()),
            Query(StoredGamesQuery {
                status: None,
                since_minutes: None,
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(all.len(), 2);

        let halftime = get_stored_games(
            State(state.clone()),
            Query(StoredGamesQuery {
                status: Some("Halftime".to_string()),
                since_minutes: Some(5),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(halftime.len(), 1);
        assert_eq!(halftime[0].game_id, "401547500");
        assert_eq!(halftime[0].toon_payload, live);
    }

    #[tokio::test]
    async fn stored_game_by_id() {
        let state = state().await;
        let game = payload();
        state.store.upsert(&game).await.unwrap();

        let stored = get_stored_game(State(state.clone()), Path("401547417".to_string()))
            .await
            .unwrap()
            .0;
        assert_eq!(stored.home_score, 21);
        assert_eq!(stored.away_score, 14);
        assert_eq!(stored.toon_payload, game);

        let err = get_stored_game(State(state), Path("401547999".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn health_and_latency() {
        let state = state().await;
        state.health.record_failure(2);
        state.latency.record(std::time::Duration::from_millis(120));

        let health = get_health(State(state.clone())).await.0;
        assert_eq!(health.status, "ok");
        assert_eq!(health.poller.consecutive_failures, 2);

        let latency = get_stats_latency(State(state)).await.0;
        assert_eq!(latency.samples, 1);
        assert!(latency.p50_ms.is_some());
    }
}
