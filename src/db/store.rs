use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::db::models::LiveGameRow;
use crate::error::StoreError;
use crate::types::ToonPayload;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable home of the latest record per game.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Insert or fully replace the row for `payload.game.game_id`. Idempotent.
    async fn upsert(&self, payload: &ToonPayload) -> StoreResult<()>;

    /// Every stored game, most recently updated first.
    async fn read_all(&self) -> StoreResult<Vec<LiveGameRow>>;
}

/// SQLite-backed [`GameStore`].
#[derive(Clone)]
pub struct SqliteGameStore {
    pool: sqlx::SqlitePool,
}

const SELECT_COLUMNS: &str = "SELECT game_id, status, quarter, clock, home_score, away_score, \
                              toon_payload, updated_at FROM live_games";

impl SqliteGameStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn read_one(&self, game_id: &str) -> StoreResult<Option<LiveGameRow>> {
        let row = sqlx::query_as::<_, LiveGameRow>(&format!("{SELECT_COLUMNS} WHERE game_id = ?"))
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn read_by_status(&self, status: &str) -> StoreResult<Vec<LiveGameRow>> {
        let rows = sqlx::query_as::<_, LiveGameRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = ? ORDER BY updated_at DESC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Games whose record was produced after `cutoff`.
    pub async fn read_updated_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<LiveGameRow>> {
        let rows = sqlx::query_as::<_, LiveGameRow>(&format!(
            "{SELECT_COLUMNS} WHERE updated_at > ? ORDER BY updated_at DESC"
        ))
        .bind(format_timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl GameStore for SqliteGameStore {
    async fn upsert(&self, payload: &ToonPayload) -> StoreResult<()> {
        let row = LiveGameRow::from_payload(payload)?;

        sqlx::query(
            r#"
            INSERT INTO live_games (
                game_id, status, quarter, clock, home_score, away_score,
                toon_payload, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(game_id) DO UPDATE SET
                status = excluded.status,
                quarter = excluded.quarter,
                clock = excluded.clock,
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                toon_payload = excluded.toon_payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.game_id)
        .bind(&row.status)
        .bind(row.quarter)
        .bind(&row.clock)
        .bind(row.home_score)
        .bind(row.away_score)
        .bind(&row.toon_payload)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(game_id = %row.game_id, "Upserted game");
        Ok(())
    }

    async fn read_all(&self) -> StoreResult<Vec<LiveGameRow>> {
        let rows = sqlx::query_as::<_, LiveGameRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{fixtures, transform_game, TransformOptions};
    use chrono::{Duration, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteGameStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteGameStore::new(pool)
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 11, 23, 30, 0).unwrap()
    }

    fn payload(game_id: &str, status: &str, at: DateTime<Utc>) -> ToonPayload {
        let mut p = transform_game(
            &fixtures::live_event(),
            &fixtures::summary(),
            &TransformOptions::default(),
            at,
        )
        .unwrap();
        p.game.game_id = game_id.to_string();
        p.game.status = status.to_string();
        p
    }

    #[tokio::test]
    async fn upsert_writes_scalar_columns_and_blob() {
        let store = memory_store().await;
        let p = payload("401547417", "In Progress", base_time());
        store.upsert(&p).await.unwrap();

        let row = store.read_one("401547417").await.unwrap().unwrap();
        assert_eq!(row.status, "In Progress");
        assert_eq!(row.quarter, 3);
        assert_eq!(row.clock, "7:23");
        assert_eq!(row.home_score, 21);
        assert_eq!(row.away_score, 14);
        assert_eq!(row.updated_at, "2024-02-11T23:30:00.000000Z");
        assert_eq!(row.payload().unwrap(), p);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = memory_store().await;
        let p = payload("401547417", "In Progress", base_time());

        store.upsert(&p).await.unwrap();
        let once: Vec<_> = store
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.game_id, r.toon_payload, r.updated_at))
            .collect();

        store.upsert(&p).await.unwrap();
        let twice: Vec<_> = store
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.game_id, r.toon_payload, r.updated_at))
            .collect();

        assert_eq!(once.len(), 1);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn later_record_replaces_earlier_one() {
        let store = memory_store().await;
        store
            .upsert(&payload("g1", "In Progress", base_time()))
            .await
            .unwrap();
        let mut later = payload("g1", "Halftime", base_time() + Duration::minutes(1));
        later.game.away_team.score = 17;
        store.upsert(&later).await.unwrap();

        let rows = store.read_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "Halftime");
        assert_eq!(rows[0].away_score, 17);
        assert_eq!(rows[0].payload().unwrap(), later);
    }

    #[tokio::test]
    async fn filtered_reads() {
        let store = memory_store().await;
        store
            .upsert(&payload("g1", "In Progress", base_time()))
            .await
            .unwrap();
        store
            .upsert(&payload("g2", "Halftime", base_time() + Duration::minutes(10)))
            .await
            .unwrap();
        store
            .upsert(&payload("g3", "In Progress", base_time() + Duration::minutes(20)))
            .await
            .unwrap();

        let all: Vec<_> = store
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.game_id)
            .collect();
        assert_eq!(all, vec!["g3", "g2", "g1"]);

        let in_progress: Vec<_> = store
            .read_by_status("In Progress")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.game_id)
            .collect();
        assert_eq!(in_progress, vec!["g3", "g1"]);

        let recent: Vec<_> = store
            .read_updated_since(base_time() + Duration::minutes(5))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.game_id)
            .collect();
        assert_eq!(recent, vec!["g3", "g2"]);

        assert!(store.read_one("missing").await.unwrap().is_none());
    }
}
