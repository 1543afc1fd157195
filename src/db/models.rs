/// Row type for the `live_games` table (see migrations/0001_live_games.sql).
/// The scalar columns duplicate fields of `toon_payload` so readers can filter
/// without decoding the blob.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LiveGameRow {
    pub game_id: String,
    pub status: String,
    pub quarter: i64,
    pub clock: String,
    pub home_score: i64,
    pub away_score: i64,
    /// Full `ToonPayload` as JSON text.
    pub toon_payload: String,
    /// RFC 3339 UTC with microseconds; sorts lexically.
    pub updated_at: String,
}

impl LiveGameRow {
    pub fn from_payload(payload: &crate::types::ToonPayload) -> serde_json::Result<Self> {
        let game = &payload.game;
        Ok(Self {
            game_id: game.game_id.clone(),
            status: game.status.clone(),
            quarter: i64::from(game.quarter.0),
            clock: game.clock.clone(),
            home_score: i64::from(game.home_team.score),
            away_score: i64::from(game.away_team.score),
            toon_payload: serde_json::to_string(payload)?,
            updated_at: super::store::format_timestamp(payload.timestamp),
        })
    }

    pub fn payload(&self) -> serde_json::Result<crate::types::ToonPayload> {
        serde_json::from_str(&self.toon_payload)
    }
}
