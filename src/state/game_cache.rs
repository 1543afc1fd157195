use std::sync::Arc;

use dashmap::DashMap;

use crate::types::ToonPayload;

// ---------------------------------------------------------------------------
// GameCache
// ---------------------------------------------------------------------------

/// Latest canonical record per game, written by the poller and read by the API.
///
/// Writes are last-write-wins per `game_id`; there is no cross-key ordering.
/// Entries are never evicted by the poller.
pub struct GameCache {
    /// game_id → latest record
    games: DashMap<String, ToonPayload>,
}

impl GameCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store `payload`, replacing whatever was cached for the same game.
    pub fn upsert(&self, payload: ToonPayload) {
        self.games.insert(payload.game_id().to_string(), payload);
    }

    pub fn get(&self, game_id: &str) -> Option<ToonPayload> {
        self.games.get(game_id).map(|p| p.clone())
    }

    /// Snapshot of every cached record, ordered by game id.
    pub fn all(&self) -> Vec<ToonPayload> {
        let mut games: Vec<ToonPayload> = self.games.iter().map(|e| e.value().clone()).collect();
        games.sort_by(|a, b| a.game.game_id.cmp(&b.game.game_id));
        games
    }

    #[cfg(test)]
    pub fn contains(&self, game_id: &str) -> bool {
        self.games.contains_key(game_id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl Default for GameCache {
    fn default() -> Self {
        Self {
            games: DashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
