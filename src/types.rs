use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `type` discriminator carried by every record.
pub const PAYLOAD_TYPE: &str = "game_update";
/// `source` discriminator carried by every record.
pub const PAYLOAD_SOURCE: &str = "espn_live";
/// `type` discriminator carried by every event.
pub const EVENT_TYPE_PLAY: &str = "play";

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the game a competitor plays for. Always resolved from the
/// upstream `homeAway` field, never from array position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Home,
    Away,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Home => "home",
            Role::Away => "away",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Role::Home),
            "away" => Ok(Role::Away),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Period
// ---------------------------------------------------------------------------

/// Game period (quarter). 0 = not started; anything past regulation is overtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(pub u32);

impl Period {
    /// First period number past regulation.
    pub const OVERTIME: Period = Period(5);

    pub fn is_overtime(self) -> bool {
        self >= Self::OVERTIME
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_overtime() {
            write!(f, "OT")
        } else {
            write!(f, "Q{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// WinProbability
// ---------------------------------------------------------------------------

/// Home-team win probability for a single play, always within `[0.0, 1.0]`.
/// "No estimate" is `Option::None` at the use site, never `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct WinProbability(f64);

impl WinProbability {
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl<'de> Deserialize<'de> for WinProbability {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        WinProbability::new(raw).ok_or_else(|| {
            serde::de::Error::custom(format!("win probability {raw} outside [0, 1]"))
        })
    }
}

// ---------------------------------------------------------------------------
// Canonical record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamData {
    pub id: String,
    pub name: String,
    /// Short team code; what `EventData::possession` refers to.
    #[serde(default)]
    pub abbreviation: String,
    pub score: u32,
    /// Allow-listed box-score stats. Values stay strings ("5-10", "28:41").
    #[serde(default)]
    pub stats: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameData {
    pub game_id: String,
    pub status: String,
    pub quarter: Period,
    pub clock: String,
    pub home_team: TeamData,
    pub away_team: TeamData,
}

impl GameData {
    pub fn team(&self, role: Role) -> &TeamData {
        match role {
            Role::Home => &self.home_team,
            Role::Away => &self.away_team,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub quarter: Period,
    pub clock: String,
    /// Abbreviation of the team with the ball; absent when it can't be matched.
    pub possession: Option<String>,
    pub win_probability: Option<WinProbability>,
}

/// The canonical ("TOON") record for one game. Replaces the previous record
/// for the same `game_id` wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToonPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    /// When the data behind this record was fetched (UTC, microsecond precision).
    pub timestamp: DateTime<Utc>,
    pub game: GameData,
    /// Chronological, most recent play last.
    #[serde(default)]
    pub events: Vec<EventData>,
}

impl ToonPayload {
    pub fn new(observed_at: DateTime<Utc>, game: GameData, events: Vec<EventData>) -> Self {
        Self {
            kind: PAYLOAD_TYPE.to_string(),
            source: PAYLOAD_SOURCE.to_string(),
            timestamp: truncate_to_micros(observed_at),
            game,
            events,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game.game_id
    }

    /// The `n` most recent events, still oldest first.
    pub fn recent_events(&self, n: usize) -> &[EventData] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }
}

/// Drop sub-microsecond precision so the record round-trips through storage unchanged.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
