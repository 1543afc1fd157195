//! Maps a scoreboard entry plus its game summary into a [`ToonPayload`].
//!
//! Pure: no I/O, no clock reads. The fetch time is passed in by the caller.
//!
//! ESPN does not guarantee the order of `competitors` or `boxscore.teams`, so
//! every side is located through [`find_by_role`] and never by index.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::{Config, MAX_RECENT_PLAYS, STAT_KEYS};
use crate::error::MappingError;
use crate::types::{
    EventData, GameData, Period, Role, TeamData, ToonPayload, WinProbability, EVENT_TYPE_PLAY,
};

/// The knobs the mapping needs from configuration.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub stat_keys: HashSet<String>,
    pub max_recent_plays: usize,
}

impl TransformOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            stat_keys: cfg.stat_keys.iter().cloned().collect(),
            max_recent_plays: cfg.max_recent_plays,
        }
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            stat_keys: STAT_KEYS.iter().map(|s| s.to_string()).collect(),
            max_recent_plays: MAX_RECENT_PLAYS,
        }
    }
}

/// Transform one live scoreboard `event` and its `summary` into a canonical record.
pub fn transform_game(
    scoreboard_event: &Value,
    summary: &Value,
    options: &TransformOptions,
    observed_at: DateTime<Utc>,
) -> Result<ToonPayload, MappingError> {
    let game_id = loose_string(scoreboard_event.get("id")).ok_or(MappingError::MissingField("id"))?;

    let competition = scoreboard_event
        .get("competitions")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .ok_or(MappingError::MissingField("competitions"))?;
    let status = competition
        .get("status")
        .ok_or(MappingError::MissingField("status"))?;

    let status_text = status
        .pointer("/type/description")
        .and_then(Value::as_str)
        .ok_or(MappingError::MissingField("status.type.description"))?
        .to_string();
    let period_raw = status
        .get("period")
        .ok_or(MappingError::MissingField("status.period"))?;
    let quarter = loose_u32(period_raw).map(Period).ok_or_else(|| MappingError::InvalidField {
        field: "status.period",
        value: period_raw.to_string(),
    })?;
    let clock = status
        .get("displayClock")
        .and_then(Value::as_str)
        .ok_or(MappingError::MissingField("status.displayClock"))?
        .to_string();

    let competitors = competition
        .get("competitors")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let boxscore_teams = summary
        .pointer("/boxscore/teams")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let home_team = extract_team(competitors, boxscore_teams, Role::Home, &options.stat_keys)?;
    let away_team = extract_team(competitors, boxscore_teams, Role::Away, &options.stat_keys)?;

    let possession_codes = possession_lookup(&home_team, &away_team);
    let win_probabilities = win_probability_lookup(summary);
    let events = recent_plays(summary, options.max_recent_plays)
        .into_iter()
        .filter_map(|play| play_to_event(play, &possession_codes, &win_probabilities))
        .collect();

    let game = GameData {
        game_id,
        status: status_text,
        quarter,
        clock,
        home_team,
        away_team,
    };
    Ok(ToonPayload::new(observed_at, game, events))
}

/// The entry in `entries` whose `homeAway` field equals `role`.
pub fn find_by_role(entries: &[Value], role: Role) -> Option<&Value> {
    entries
        .iter()
        .find(|e| e.get("homeAway").and_then(Value::as_str) == Some(role.as_str()))
}

fn extract_team(
    competitors: &[Value],
    boxscore_teams: &[Value],
    role: Role,
    stat_keys: &HashSet<String>,
) -> Result<TeamData, MappingError> {
    let competitor =
        find_by_role(competitors, role).ok_or(MappingError::MissingRole(role.as_str()))?;
    let team = competitor.get("team");

    let id = loose_string(team.and_then(|t| t.get("id")))
        .ok_or(MappingError::MissingField("competitor.team.id"))?;
    let name = team
        .and_then(|t| t.get("displayName"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let abbreviation = team
        .and_then(|t| t.get("abbreviation"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // Pre-game scoreboards can omit the score entirely.
    let score = match competitor.get("score") {
        None | Some(Value::Null) => 0,
        Some(raw) => loose_u32(raw).ok_or_else(|| MappingError::InvalidScore {
            role: role.as_str(),
            value: match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })?,
    };

    let stats = find_by_role(boxscore_teams, role)
        .map(|bt| extract_stats(bt, stat_keys))
        .unwrap_or_default();

    Ok(TeamData {
        id,
        name,
        abbreviation,
        score,
        stats,
    })
}

fn extract_stats(boxscore_team: &Value, stat_keys: &HashSet<String>) -> BTreeMap<String, String> {
    let mut stats = BTreeMap::new();
    let Some(entries) = boxscore_team.get("statistics").and_then(Value::as_array) else {
        return stats;
    };
    for stat in entries {
        let Some(name) = stat.get("name").and_then(Value::as_str) else {
            continue;
        };
        if !stat_keys.contains(name) {
            continue;
        }
        if let Some(value) = loose_string(stat.get("displayValue")) {
            stats.insert(name.to_string(), value);
        }
    }
    stats
}

/// team id → abbreviation for the two sides of this game only.
fn possession_lookup(home: &TeamData, away: &TeamData) -> HashMap<String, String> {
    [home, away]
        .into_iter()
        .filter(|t| !t.abbreviation.is_empty())
        .map(|t| (t.id.clone(), t.abbreviation.clone()))
        .collect()
}

/// playId → home win probability. Out-of-range estimates are dropped.
fn win_probability_lookup(summary: &Value) -> HashMap<String, WinProbability> {
    summary
        .get("winprobability")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let play_id = loose_string(entry.get("playId"))?;
                    let pct = loose_f64(entry.get("homeWinPercentage")?)?;
                    Some((play_id, WinProbability::new(pct)?))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Plays of the in-progress drive, or of the last completed drive when there is
/// no live one. At most `max` entries, oldest first.
fn recent_plays(summary: &Value, max: usize) -> Vec<&Value> {
    let mut plays = summary
        .pointer("/drives/current")
        .and_then(drive_plays)
        .or_else(|| {
            summary
                .pointer("/drives/previous")
                .and_then(Value::as_array)
                .and_then(|drives| drives.last())
                .and_then(drive_plays)
        })
        .unwrap_or_default();

    let start = plays.len().saturating_sub(max);
    plays.split_off(start)
}

fn drive_plays(drive: &Value) -> Option<Vec<&Value>> {
    let plays = drive.get("plays")?.as_array()?;
    if plays.is_empty() {
        None
    } else {
        Some(plays.iter().collect())
    }
}

fn play_to_event(
    play: &Value,
    possession_codes: &HashMap<String, String>,
    win_probabilities: &HashMap<String, WinProbability>,
) -> Option<EventData> {
    // A play without an id can't be matched to anything; skip it.
    let event_id = loose_string(play.get("id"))?;

    let possession = loose_string(play.pointer("/start/team/id"))
        .and_then(|team_id| possession_codes.get(&team_id).cloned());

    Some(EventData {
        win_probability: win_probabilities.get(&event_id).copied(),
        event_id,
        kind: EVENT_TYPE_PLAY.to_string(),
        description: play
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        quarter: Period(
            play.pointer("/period/number")
                .and_then(loose_u32)
                .unwrap_or_default(),
        ),
        clock: play
            .pointer("/clock/displayValue")
            .and_then(Value::as_str)
            .unwrap_or("0:00")
            .to_string(),
        possession,
    })
}

// ---------------------------------------------------------------------------
// Loose scalar coercion: ESPN mixes strings and numbers for the same field.
// ---------------------------------------------------------------------------

fn loose_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn loose_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn loose_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
